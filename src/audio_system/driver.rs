/// Background tick thread
///
/// Owned by the engine once it is enabled. Calls
/// [`AudioEngine::tick`](super::manager::AudioEngine::tick) at a
/// fixed interval through a weak handle, so it never keeps the engine alive,
/// and exits when the engine is dropped.
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use super::manager::WeakEngine;

/// Handle to a running tick thread; stops it on drop
pub struct Driver {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Driver {
    pub(crate) fn spawn(engine: WeakEngine, interval: Duration) -> std::io::Result<Self> {
        let (tx, rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("soundbus-driver".to_string())
            .spawn(move || {
                tracing::debug!("Audio driver started ({:?} interval)", interval);
                loop {
                    match rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let Some(engine) = engine.upgrade() else {
                                break;
                            };
                            engine.tick();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("Audio driver stopped");
            })?;

        Ok(Self {
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn shutdown_and_join(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let Some(handle) = self.handle.take() else {
            return;
        };
        // The last engine handle can be released by the driver's own tick
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("Audio driver thread panicked");
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
