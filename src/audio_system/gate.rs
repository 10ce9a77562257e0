/// Engine enable gate
///
/// Opening the audio output happens at most once. Concurrent `enable` calls
/// join the attempt already in progress; a failed attempt returns the gate to
/// `Uninitialized` so a later call can retry.
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{AudioError, BackendError};

/// Lifecycle of the engine's audio output
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum EngineState {
    /// Output not opened yet, or the last attempt failed
    #[default]
    Uninitialized,

    /// Output is being opened (transitional state)
    Initializing,

    /// Output open, playback available
    Ready,
}

impl EngineState {
    pub fn is_ready(&self) -> bool {
        matches!(self, EngineState::Ready)
    }

    pub fn description(&self) -> &'static str {
        match self {
            EngineState::Uninitialized => "Uninitialized",
            EngineState::Initializing => "Initializing...",
            EngineState::Ready => "Ready",
        }
    }
}

struct GateInner {
    state: EngineState,
    /// Bumped each time an attempt starts
    attempt: u64,
    /// Outcome of the most recent failed attempt
    last_failure: Option<(u64, AudioError)>,
}

/// Serializes one-time output initialization
pub struct EnableGate {
    inner: Mutex<GateInner>,
    changed: Condvar,
}

impl Default for EnableGate {
    fn default() -> Self {
        Self::new()
    }
}

impl EnableGate {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GateInner {
                state: EngineState::Uninitialized,
                attempt: 0,
                last_failure: None,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.inner.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Run `init` unless the gate is already open
    ///
    /// Returns `Ok(true)` if this call performed the initialization and
    /// `Ok(false)` if the gate was already open or another caller opened it.
    /// Callers that joined a failing attempt receive that attempt's error.
    pub fn enable<F>(&self, init: F) -> Result<bool, AudioError>
    where
        F: FnOnce() -> Result<(), AudioError>,
    {
        let mut inner = self.inner.lock();
        match inner.state {
            EngineState::Ready => return Ok(false),
            EngineState::Initializing => {
                let attempt = inner.attempt;
                while inner.state == EngineState::Initializing && inner.attempt == attempt {
                    self.changed.wait(&mut inner);
                }
                if inner.state.is_ready() {
                    return Ok(false);
                }
                return match &inner.last_failure {
                    Some((failed, err)) if *failed == attempt => Err(err.clone()),
                    _ => Err(aborted()),
                };
            }
            EngineState::Uninitialized => {}
        }

        inner.state = EngineState::Initializing;
        inner.attempt += 1;
        let attempt = inner.attempt;
        drop(inner);

        let mut guard = AttemptGuard {
            gate: self,
            attempt,
            settled: false,
        };
        let result = init();
        guard.settle(result.clone());
        result.map(|()| true)
    }

    fn settle(&self, attempt: u64, result: Result<(), AudioError>) {
        let mut inner = self.inner.lock();
        match result {
            Ok(()) => inner.state = EngineState::Ready,
            Err(err) => {
                inner.state = EngineState::Uninitialized;
                inner.last_failure = Some((attempt, err));
            }
        }
        drop(inner);
        self.changed.notify_all();
    }
}

fn aborted() -> AudioError {
    AudioError::OutputInitFailed(Arc::new(BackendError::Device(
        "initialization aborted".to_string(),
    )))
}

/// Reopens the gate if `init` unwinds
struct AttemptGuard<'a> {
    gate: &'a EnableGate,
    attempt: u64,
    settled: bool,
}

impl AttemptGuard<'_> {
    fn settle(&mut self, result: Result<(), AudioError>) {
        self.gate.settle(self.attempt, result);
        self.settled = true;
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.gate.settle(self.attempt, Err(aborted()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn device_error() -> AudioError {
        AudioError::OutputInitFailed(Arc::new(BackendError::Device("no device".to_string())))
    }

    #[test]
    fn test_initial_state() {
        let gate = EnableGate::new();
        assert_eq!(gate.state(), EngineState::Uninitialized);
        assert!(!gate.is_ready());
        assert_eq!(gate.state().description(), "Uninitialized");
    }

    #[test]
    fn test_enable_runs_once() {
        let gate = EnableGate::new();
        let runs = AtomicUsize::new(0);

        let init = || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        assert!(gate.enable(init).unwrap());
        assert!(!gate.enable(init).unwrap());

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(gate.is_ready());
    }

    #[test]
    fn test_failure_allows_retry() {
        let gate = EnableGate::new();
        assert!(gate.enable(|| Err(device_error())).is_err());
        assert_eq!(gate.state(), EngineState::Uninitialized);

        assert!(gate.enable(|| Ok(())).unwrap());
        assert!(gate.is_ready());
    }

    #[test]
    fn test_concurrent_callers_share_one_attempt() {
        let gate = Arc::new(EnableGate::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let runs = Arc::clone(&runs);
                thread::spawn(move || {
                    gate.enable(|| {
                        runs.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok(())
                    })
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(gate.is_ready());
    }

    #[test]
    fn test_joined_callers_see_failure() {
        let gate = Arc::new(EnableGate::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let runs = Arc::clone(&runs);
                thread::spawn(move || {
                    gate.enable(|| {
                        runs.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Err(device_error())
                    })
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_err());
        }
        assert_eq!(gate.state(), EngineState::Uninitialized);
    }

    #[test]
    fn test_panicking_init_reopens_gate() {
        let gate = Arc::new(EnableGate::new());
        let panicking = Arc::clone(&gate);
        let result = thread::spawn(move || {
            let _ = panicking.enable(|| panic!("device driver crashed"));
        })
        .join();
        assert!(result.is_err());

        assert_eq!(gate.state(), EngineState::Uninitialized);
        assert!(gate.enable(|| Ok(())).unwrap());
    }
}
