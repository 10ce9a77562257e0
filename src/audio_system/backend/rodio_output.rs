/// rodio output backend
///
/// The `OutputStream` is not `Send`, so it lives on a dedicated thread for the
/// lifetime of the backend; only its `OutputStreamHandle` crosses threads.
/// Every voice gets its own `Sink`.
use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use super::{AudioBackend, DecodedAudio, Voice, VoiceOptions};
use crate::error::BackendError;

/// Handle to the output thread; dropping `_keepalive` closes the stream
struct OutputLink {
    handle: OutputStreamHandle,
    _keepalive: Sender<()>,
}

/// Backend playing through the default output device
pub struct RodioBackend {
    output: Mutex<Option<OutputLink>>,
}

impl RodioBackend {
    pub fn new() -> Self {
        Self {
            output: Mutex::new(None),
        }
    }

    /// Check if the output stream is open
    pub fn is_open(&self) -> bool {
        self.output.lock().is_some()
    }
}

impl Default for RodioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for RodioBackend {
    fn name(&self) -> &'static str {
        "rodio"
    }

    fn open(&self) -> Result<(), BackendError> {
        let mut output = self.output.lock();
        if output.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = bounded(1);
        let (keepalive_tx, keepalive_rx) = bounded::<()>(0);

        thread::Builder::new()
            .name("soundbus-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = ready_tx.send(Ok(handle));
                    // Blocks until the backend drops its sender.
                    let _ = keepalive_rx.recv();
                    drop(stream);
                    tracing::debug!("Audio output stream closed");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                }
            })
            .map_err(|e| BackendError::Device(e.to_string()))?;

        let handle = ready_rx
            .recv()
            .map_err(|_| BackendError::Device("output thread exited early".to_string()))?
            .map_err(BackendError::Device)?;

        *output = Some(OutputLink {
            handle,
            _keepalive: keepalive_tx,
        });
        tracing::info!("Audio output stream opened");
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, BackendError> {
        let decoder = Decoder::new(Cursor::new(bytes.to_vec()))
            .map_err(|e| BackendError::InvalidData(e.to_string()))?;

        let channels = decoder.channels();
        let sample_rate = decoder.sample_rate();
        let samples: Vec<i16> = decoder.collect();
        if samples.is_empty() {
            return Err(BackendError::InvalidData("stream contains no samples".to_string()));
        }

        Ok(DecodedAudio::new(channels, sample_rate, samples))
    }

    fn start_voice(
        &self,
        audio: &DecodedAudio,
        options: &VoiceOptions,
    ) -> Result<Box<dyn Voice>, BackendError> {
        let output = self.output.lock();
        let link = output.as_ref().ok_or(BackendError::NotOpen)?;
        let sink = Sink::try_new(&link.handle).map_err(|e| BackendError::Voice(e.to_string()))?;

        // Each transformation returns a different type, so we use dynamic dispatch
        let mut source: Box<dyn Source<Item = i16> + Send> = Box::new(SharedSource::new(audio));
        if (options.rate - 1.0).abs() > f32::EPSILON {
            source = Box::new(source.speed(options.rate));
        }
        if options.looping {
            source = Box::new(source.repeat_infinite());
        }

        sink.set_volume(options.volume);
        sink.append(source);
        sink.play();

        Ok(Box::new(RodioVoice { sink }))
    }
}

/// Source reading a decoded buffer in place
///
/// Every voice of the same buffer shares one allocation.
#[derive(Clone)]
struct SharedSource {
    samples: Arc<Vec<i16>>,
    position: usize,
    channels: u16,
    sample_rate: u32,
    duration: Duration,
}

impl SharedSource {
    fn new(audio: &DecodedAudio) -> Self {
        Self {
            samples: audio.shared_samples(),
            position: 0,
            channels: audio.channels(),
            sample_rate: audio.sample_rate(),
            duration: audio.duration(),
        }
    }
}

impl Iterator for SharedSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        let sample = self.samples.get(self.position).copied()?;
        self.position += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.samples.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl Source for SharedSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.duration)
    }
}

/// A voice backed by its own `Sink`
struct RodioVoice {
    sink: Sink,
}

impl Voice for RodioVoice {
    fn set_volume(&self, volume: f32) {
        self.sink.set_volume(volume.clamp(0.0, 1.0));
    }

    fn stop(&self) {
        self.sink.stop();
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }
}
