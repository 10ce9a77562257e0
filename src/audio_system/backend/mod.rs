/// Host audio capability surface
///
/// The engine never touches an output device directly. It asks an
/// [`AudioBackend`] to open the output, decode bytes and start voices, and it
/// drives each [`Voice`]'s gain itself from the bus graph.
pub mod headless;
pub mod rodio_output;

use std::sync::Arc;
use std::time::Duration;

use crate::error::BackendError;

pub use self::headless::{HeadlessBackend, VoiceRecord};
pub use self::rodio_output::RodioBackend;

/// Decoded, immutable PCM shared by every voice that plays it
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    channels: u16,
    sample_rate: u32,
    samples: Arc<Vec<i16>>,
}

impl DecodedAudio {
    /// Wrap interleaved 16-bit samples
    pub fn new(channels: u16, sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            channels,
            sample_rate,
            samples: Arc::new(samples),
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Handle to the shared samples, for sources that need `'static` data
    pub fn shared_samples(&self) -> Arc<Vec<i16>> {
        Arc::clone(&self.samples)
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            channels => self.samples.len() / channels as usize,
        }
    }

    /// Playback length at normal speed
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Parameters for a new voice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceOptions {
    pub looping: bool,

    /// Playback rate, already clamped by the caller
    pub rate: f32,

    /// Initial output gain
    pub volume: f32,
}

impl Default for VoiceOptions {
    fn default() -> Self {
        Self {
            looping: false,
            rate: 1.0,
            volume: 1.0,
        }
    }
}

/// One playing instance of a buffer
///
/// Dropping a voice disconnects it from the output.
pub trait Voice: Send {
    /// Set the voice's output gain (0.0-1.0)
    fn set_volume(&self, volume: f32);

    /// Stop playback; stopping twice is harmless
    fn stop(&self);

    /// Check if playback has ended, naturally or by `stop`
    fn is_finished(&self) -> bool;
}

/// Output device and decoder provided by the host platform
pub trait AudioBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Acquire the output and resume it if suspended; idempotent
    fn open(&self) -> Result<(), BackendError>;

    /// Decode raw resource bytes into playable PCM
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, BackendError>;

    /// Start a voice playing `audio`
    fn start_voice(
        &self,
        audio: &DecodedAudio,
        options: &VoiceOptions,
    ) -> Result<Box<dyn Voice>, BackendError>;
}
