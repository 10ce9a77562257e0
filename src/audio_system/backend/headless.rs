/// Headless backend
///
/// Plays nothing. Decodes WAV with `hound`, times each voice against a
/// [`Clock`] so non-looping voices finish after their real length, and keeps a
/// record of every voice it started. Useful for servers, CI and tests.
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{AudioBackend, DecodedAudio, Voice, VoiceOptions};
use crate::clock::Clock;
use crate::error::BackendError;

/// Snapshot of one headless voice
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceRecord {
    /// Start order, from 0
    pub index: usize,
    pub looping: bool,
    pub rate: f32,

    /// Last gain pushed to the voice
    pub volume: f32,
    pub started_at: Duration,

    /// Playback length at the voice's rate
    pub length: Duration,
    pub stopped_at: Option<Duration>,

    /// Set once the engine drops the voice
    pub disconnected: bool,
}

impl VoiceRecord {
    /// Check if playback ended by `now`
    pub fn is_finished_at(&self, now: Duration) -> bool {
        if self.stopped_at.is_some() {
            return true;
        }
        !self.looping && now >= self.started_at + self.length
    }
}

#[derive(Default)]
struct HeadlessState {
    open_count: usize,
    open_failure: Option<String>,
    decode_count: usize,
    voices: Vec<Arc<Mutex<VoiceRecord>>>,
}

/// Backend that simulates playback against a clock
pub struct HeadlessBackend {
    clock: Arc<dyn Clock>,
    state: Mutex<HeadlessState>,
}

impl HeadlessBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(HeadlessState::default()),
        }
    }

    /// Make subsequent `open` calls fail with `message`, or succeed again with `None`
    pub fn set_open_failure(&self, message: Option<&str>) {
        self.state.lock().open_failure = message.map(str::to_string);
    }

    /// Number of successful `open` calls
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Number of successful decodes
    pub fn decode_count(&self) -> usize {
        self.state.lock().decode_count
    }

    /// Every voice started so far, in start order
    pub fn voices(&self) -> Vec<VoiceRecord> {
        self.state
            .lock()
            .voices
            .iter()
            .map(|record| record.lock().clone())
            .collect()
    }

    /// Voices still connected to the output
    pub fn connected_voices(&self) -> Vec<VoiceRecord> {
        self.voices()
            .into_iter()
            .filter(|record| !record.disconnected)
            .collect()
    }

    pub fn voice_count(&self) -> usize {
        self.state.lock().voices.len()
    }
}

impl AudioBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn open(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if let Some(message) = &state.open_failure {
            return Err(BackendError::Device(message.clone()));
        }
        state.open_count += 1;
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, BackendError> {
        let audio = decode_wav(bytes)?;
        self.state.lock().decode_count += 1;
        Ok(audio)
    }

    fn start_voice(
        &self,
        audio: &DecodedAudio,
        options: &VoiceOptions,
    ) -> Result<Box<dyn Voice>, BackendError> {
        let mut state = self.state.lock();
        if state.open_count == 0 {
            return Err(BackendError::NotOpen);
        }

        let rate = if options.rate > 0.0 { options.rate } else { 1.0 };
        let record = Arc::new(Mutex::new(VoiceRecord {
            index: state.voices.len(),
            looping: options.looping,
            rate,
            volume: options.volume,
            started_at: self.clock.now(),
            length: audio.duration().div_f32(rate),
            stopped_at: None,
            disconnected: false,
        }));
        state.voices.push(Arc::clone(&record));

        Ok(Box::new(HeadlessVoice {
            record,
            clock: Arc::clone(&self.clock),
        }))
    }
}

struct HeadlessVoice {
    record: Arc<Mutex<VoiceRecord>>,
    clock: Arc<dyn Clock>,
}

impl Voice for HeadlessVoice {
    fn set_volume(&self, volume: f32) {
        self.record.lock().volume = volume;
    }

    fn stop(&self) {
        let now = self.clock.now();
        let mut record = self.record.lock();
        if record.stopped_at.is_none() {
            record.stopped_at = Some(now);
        }
    }

    fn is_finished(&self) -> bool {
        let now = self.clock.now();
        self.record.lock().is_finished_at(now)
    }
}

impl Drop for HeadlessVoice {
    fn drop(&mut self) {
        self.record.lock().disconnected = true;
    }
}

/// Decode a WAV file into 16-bit interleaved PCM
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio, BackendError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| BackendError::InvalidData(e.to_string()))?;
    let spec = reader.spec();

    let samples: Result<Vec<i16>, hound::Error> = match spec.sample_format {
        hound::SampleFormat::Int if spec.bits_per_sample <= 16 => {
            let shift = 16 - spec.bits_per_sample;
            reader
                .into_samples::<i16>()
                .map(|s| s.map(|v| v << shift))
                .collect()
        }
        hound::SampleFormat::Int => {
            let shift = spec.bits_per_sample - 16;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect()
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect(),
    };
    let samples = samples.map_err(|e| BackendError::InvalidData(e.to_string()))?;

    Ok(DecodedAudio::new(spec.channels, spec.sample_rate, samples))
}
