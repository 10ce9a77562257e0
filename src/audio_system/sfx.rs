/// Sound effect voices
///
/// Every `play_sfx` creates an independent, non-looping voice. Voices overlap
/// freely and are reaped once they finish.
use std::time::Duration;

use super::backend::Voice;
use super::effects::{clamp01, clamp_rate, BusId, GainGraph};
use super::scheduler::VoiceId;

/// Per-call options for a sound effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SfxOptions {
    /// Per-call gain, clamped to `[0, 1]`
    pub volume: f32,
    /// Playback rate, clamped to `[0.25, 4]`
    pub rate: f32,
}

impl Default for SfxOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            rate: 1.0,
        }
    }
}

impl SfxOptions {
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    pub fn effective_volume(&self) -> f32 {
        clamp01(self.volume)
    }

    pub fn effective_rate(&self) -> f32 {
        clamp_rate(self.rate)
    }
}

/// Public view of a live sound effect
#[derive(Debug, Clone, PartialEq)]
pub struct SfxInfo {
    pub voice: VoiceId,
    pub name: String,
    pub gain: f32,
}

struct TransientVoice {
    id: VoiceId,
    name: String,
    gain: f32,
    voice: Box<dyn Voice>,
}

/// Live sound effect voices
#[derive(Default)]
pub struct SfxVoicePool {
    voices: Vec<TransientVoice>,
}

impl SfxVoicePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a started voice with its per-call gain
    pub fn add(&mut self, id: VoiceId, name: &str, gain: f32, voice: Box<dyn Voice>) {
        self.voices.push(TransientVoice {
            id,
            name: name.to_string(),
            gain,
            voice,
        });
    }

    /// Disconnect finished voices and return their ids and names
    pub fn reap(&mut self) -> Vec<(VoiceId, String)> {
        let mut finished = Vec::new();
        self.voices.retain(|v| {
            if v.voice.is_finished() {
                finished.push((v.id, v.name.clone()));
                false
            } else {
                true
            }
        });
        finished
    }

    /// Push `gain * sfx * master` to every live voice
    pub fn apply_gains(&self, graph: &GainGraph, now: Duration) {
        let bus_gain = graph.output_gain(BusId::Sfx, now);
        for v in &self.voices {
            v.voice.set_volume(v.gain * bus_gain);
        }
    }

    pub fn active(&self) -> Vec<SfxInfo> {
        self.voices
            .iter()
            .map(|v| SfxInfo {
                voice: v.id,
                name: v.name.clone(),
                gain: v.gain,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::scheduler::VoiceIds;
    use crate::config::EngineConfig;
    use approx::assert_relative_eq;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct FlagVoice {
        volume: Arc<Mutex<f32>>,
        done: Arc<Mutex<bool>>,
    }

    impl Voice for FlagVoice {
        fn set_volume(&self, volume: f32) {
            *self.volume.lock() = volume;
        }

        fn stop(&self) {
            *self.done.lock() = true;
        }

        fn is_finished(&self) -> bool {
            *self.done.lock()
        }
    }

    #[test]
    fn test_options_clamping() {
        let options = SfxOptions::default().with_volume(3.0).with_rate(0.0);
        assert_eq!(options.effective_volume(), 1.0);
        assert_eq!(options.effective_rate(), 1.0);

        let options = SfxOptions::default().with_volume(-1.0).with_rate(9.0);
        assert_eq!(options.effective_volume(), 0.0);
        assert_eq!(options.effective_rate(), 4.0);
    }

    #[test]
    fn test_gains_and_reaping() {
        let mut ids = VoiceIds::default();
        let mut graph = GainGraph::new(&EngineConfig::default());
        graph.bus_mut(BusId::Master).set_immediate(0.5);
        let mut pool = SfxVoicePool::new();

        let volume = Arc::new(Mutex::new(0.0));
        let done = Arc::new(Mutex::new(false));
        let first = ids.next_id();
        pool.add(
            first,
            "hit",
            0.5,
            Box::new(FlagVoice {
                volume: Arc::clone(&volume),
                done: Arc::clone(&done),
            }),
        );
        pool.add(
            ids.next_id(),
            "hit",
            1.0,
            Box::new(FlagVoice {
                volume: Arc::new(Mutex::new(0.0)),
                done: Arc::new(Mutex::new(false)),
            }),
        );

        pool.apply_gains(&graph, Duration::ZERO);
        assert_relative_eq!(*volume.lock(), 0.5 * 0.9 * 0.5, epsilon = 1e-6);
        assert_eq!(pool.len(), 2);

        *done.lock() = true;
        assert_eq!(pool.reap(), vec![(first, "hit".to_string())]);
        assert_eq!(pool.len(), 1);
        assert!(pool.reap().is_empty());
    }
}
