/// Engine events
///
/// Notifications of things that already happened inside the engine. They are
/// broadcast to every subscriber and never block the engine.
use crate::audio_system::scheduler::VoiceId;
use crate::audio_system::source::ResourceKind;

/// Audio engine events
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// Audio output opened for the first time
    Enabled { backend: &'static str },

    /// A BGM track became current, possibly replacing another
    BgmStarted {
        name: String,
        replaced: Option<String>,
    },

    /// The current BGM track was stopped by request
    BgmStopped { name: String },

    /// A non-looping BGM track reached its end
    BgmEnded { name: String },

    /// A sound effect voice started
    SfxStarted { name: String, voice: VoiceId },

    /// A sound effect voice finished and was released
    SfxFinished { name: String, voice: VoiceId },

    /// Retrieval or decoding of a resource failed
    LoadFailed {
        kind: ResourceKind,
        name: String,
        message: String,
    },

    /// An operation was ignored because the engine is not enabled
    NotReady { operation: &'static str },
}

impl AudioEvent {
    /// Short name for logging
    pub fn label(&self) -> &'static str {
        match self {
            AudioEvent::Enabled { .. } => "enabled",
            AudioEvent::BgmStarted { .. } => "bgm_started",
            AudioEvent::BgmStopped { .. } => "bgm_stopped",
            AudioEvent::BgmEnded { .. } => "bgm_ended",
            AudioEvent::SfxStarted { .. } => "sfx_started",
            AudioEvent::SfxFinished { .. } => "sfx_finished",
            AudioEvent::LoadFailed { .. } => "load_failed",
            AudioEvent::NotReady { .. } => "not_ready",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(AudioEvent::BgmEnded { name: "a".into() }.label(), "bgm_ended");
        assert_eq!(
            AudioEvent::NotReady {
                operation: "play_sfx"
            }
            .label(),
            "not_ready"
        );
    }
}
