use std::sync::Arc;

use thiserror::Error;

use crate::audio_system::source::ResourceKind;

/// Engine-level errors using thiserror for structured error handling.
///
/// `AudioError` is `Clone` because a single load outcome is handed to every
/// caller that joined the same in-flight load; inner causes are shared behind
/// an `Arc` so the source chain survives the clone.
#[derive(Error, Debug, Clone)]
pub enum AudioError {
    #[error("{kind} '{name}' not registered")]
    NotRegistered { kind: ResourceKind, name: String },

    #[error("Failed to retrieve audio: {url}")]
    RetrievalFailed {
        url: String,
        #[source]
        source: Arc<FetchError>,
    },

    #[error("Failed to decode {kind} '{name}'")]
    DecodeFailed {
        kind: ResourceKind,
        name: String,
        #[source]
        source: Arc<BackendError>,
    },

    #[error("Load of {kind} '{name}' was aborted")]
    LoadAborted { kind: ResourceKind, name: String },

    #[error("Failed to initialize audio output")]
    OutputInitFailed(#[source] Arc<BackendError>),

    #[error("Failed to start audio driver")]
    DriverFailed(#[source] Arc<std::io::Error>),

    #[error("Audio playback failed")]
    PlaybackFailed(#[source] Arc<BackendError>),
}

/// Failures reported by an [`AudioBackend`](crate::audio_system::backend::AudioBackend).
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Output device unavailable: {0}")]
    Device(String),

    #[error("Invalid audio data: {0}")]
    InvalidData(String),

    #[error("Failed to start voice: {0}")]
    Voice(String),

    #[error("Audio output is not open")]
    NotOpen,
}

/// Failures reported by a [`ResourceFetcher`](crate::audio_system::fetch::ResourceFetcher).
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Server returned status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("No resource at {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = AudioError::NotRegistered {
            kind: ResourceKind::Bgm,
            name: "stage1".to_string(),
        };
        assert_eq!(err.to_string(), "BGM 'stage1' not registered");

        let err = AudioError::NotRegistered {
            kind: ResourceKind::Sfx,
            name: "hit".to_string(),
        };
        assert_eq!(err.to_string(), "SFX 'hit' not registered");
    }

    #[test]
    fn test_error_source_chain() {
        let err = AudioError::RetrievalFailed {
            url: "https://example.com/a.mp3".to_string(),
            source: Arc::new(FetchError::Status {
                url: "https://example.com/a.mp3".to_string(),
                status: 404,
            }),
        };

        let source = err.source().expect("retrieval failure carries its cause");
        assert!(source.to_string().contains("404"));
        assert_eq!(err.to_string(), "Failed to retrieve audio: https://example.com/a.mp3");
    }

    #[test]
    fn test_clone_shares_source() {
        let err = AudioError::DecodeFailed {
            kind: ResourceKind::Sfx,
            name: "hit".to_string(),
            source: Arc::new(BackendError::InvalidData("bad header".to_string())),
        };
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
        assert_eq!(
            copy.source().map(|s| s.to_string()),
            Some("Invalid audio data: bad header".to_string())
        );
    }

    #[test]
    fn test_config_error_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::LoadFailed {
            path: "/test/engine.json".to_string(),
            source: Box::new(io_err),
        };
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "Failed to load configuration from /test/engine.json");
    }
}
