//! Background music and sound effect engine
//!
//! Named audio resources are registered by URL, loaded once and shared, and
//! played through a three-bus gain graph. BGM changes crossfade; sound effects
//! overlap freely. See [`AudioEngine`] for the full operation surface.

pub mod audio_system;
pub mod clock;
pub mod config;
pub mod error;
pub mod messaging;

pub use audio_system::{
    AudioBackend, AudioEngine, AudioEngineBuilder, BgmOptions, BgmState, BusId,
    EngineState, HeadlessBackend, HttpFetcher, MemoryFetcher, Outcome, ResourceFetcher,
    ResourceKind, RodioBackend, SfxOptions, StopOptions, VoiceId,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, PreloadRequest, ResourceManifest};
pub use error::{AudioError, BackendError, ConfigError, FetchError};
pub use messaging::{AudioEvent, SubscriberId};
