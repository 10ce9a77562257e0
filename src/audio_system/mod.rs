/// Audio system module
///
/// Two playback categories routed through one gain graph:
/// - Background music: at most one current track, crossfaded on change
/// - Sound effects: independent one-shot voices that overlap freely
///
/// ## Architecture
///
/// ```text
/// AudioEngine
///   ├── ResourceCache   (name -> url registries, decoded buffers, in-flight loads)
///   ├── EnableGate      (one-time output initialization)
///   └── Mixer           (behind one lock)
///       ├── GainGraph   bgm -> master -> output, sfx -> master -> output
///       ├── BgmPlayer   current voice + voices fading out
///       ├── SfxVoicePool
///       └── TaskQueue   deferred stops keyed by voice identity
/// ```
///
/// Once enabled, a driver thread advances fades and deferred stops on its
/// own; engines built with `manual_tick` leave that to the caller.
///
/// ## Usage
///
/// ```rust,ignore
/// use soundbus::{AudioEngine, BgmOptions, EngineConfig, SfxOptions, StopOptions};
///
/// let engine = AudioEngine::new(EngineConfig::default());
/// engine.register_bgm("title", "assets/title.mp3");
/// engine.register_sfx("hit", "assets/hit.wav");
///
/// engine.enable()?;
///
/// engine.play_bgm("title", BgmOptions::default())?;
/// engine.play_sfx("hit", SfxOptions::default().with_rate(1.2))?;
/// engine.stop_bgm(StopOptions::default());
/// ```
pub mod backend;
pub mod cache;
mod driver;
pub mod effects;
pub mod fetch;
pub mod gate;
pub mod manager;
pub mod player;
pub mod scheduler;
pub mod sfx;
pub mod source;

pub use backend::{AudioBackend, DecodedAudio, HeadlessBackend, RodioBackend, Voice, VoiceOptions};
pub use effects::{Bus, BusId};
pub use fetch::{HttpFetcher, MemoryFetcher, ResourceFetcher};
pub use gate::EngineState;
pub use manager::{AudioEngine, AudioEngineBuilder, Outcome};
pub use player::{BgmOptions, BgmState, StopOptions, TrackInfo};
pub use scheduler::VoiceId;
pub use sfx::{SfxInfo, SfxOptions};
pub use source::ResourceKind;
