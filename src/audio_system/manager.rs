/// Audio engine
///
/// Front door of the crate. Owns the resource cache, the gain graph, the BGM
/// player, the sound effect voices and the deferred-task queue, and
/// serializes every state change through one mixer lock. Loads run without
/// the lock held so playback and volume changes never wait on the network.
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use super::backend::{AudioBackend, DecodedAudio, RodioBackend, VoiceOptions};
use super::cache::ResourceCache;
use super::driver::Driver;
use super::effects::{Bus, BusId, GainGraph};
use super::fetch::{HttpFetcher, ResourceFetcher};
use super::gate::{EnableGate, EngineState};
use super::player::{BgmOptions, BgmPlayer, BgmState, StopOptions, TrackInfo};
use super::scheduler::{DeferredTask, RequestTickets, TaskQueue, VoiceIds};
use super::sfx::{SfxInfo, SfxOptions, SfxVoicePool};
use super::source::ResourceKind;
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, PreloadRequest, ResourceManifest};
use crate::error::AudioError;
use crate::messaging::{AudioEvent, EventBus, SubscriberId};

/// What a playback call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new voice was started
    Started,
    /// The requested BGM is already current; nothing changed
    AlreadyPlaying,
    /// The current BGM was faded out
    Stopped,
    /// No BGM was playing
    Idle,
    /// A later BGM request arrived while this one was loading
    Superseded,
    /// The engine is not enabled; the call was ignored
    NotReady,
}

impl Outcome {
    /// Check if the call changed what is audible
    pub fn is_effective(&self) -> bool {
        matches!(self, Outcome::Started | Outcome::Stopped)
    }
}

/// Everything guarded by the mixer lock
struct Mixer {
    graph: GainGraph,
    bgm: BgmPlayer,
    sfx: SfxVoicePool,
    tasks: TaskQueue,
    ids: VoiceIds,
}

impl Mixer {
    fn new(config: &EngineConfig) -> Self {
        Self {
            graph: GainGraph::new(config),
            bgm: BgmPlayer::new(config.bgm_volume, config.stop_grace()),
            sfx: SfxVoicePool::new(),
            tasks: TaskQueue::new(),
            ids: VoiceIds::default(),
        }
    }

    /// Run due tasks, reap finished voices and refresh gains
    fn advance(&mut self, now: Duration) -> Vec<AudioEvent> {
        let mut events = Vec::new();

        for task in self.tasks.drain_due(now) {
            match task {
                DeferredTask::StopBgmVoice(id) => {
                    self.bgm.dispose(id);
                }
            }
        }

        if let Some(name) = self.bgm.poll_finished() {
            events.push(AudioEvent::BgmEnded { name });
        }

        for (voice, name) in self.sfx.reap() {
            tracing::trace!("SFX '{}' on {} finished", name, voice);
            events.push(AudioEvent::SfxFinished { name, voice });
        }

        self.graph.settle(now);
        self.apply_gains(now);
        events
    }

    fn apply_gains(&self, now: Duration) {
        self.bgm.apply_gains(&self.graph, now);
        self.sfx.apply_gains(&self.graph, now);
    }
}

struct EngineShared {
    config: EngineConfig,
    backend: Arc<dyn AudioBackend>,
    clock: Arc<dyn Clock>,
    cache: ResourceCache,
    gate: EnableGate,
    mixer: Mutex<Option<Mixer>>,
    events: EventBus,
    /// Orders `play_bgm`/`stop_bgm` calls against slow loads
    bgm_requests: RequestTickets,
    manual_tick: bool,
    driver: Mutex<Option<Driver>>,
}

/// Builder for [`AudioEngine`]
///
/// Defaults to the rodio output, an HTTP/file fetcher and the system clock.
/// The built engine advances its own fades and stops on a background thread
/// once enabled, unless [`manual_tick`](Self::manual_tick) is set.
#[derive(Default)]
pub struct AudioEngineBuilder {
    config: EngineConfig,
    backend: Option<Arc<dyn AudioBackend>>,
    fetcher: Option<Arc<dyn ResourceFetcher>>,
    clock: Option<Arc<dyn Clock>>,
    manual_tick: bool,
}

impl AudioEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn AudioBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Start no driver thread; the caller advances time with
    /// [`AudioEngine::tick`]
    pub fn manual_tick(mut self) -> Self {
        self.manual_tick = true;
        self
    }

    pub fn build(self) -> AudioEngine {
        let config = self.config;
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(RodioBackend::new()));
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HttpFetcher::new(config.fetch_timeout())));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));

        tracing::debug!("Building audio engine on {} backend", backend.name());
        AudioEngine {
            shared: Arc::new(EngineShared {
                cache: ResourceCache::new(fetcher, Arc::clone(&backend)),
                config,
                backend,
                clock,
                gate: EnableGate::new(),
                mixer: Mutex::new(None),
                events: EventBus::new(),
                bgm_requests: RequestTickets::new(),
                manual_tick: self.manual_tick,
                driver: Mutex::new(None),
            }),
        }
    }
}

/// BGM/SFX audio engine
///
/// Cheap to clone; clones share one engine. The driver thread stops when the
/// last clone is dropped.
#[derive(Clone)]
pub struct AudioEngine {
    shared: Arc<EngineShared>,
}

/// Non-owning engine handle held by the driver
pub(crate) struct WeakEngine(Weak<EngineShared>);

impl WeakEngine {
    pub(crate) fn upgrade(&self) -> Option<AudioEngine> {
        self.0.upgrade().map(|shared| AudioEngine { shared })
    }
}

impl AudioEngine {
    pub fn builder() -> AudioEngineBuilder {
        AudioEngineBuilder::default()
    }

    /// Engine with default collaborators
    pub fn new(config: EngineConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn state(&self) -> EngineState {
        self.shared.gate.state()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.gate.is_ready()
    }

    /// Open the audio output, wire the gain graph and start the driver
    ///
    /// Idempotent; concurrent callers share one initialization. A failure
    /// leaves the engine uninitialized so the call can be retried.
    pub fn enable(&self) -> Result<(), AudioError> {
        let shared = &self.shared;
        let opened = shared.gate.enable(|| {
            shared
                .backend
                .open()
                .map_err(|e| AudioError::OutputInitFailed(Arc::new(e)))?;

            if !shared.manual_tick {
                let mut driver = shared.driver.lock();
                if driver.is_none() {
                    let weak = WeakEngine(Arc::downgrade(shared));
                    *driver = Some(
                        Driver::spawn(weak, shared.config.tick_interval())
                            .map_err(|e| AudioError::DriverFailed(Arc::new(e)))?,
                    );
                }
            }

            let mixer = Mixer::new(&shared.config);
            mixer.apply_gains(shared.clock.now());
            *shared.mixer.lock() = Some(mixer);
            Ok(())
        });

        match opened {
            Ok(true) => {
                tracing::info!("Audio engine enabled ({} backend)", shared.backend.name());
                shared.events.publish(AudioEvent::Enabled {
                    backend: shared.backend.name(),
                });
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                tracing::error!("Failed to enable audio engine: {}", e);
                Err(e)
            }
        }
    }

    // Registration

    pub fn register_bgm(&self, name: &str, url: &str) {
        self.shared.cache.register(ResourceKind::Bgm, name, url);
    }

    pub fn register_sfx(&self, name: &str, url: &str) {
        self.shared.cache.register(ResourceKind::Sfx, name, url);
    }

    /// Register every entry of `manifest`
    pub fn register_all(&self, manifest: &ResourceManifest) {
        for (name, url) in &manifest.bgm {
            self.register_bgm(name, url);
        }
        for (name, url) in &manifest.sfx {
            self.register_sfx(name, url);
        }
    }

    /// Registered BGM names in registration order
    pub fn list_bgm(&self) -> Vec<String> {
        self.shared.cache.names(ResourceKind::Bgm)
    }

    /// Registered SFX names in registration order
    pub fn list_sfx(&self) -> Vec<String> {
        self.shared.cache.names(ResourceKind::Sfx)
    }

    pub fn is_loaded(&self, kind: ResourceKind, name: &str) -> bool {
        self.shared.cache.is_loaded(kind, name)
    }

    // Loading

    pub fn load_bgm(&self, name: &str) -> Result<(), AudioError> {
        self.load(ResourceKind::Bgm, name).map(|_| ())
    }

    pub fn load_sfx(&self, name: &str) -> Result<(), AudioError> {
        self.load(ResourceKind::Sfx, name).map(|_| ())
    }

    /// Load exactly the listed names, one after another
    ///
    /// Stops at the first failure.
    pub fn preload(&self, request: &PreloadRequest) -> Result<(), AudioError> {
        for name in &request.bgm {
            self.load_bgm(name)?;
        }
        for name in &request.sfx {
            self.load_sfx(name)?;
        }
        tracing::debug!(
            "Preloaded {} BGM and {} SFX",
            request.bgm.len(),
            request.sfx.len()
        );
        Ok(())
    }

    fn load(&self, kind: ResourceKind, name: &str) -> Result<Arc<DecodedAudio>, AudioError> {
        self.shared.cache.load(kind, name).map_err(|e| {
            if !matches!(e, AudioError::NotRegistered { .. }) {
                self.shared.events.publish(AudioEvent::LoadFailed {
                    kind,
                    name: name.to_string(),
                    message: e.to_string(),
                });
            }
            e
        })
    }

    // Playback

    /// Start `name` as the current BGM, crossfading from any previous track
    ///
    /// Loads the track first if needed. Returns `AlreadyPlaying` when `name`
    /// is current and `restart` is off, and `Superseded` when a later
    /// `play_bgm` or `stop_bgm` took effect during the load. A call that
    /// fails changes nothing.
    pub fn play_bgm(&self, name: &str, options: BgmOptions) -> Result<Outcome, AudioError> {
        if !self.check_ready("play_bgm") {
            return Ok(Outcome::NotReady);
        }

        let requests = &self.shared.bgm_requests;
        let ticket = requests.issue();

        if !options.restart {
            let current = self.with_mixer(|m| {
                let current = m.bgm.is_current(name);
                if current {
                    requests.commit(ticket);
                }
                current
            });
            if current.unwrap_or(false) {
                tracing::debug!("BGM '{}' already playing", name);
                return Ok(Outcome::AlreadyPlaying);
            }
        }

        let audio = self.load(ResourceKind::Bgm, name)?;

        let mut guard = self.shared.mixer.lock();
        let Some(mixer) = guard.as_mut() else {
            return Ok(Outcome::NotReady);
        };
        if requests.is_stale(ticket) {
            tracing::debug!("BGM '{}' superseded while loading", name);
            return Ok(Outcome::Superseded);
        }

        let voice = self
            .shared
            .backend
            .start_voice(
                &audio,
                &VoiceOptions {
                    looping: options.looping,
                    rate: 1.0,
                    volume: 0.0,
                },
            )
            .map_err(|e| AudioError::PlaybackFailed(Arc::new(e)))?;

        requests.commit(ticket);

        let now = self.shared.clock.now();
        let id = mixer.ids.next_id();
        let Mixer {
            graph, bgm, tasks, ..
        } = &mut *mixer;
        let replaced = bgm.start(
            id,
            name,
            options.looping,
            voice,
            options.fade_ms,
            graph.bus_mut(BusId::Bgm),
            tasks,
            now,
        );
        mixer.apply_gains(now);
        drop(guard);

        match &replaced {
            Some(old) => tracing::info!("BGM '{}' -> '{}' ({}ms)", old, name, options.fade_ms),
            None => tracing::info!("Playing BGM '{}' ({}ms fade)", name, options.fade_ms),
        }
        self.shared.events.publish(AudioEvent::BgmStarted {
            name: name.to_string(),
            replaced,
        });
        Ok(Outcome::Started)
    }

    /// Fade out the current BGM
    ///
    /// The engine reports idle immediately; the voice is released after the
    /// fade. Also cancels any `play_bgm` still loading.
    pub fn stop_bgm(&self, options: StopOptions) -> Outcome {
        if !self.check_ready("stop_bgm") {
            return Outcome::NotReady;
        }
        let ticket = self.shared.bgm_requests.issue();

        let now = self.shared.clock.now();
        let mut guard = self.shared.mixer.lock();
        let Some(mixer) = guard.as_mut() else {
            return Outcome::NotReady;
        };
        self.shared.bgm_requests.commit(ticket);

        let Mixer {
            graph, bgm, tasks, ..
        } = &mut *mixer;
        let Some(name) = bgm.stop(options.fade_ms, graph.bus_mut(BusId::Bgm), tasks, now) else {
            return Outcome::Idle;
        };
        mixer.apply_gains(now);
        drop(guard);

        tracing::info!("Stopping BGM '{}' ({}ms fade)", name, options.fade_ms);
        self.shared.events.publish(AudioEvent::BgmStopped { name });
        Outcome::Stopped
    }

    /// Play a one-shot sound effect on its own voice
    pub fn play_sfx(&self, name: &str, options: SfxOptions) -> Result<Outcome, AudioError> {
        if !self.check_ready("play_sfx") {
            return Ok(Outcome::NotReady);
        }

        let audio = self.load(ResourceKind::Sfx, name)?;
        let gain = options.effective_volume();
        let rate = options.effective_rate();

        let mut guard = self.shared.mixer.lock();
        let Some(mixer) = guard.as_mut() else {
            return Ok(Outcome::NotReady);
        };

        let now = self.shared.clock.now();
        let voice = self
            .shared
            .backend
            .start_voice(
                &audio,
                &VoiceOptions {
                    looping: false,
                    rate,
                    volume: gain * mixer.graph.output_gain(BusId::Sfx, now),
                },
            )
            .map_err(|e| AudioError::PlaybackFailed(Arc::new(e)))?;

        let id = mixer.ids.next_id();
        mixer.sfx.add(id, name, gain, voice);
        drop(guard);

        tracing::debug!("Playing SFX '{}' on {} (gain {:.2}, rate {:.2})", name, id, gain, rate);
        self.shared.events.publish(AudioEvent::SfxStarted {
            name: name.to_string(),
            voice: id,
        });
        Ok(Outcome::Started)
    }

    // Volume

    pub fn set_master_volume(&self, volume: f32) {
        self.set_volume(BusId::Master, volume);
    }

    pub fn set_bgm_volume(&self, volume: f32) {
        self.set_volume(BusId::Bgm, volume);
    }

    pub fn set_sfx_volume(&self, volume: f32) {
        self.set_volume(BusId::Sfx, volume);
    }

    /// Set a bus instantly, cancelling any fade on it
    ///
    /// A BGM change also reaches tracks still fading out.
    pub fn set_volume(&self, bus: BusId, volume: f32) {
        let now = self.shared.clock.now();
        let applied = self.with_mixer_mut(|mixer| {
            let target = mixer.graph.bus_mut(bus);
            target.set_immediate(volume);
            let level = target.value_at(now);
            if bus == BusId::Bgm {
                mixer.bgm.set_outgoing_level(level);
            }
            tracing::debug!("Set {} volume to {:.2}", bus, level);
            mixer.apply_gains(now);
        });

        if applied.is_none() {
            self.report_not_ready("set_volume");
        }
    }

    /// Current value of a bus, `None` before `enable`
    pub fn volume(&self, bus: BusId) -> Option<f32> {
        let now = self.shared.clock.now();
        self.with_mixer(|m| m.graph.bus(bus).value_at(now))
    }

    pub fn master_volume(&self) -> Option<f32> {
        self.volume(BusId::Master)
    }

    pub fn bgm_volume(&self) -> Option<f32> {
        self.volume(BusId::Bgm)
    }

    pub fn sfx_volume(&self) -> Option<f32> {
        self.volume(BusId::Sfx)
    }

    /// Copy of a bus including any pending ramp
    pub fn bus_snapshot(&self, bus: BusId) -> Option<Bus> {
        self.with_mixer(|m| m.graph.bus(bus).clone())
    }

    // Introspection

    pub fn bgm_state(&self) -> BgmState {
        self.with_mixer(|m| m.bgm.state())
            .unwrap_or(BgmState::Idle)
    }

    pub fn current_bgm(&self) -> Option<TrackInfo> {
        self.with_mixer(|m| m.bgm.current()).flatten()
    }

    pub fn active_sfx(&self) -> Vec<SfxInfo> {
        self.with_mixer(|m| m.sfx.active()).unwrap_or_default()
    }

    /// Number of deferred tasks not yet fired
    pub fn pending_tasks(&self) -> usize {
        self.with_mixer(|m| m.tasks.len()).unwrap_or(0)
    }

    // Events

    pub fn subscribe(&self) -> (Receiver<AudioEvent>, SubscriberId) {
        self.shared.events.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.shared.events.unsubscribe(id);
    }

    // Time

    /// Advance the engine to the clock's current time
    ///
    /// Fires due stops, detects finished voices and pushes ramp values to
    /// the voices. Called by the driver thread, or by the caller when the
    /// engine was built with [`AudioEngineBuilder::manual_tick`].
    pub fn tick(&self) {
        let now = self.shared.clock.now();
        let events = match self.shared.mixer.lock().as_mut() {
            Some(mixer) => mixer.advance(now),
            None => return,
        };

        for event in events {
            self.shared.events.publish(event);
        }
    }

    /// Check if the driver thread is advancing the engine
    pub fn is_driven(&self) -> bool {
        self.shared
            .driver
            .lock()
            .as_ref()
            .is_some_and(Driver::is_running)
    }

    fn with_mixer<R>(&self, f: impl FnOnce(&Mixer) -> R) -> Option<R> {
        self.shared.mixer.lock().as_ref().map(f)
    }

    fn with_mixer_mut<R>(&self, f: impl FnOnce(&mut Mixer) -> R) -> Option<R> {
        self.shared.mixer.lock().as_mut().map(f)
    }

    fn check_ready(&self, operation: &'static str) -> bool {
        if self.shared.gate.is_ready() {
            return true;
        }
        self.report_not_ready(operation);
        false
    }

    fn report_not_ready(&self, operation: &'static str) {
        tracing::warn!("Ignoring {}: audio engine not enabled", operation);
        self.shared
            .events
            .publish(AudioEvent::NotReady { operation });
    }
}
