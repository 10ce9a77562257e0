/// Background music player
///
/// Owns at most one current BGM voice plus any voices still fading out after
/// being replaced or stopped. The current voice is routed through the BGM bus;
/// retiring voices are detached from its ramp and carry their own fade, so an
/// incoming track can fade in on the bus while the outgoing one fades out.
/// A user volume change on the bus still reaches them at once.
use std::time::Duration;

use super::backend::Voice;
use super::effects::{fade_duration, Bus, BusId, GainGraph, Ramp};
use super::scheduler::{DeferredTask, TaskQueue, VoiceId};

/// Default fade-in when starting a track
pub const DEFAULT_FADE_IN_MS: u64 = 250;

/// Default fade-out when stopping
pub const DEFAULT_FADE_OUT_MS: u64 = 200;

/// Observable BGM state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BgmState {
    Idle,
    Playing { name: String },
    /// A new track is current while earlier voices are still fading out
    Transitioning { from: String, to: String },
}

impl BgmState {
    pub fn is_idle(&self) -> bool {
        matches!(self, BgmState::Idle)
    }

    /// Name of the current track, if any
    pub fn current(&self) -> Option<&str> {
        match self {
            BgmState::Idle => None,
            BgmState::Playing { name } => Some(name),
            BgmState::Transitioning { to, .. } => Some(to),
        }
    }

    pub fn description(&self) -> String {
        match self {
            BgmState::Idle => "idle".to_string(),
            BgmState::Playing { name } => format!("playing '{}'", name),
            BgmState::Transitioning { from, to } => format!("'{}' -> '{}'", from, to),
        }
    }
}

/// Options for starting a BGM track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BgmOptions {
    pub looping: bool,
    pub fade_ms: u64,
    /// Restart even when the same track is already current
    pub restart: bool,
}

impl Default for BgmOptions {
    fn default() -> Self {
        Self {
            looping: true,
            fade_ms: DEFAULT_FADE_IN_MS,
            restart: false,
        }
    }
}

impl BgmOptions {
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_fade_ms(mut self, ms: u64) -> Self {
        self.fade_ms = ms;
        self
    }

    pub fn with_restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }
}

/// Options for stopping BGM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOptions {
    pub fade_ms: u64,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            fade_ms: DEFAULT_FADE_OUT_MS,
        }
    }
}

impl StopOptions {
    pub fn with_fade_ms(mut self, ms: u64) -> Self {
        self.fade_ms = ms;
        self
    }
}

/// Public view of the current track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub name: String,
    pub looping: bool,
    pub voice: VoiceId,
}

struct CurrentTrack {
    id: VoiceId,
    name: String,
    looping: bool,
    voice: Box<dyn Voice>,
}

struct OutgoingVoice {
    id: VoiceId,
    name: String,
    /// BGM bus level captured when the voice was retired, or set since
    level: f32,
    fade: Ramp,
    voice: Box<dyn Voice>,
}

/// Single-slot BGM player with fading handover
pub struct BgmPlayer {
    current: Option<CurrentTrack>,
    outgoing: Vec<OutgoingVoice>,
    default_volume: f32,
    stop_grace: Duration,
}

impl BgmPlayer {
    /// `default_volume` is the fade-in target used while the BGM bus sits at
    /// zero; `stop_grace` is added after a fade before the voice is stopped.
    pub fn new(default_volume: f32, stop_grace: Duration) -> Self {
        Self {
            current: None,
            outgoing: Vec::new(),
            default_volume,
            stop_grace,
        }
    }

    pub fn state(&self) -> BgmState {
        match (&self.current, self.outgoing.last()) {
            (None, _) => BgmState::Idle,
            (Some(track), None) => BgmState::Playing {
                name: track.name.clone(),
            },
            (Some(track), Some(old)) => BgmState::Transitioning {
                from: old.name.clone(),
                to: track.name.clone(),
            },
        }
    }

    pub fn current(&self) -> Option<TrackInfo> {
        self.current.as_ref().map(|track| TrackInfo {
            name: track.name.clone(),
            looping: track.looping,
            voice: track.id,
        })
    }

    /// Check if `name` is the current track
    pub fn is_current(&self, name: &str) -> bool {
        self.current.as_ref().is_some_and(|track| track.name == name)
    }

    /// Number of voices still fading out
    pub fn outgoing_count(&self) -> usize {
        self.outgoing.len()
    }

    fn fade_in_target(&self, bus: &Bus) -> f32 {
        let target = bus.target();
        if target > 0.0 {
            target
        } else {
            self.default_volume
        }
    }

    /// Make `voice` the current track and fade it in on the BGM bus
    ///
    /// Any previous track is retired with a fade of the same length. Returns
    /// the replaced track's name.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        id: VoiceId,
        name: &str,
        looping: bool,
        voice: Box<dyn Voice>,
        fade_ms: u64,
        bus: &mut Bus,
        tasks: &mut TaskQueue,
        now: Duration,
    ) -> Option<String> {
        let fade = fade_duration(fade_ms);
        let target = self.fade_in_target(bus);

        let replaced = self.current.take().map(|old| {
            let level = bus.value_at(now);
            let name = old.name.clone();
            self.retire(old, level, fade, tasks, now);
            name
        });

        bus.set_immediate(0.0);
        bus.ramp_to(target, fade, now);

        tracing::debug!("BGM '{}' on {} fading in to {:.2} over {:?}", name, id, target, fade);
        self.current = Some(CurrentTrack {
            id,
            name: name.to_string(),
            looping,
            voice,
        });
        replaced
    }

    /// Fade out the current track and leave the player idle at once
    ///
    /// The BGM bus ramps to zero and stays there. Returns the stopped track's
    /// name, or `None` when nothing was playing.
    pub fn stop(
        &mut self,
        fade_ms: u64,
        bus: &mut Bus,
        tasks: &mut TaskQueue,
        now: Duration,
    ) -> Option<String> {
        let track = self.current.take()?;
        let fade = fade_duration(fade_ms);
        let level = bus.value_at(now);
        let name = track.name.clone();

        self.retire(track, level, fade, tasks, now);
        bus.ramp_to(0.0, fade, now);
        Some(name)
    }

    fn retire(
        &mut self,
        track: CurrentTrack,
        level: f32,
        fade: Duration,
        tasks: &mut TaskQueue,
        now: Duration,
    ) {
        tasks.schedule(
            now + fade + self.stop_grace,
            DeferredTask::StopBgmVoice(track.id),
        );
        tracing::debug!("Retiring BGM '{}' on {} from {:.2}", track.name, track.id, level);
        self.outgoing.push(OutgoingVoice {
            id: track.id,
            name: track.name,
            level,
            fade: Ramp::new(1.0, 0.0, now, fade),
            voice: track.voice,
        });
    }

    /// Apply a user-set BGM level to every voice still fading out
    pub fn set_outgoing_level(&mut self, level: f32) {
        for outgoing in &mut self.outgoing {
            outgoing.level = level;
        }
    }

    /// Hard-stop and disconnect the retired voice `id`
    ///
    /// Only ever touches that exact voice; a deferred stop that arrives after
    /// a newer track started cannot reach the newer one. Returns its name.
    pub fn dispose(&mut self, id: VoiceId) -> Option<String> {
        if self.current.as_ref().is_some_and(|track| track.id == id) {
            tracing::warn!("Ignoring stop for {}: it is the current BGM voice", id);
            return None;
        }

        let index = self.outgoing.iter().position(|v| v.id == id)?;
        let outgoing = self.outgoing.remove(index);
        outgoing.voice.stop();
        tracing::debug!("Stopped BGM '{}' on {}", outgoing.name, id);
        Some(outgoing.name)
    }

    /// Drop retired voices that already ended, and clear the current track
    /// if its voice finished on its own
    ///
    /// Returns the name of a current track that ended.
    pub fn poll_finished(&mut self) -> Option<String> {
        self.outgoing.retain(|v| !v.voice.is_finished());

        let finished = self
            .current
            .as_ref()
            .filter(|track| track.voice.is_finished())
            .map(|track| track.id)?;
        self.finish(finished)
    }

    /// Clear the current track only if it is still voice `id`
    fn finish(&mut self, id: VoiceId) -> Option<String> {
        if self.current.as_ref().map(|track| track.id) != Some(id) {
            return None;
        }

        let track = self.current.take()?;
        tracing::info!("BGM '{}' ended", track.name);
        Some(track.name)
    }

    /// Push effective gains to every BGM voice
    pub fn apply_gains(&self, graph: &GainGraph, now: Duration) {
        if let Some(track) = &self.current {
            track.voice.set_volume(graph.output_gain(BusId::Bgm, now));
        }

        let master = graph.bus(BusId::Master).value_at(now);
        for outgoing in &self.outgoing {
            outgoing
                .voice
                .set_volume(outgoing.level * outgoing.fade.value_at(now) * master);
        }
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

    #[derive(Default)]
    struct StubState {
        volume: f32,
        stopped: bool,
        ended: bool,
    }

    struct StubVoice(Arc<Mutex<StubState>>);

    impl Voice for StubVoice {
        fn set_volume(&self, volume: f32) {
            self.0.lock().volume = volume;
        }

        fn stop(&self) {
            self.0.lock().stopped = true;
        }

        fn is_finished(&self) -> bool {
            let stub = self.0.lock();
            stub.stopped || stub.ended
        }
    }

    fn stub_voice() -> (Box<dyn Voice>, Arc<Mutex<StubState>>) {
        let shared = Arc::new(Mutex::new(StubState::default()));
        (Box::new(StubVoice(Arc::clone(&shared))), shared)
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    struct Rig {
        player: BgmPlayer,
        graph: GainGraph,
        tasks: TaskQueue,
        ids: VoiceIds,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                player: BgmPlayer::new(0.35, ms(30)),
                graph: GainGraph::new(&EngineConfig::default()),
                tasks: TaskQueue::new(),
                ids: VoiceIds::default(),
            }
        }

        fn start(&mut self, name: &str, fade_ms: u64, now: Duration) -> (VoiceId, Arc<Mutex<StubState>>) {
            let (voice, stub) = stub_voice();
            let id = self.ids.next_id();
            self.player.start(
                id,
                name,
                true,
                voice,
                fade_ms,
                self.graph.bus_mut(BusId::Bgm),
                &mut self.tasks,
                now,
            );
            (id, stub)
        }

        fn stop(&mut self, fade_ms: u64, now: Duration) -> Option<String> {
            self.player
                .stop(fade_ms, self.graph.bus_mut(BusId::Bgm), &mut self.tasks, now)
        }

        fn run_tasks(&mut self, now: Duration) {
            for task in self.tasks.drain_due(now) {
                let DeferredTask::StopBgmVoice(id) = task;
                self.player.dispose(id);
            }
        }
    }

    #[test]
    fn test_start_fades_in_from_zero() {
        let mut rig = Rig::new();
        let (_, stub) = rig.start("title", 250, ms(0));

        rig.player.apply_gains(&rig.graph, ms(0));
        assert_eq!(stub.lock().volume, 0.0);

        rig.player.apply_gains(&rig.graph, ms(125));
        assert_relative_eq!(stub.lock().volume, 0.175, epsilon = 1e-6);

        rig.player.apply_gains(&rig.graph, ms(250));
        assert_relative_eq!(stub.lock().volume, 0.35, epsilon = 1e-6);
        assert_eq!(
            rig.player.state(),
            BgmState::Playing {
                name: "title".to_string()
            }
        );
    }

    #[test]
    fn test_replace_crossfades() {
        let mut rig = Rig::new();
        let (_, old) = rig.start("title", 0, ms(0));
        let (_, new) = rig.start("stage1", 200, ms(1_000));

        assert_eq!(
            rig.player.state(),
            BgmState::Transitioning {
                from: "title".to_string(),
                to: "stage1".to_string()
            }
        );

        rig.player.apply_gains(&rig.graph, ms(1_100));
        assert_relative_eq!(old.lock().volume, 0.175, epsilon = 1e-6);
        assert_relative_eq!(new.lock().volume, 0.175, epsilon = 1e-6);

        rig.run_tasks(ms(1_229));
        assert!(!old.lock().stopped);
        rig.run_tasks(ms(1_230));
        assert!(old.lock().stopped);
        assert_eq!(rig.player.outgoing_count(), 0);
        assert!(rig.player.is_current("stage1"));
    }

    #[test]
    fn test_stop_is_idle_immediately() {
        let mut rig = Rig::new();
        let (_, stub) = rig.start("title", 0, ms(0));

        assert_eq!(rig.stop(200, ms(500)).as_deref(), Some("title"));
        assert!(rig.player.state().is_idle());
        assert!(rig.player.current().is_none());

        rig.player.apply_gains(&rig.graph, ms(600));
        assert_relative_eq!(stub.lock().volume, 0.175, epsilon = 1e-6);

        rig.run_tasks(ms(730));
        assert!(stub.lock().stopped);
        assert_eq!(rig.graph.bus(BusId::Bgm).target(), 0.0);
    }

    #[test]
    fn test_stop_when_idle() {
        let mut rig = Rig::new();
        assert!(rig.stop(200, ms(0)).is_none());
        assert!(rig.tasks.is_empty());
    }

    #[test]
    fn test_restart_after_stop_uses_default_volume() {
        let mut rig = Rig::new();
        rig.start("title", 0, ms(0));
        rig.stop(200, ms(0));
        rig.graph.settle(ms(200));

        let (_, stub) = rig.start("title", 250, ms(300));
        rig.player.apply_gains(&rig.graph, ms(550));
        assert_relative_eq!(stub.lock().volume, 0.35, epsilon = 1e-6);
    }

    #[test]
    fn test_fade_in_honours_bus_target() {
        let mut rig = Rig::new();
        rig.graph.bus_mut(BusId::Bgm).set_immediate(0.6);
        let (_, stub) = rig.start("title", 100, ms(0));

        rig.player.apply_gains(&rig.graph, ms(100));
        assert_relative_eq!(stub.lock().volume, 0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_stale_stop_cannot_touch_new_track() {
        let mut rig = Rig::new();
        rig.start("title", 0, ms(0));
        rig.stop(200, ms(0));

        // New track before the deferred stop fires
        let (_, stub) = rig.start("title", 250, ms(100));
        rig.run_tasks(ms(1_000));

        assert!(!stub.lock().stopped);
        assert!(rig.player.is_current("title"));
    }

    #[test]
    fn test_dispose_ignores_current_voice() {
        let mut rig = Rig::new();
        let (id, stub) = rig.start("title", 0, ms(0));
        assert!(rig.player.dispose(id).is_none());
        assert!(!stub.lock().stopped);
    }

    #[test]
    fn test_natural_end_clears_current() {
        let mut rig = Rig::new();
        let (_, stub) = rig.start("jingle", 0, ms(0));
        assert!(rig.player.poll_finished().is_none());

        stub.lock().ended = true;
        assert_eq!(rig.player.poll_finished().as_deref(), Some("jingle"));
        assert!(rig.player.state().is_idle());
    }

    #[test]
    fn test_master_scales_outgoing() {
        let mut rig = Rig::new();
        let (_, old) = rig.start("title", 0, ms(0));
        rig.graph.bus_mut(BusId::Master).set_immediate(0.5);
        rig.stop(100, ms(0));

        rig.player.apply_gains(&rig.graph, ms(50));
        assert_relative_eq!(old.lock().volume, 0.35 * 0.5 * 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_outgoing_follows_user_level() {
        let mut rig = Rig::new();
        let (_, old) = rig.start("title", 0, ms(0));
        let (_, new) = rig.start("stage1", 1_000, ms(100));

        rig.player.apply_gains(&rig.graph, ms(600));
        assert_relative_eq!(old.lock().volume, 0.175, epsilon = 1e-6);

        rig.graph.bus_mut(BusId::Bgm).set_immediate(0.0);
        rig.player.set_outgoing_level(0.0);
        rig.player.apply_gains(&rig.graph, ms(600));
        assert_eq!(old.lock().volume, 0.0);
        assert_eq!(new.lock().volume, 0.0);

        rig.player.set_outgoing_level(0.8);
        rig.player.apply_gains(&rig.graph, ms(850));
        assert_relative_eq!(old.lock().volume, 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_options_builders() {
        let options = BgmOptions::default()
            .with_looping(false)
            .with_fade_ms(0)
            .with_restart(true);
        assert!(!options.looping);
        assert_eq!(options.fade_ms, 0);
        assert!(options.restart);
        assert_eq!(StopOptions::default().fade_ms, 200);
        assert_eq!(StopOptions::default().with_fade_ms(50).fade_ms, 50);
    }
}
