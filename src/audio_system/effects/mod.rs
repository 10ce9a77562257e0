/// Gain graph
///
/// Three buses wired `bgm -> master -> output` and `sfx -> master -> output`.
/// A voice's audible gain is its own gain times its bus times master.
pub mod fade;
pub mod volume;

use std::time::Duration;

pub use fade::{fade_duration, Ramp};
pub use volume::{clamp01, clamp_rate, Bus, BusId};

use crate::config::EngineConfig;

/// The three chained volume buses
#[derive(Debug, Clone)]
pub struct GainGraph {
    master: Bus,
    bgm: Bus,
    sfx: Bus,
}

impl GainGraph {
    /// Build the graph at the configured default gains
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            master: Bus::new(BusId::Master, config.master_volume),
            bgm: Bus::new(BusId::Bgm, config.bgm_volume),
            sfx: Bus::new(BusId::Sfx, config.sfx_volume),
        }
    }

    pub fn bus(&self, id: BusId) -> &Bus {
        match id {
            BusId::Master => &self.master,
            BusId::Bgm => &self.bgm,
            BusId::Sfx => &self.sfx,
        }
    }

    pub fn bus_mut(&mut self, id: BusId) -> &mut Bus {
        match id {
            BusId::Master => &mut self.master,
            BusId::Bgm => &mut self.bgm,
            BusId::Sfx => &mut self.sfx,
        }
    }

    /// Gain a source connected to `id` reaches the output with
    pub fn output_gain(&self, id: BusId, now: Duration) -> f32 {
        let master = self.master.value_at(now);
        match id {
            BusId::Master => master,
            BusId::Bgm => self.bgm.value_at(now) * master,
            BusId::Sfx => self.sfx.value_at(now) * master,
        }
    }

    /// Collapse finished ramps on every bus
    pub fn settle(&mut self, now: Duration) {
        self.master.settle(now);
        self.bgm.settle(now);
        self.sfx.settle(now);
    }
}
