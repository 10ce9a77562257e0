/// Volume buses
///
/// A [`Bus`] holds a gain in `[0, 1]` and at most one pending [`Ramp`].
/// Every write cancels the pending ramp first.
use std::time::Duration;

use super::fade::Ramp;

/// Lowest accepted playback rate
pub const MIN_RATE: f32 = 0.25;

/// Highest accepted playback rate
pub const MAX_RATE: f32 = 4.0;

/// Clamp a gain into `[0, 1]`, mapping NaN to silence
pub fn clamp01(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Clamp a playback rate into `[MIN_RATE, MAX_RATE]`
///
/// NaN and zero fall back to normal speed before clamping.
pub fn clamp_rate(rate: f32) -> f32 {
    let rate = if rate.is_nan() || rate == 0.0 { 1.0 } else { rate };
    rate.clamp(MIN_RATE, MAX_RATE)
}

/// Named volume channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusId {
    Master,
    Bgm,
    Sfx,
}

impl std::fmt::Display for BusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusId::Master => write!(f, "master"),
            BusId::Bgm => write!(f, "bgm"),
            BusId::Sfx => write!(f, "sfx"),
        }
    }
}

/// Volume bus with an optional scheduled ramp
#[derive(Debug, Clone)]
pub struct Bus {
    id: BusId,
    /// Value when no ramp is pending
    level: f32,
    ramp: Option<Ramp>,
}

impl Bus {
    /// Create a bus at a fixed level
    pub fn new(id: BusId, level: f32) -> Self {
        Self {
            id,
            level: clamp01(level),
            ramp: None,
        }
    }

    pub fn id(&self) -> BusId {
        self.id
    }

    /// Current value, following any ramp in progress
    pub fn value_at(&self, now: Duration) -> f32 {
        match &self.ramp {
            Some(ramp) => ramp.value_at(now),
            None => self.level,
        }
    }

    /// Value the bus is heading towards
    pub fn target(&self) -> f32 {
        match &self.ramp {
            Some(ramp) => ramp.to,
            None => self.level,
        }
    }

    /// Check if a ramp is still scheduled
    pub fn is_ramping(&self) -> bool {
        self.ramp.is_some()
    }

    /// Cancel any ramp and jump to `value`
    pub fn set_immediate(&mut self, value: f32) {
        self.ramp = None;
        self.level = clamp01(value);
    }

    /// Cancel any ramp and fade from the current value to `value`
    ///
    /// A zero duration behaves like [`Bus::set_immediate`].
    pub fn ramp_to(&mut self, value: f32, duration: Duration, now: Duration) {
        let from = self.value_at(now);
        let to = clamp01(value);
        self.ramp = None;

        if duration.is_zero() {
            self.level = to;
            return;
        }

        self.level = from;
        self.ramp = Some(Ramp::new(from, to, now, duration));
    }

    /// Collapse a finished ramp into the fixed level
    pub fn settle(&mut self, now: Duration) {
        if let Some(ramp) = self.ramp {
            if ramp.is_complete(now) {
                self.level = ramp.to;
                self.ramp = None;
            }
        }
    }
}
