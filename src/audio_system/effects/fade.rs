/// Linear fades
///
/// A [`Ramp`] is a scheduled straight-line change between two gain values.
use std::time::Duration;

/// Linear transition of a gain value over a time window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ramp {
    /// Value at `start`
    pub from: f32,

    /// Value at and after `end`
    pub to: f32,

    pub start: Duration,
    pub end: Duration,
}

impl Ramp {
    /// Create a ramp starting at `start` and lasting `duration`
    pub fn new(from: f32, to: f32, start: Duration, duration: Duration) -> Self {
        Self {
            from,
            to,
            start,
            end: start + duration,
        }
    }

    /// Interpolated value at `now`
    pub fn value_at(&self, now: Duration) -> f32 {
        if now >= self.end {
            return self.to;
        }
        if now <= self.start {
            return self.from;
        }

        let span = (self.end - self.start).as_secs_f64();
        let progress = (now - self.start).as_secs_f64() / span;
        self.from + (self.to - self.from) * progress as f32
    }

    /// Check if the ramp has reached its target
    pub fn is_complete(&self, now: Duration) -> bool {
        now >= self.end
    }

    /// Ramp length
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Convert a millisecond fade length into a `Duration`
pub fn fade_duration(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
