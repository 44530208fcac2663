//! Fixed-step simulated clock.

/// Default tick length: 60 ticks per simulated second.
pub const DELTA_TIME: f64 = 1.0 / 60.0;

/// Simulated clock advancing in whole ticks.
///
/// Time is `ticks * delta` computed fresh on every read, so it never picks up
/// rounding drift from repeated addition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimClock {
    ticks: u64,
    delta: f64,
}

impl SimClock {
    /// Clock at zero with the given tick length in seconds.
    pub const fn new(delta: f64) -> Self {
        Self { ticks: 0, delta }
    }

    /// Ticks elapsed.
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Tick length in seconds.
    pub const fn delta(&self) -> f64 {
        self.delta
    }

    /// Current simulated time in seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn now(&self) -> f64 {
        self.ticks as f64 * self.delta
    }

    /// Advance by exactly one tick.
    pub const fn advance(&mut self) {
        self.ticks += 1;
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(DELTA_TIME)
    }
}
