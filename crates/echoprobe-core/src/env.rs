//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples the session loop from wall-clock time.
//! The production client paces ticks with real sleeps; the simulation
//! harness substitutes a virtual clock that advances instantly, so a
//! five-second scenario finishes in microseconds and always produces the
//! same tick sequence.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Sleep accounting: after `sleep(d)` completes, `now()` has advanced by at
//!   least `d`
//! - Isolation: implementations must not share global state

use std::{
    future::Future,
    time::{Duration, Instant},
};

/// Abstract environment providing time and async sleeping.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: subsequent calls return times >= previous calls.
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration.
    ///
    /// The only suspension point of the session loop.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Sleeps until `deadline`, returning at once if it already passed.
    fn sleep_until(&self, deadline: Instant) -> impl Future<Output = ()> + Send {
        self.sleep(deadline.saturating_duration_since(self.now()))
    }
}
