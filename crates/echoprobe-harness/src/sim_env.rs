//! Environment on Turmoil's virtual clock.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use echoprobe_core::Environment;

/// Simulated environment.
///
/// Every Turmoil host runs on a paused Tokio clock that the simulation
/// advances step by step, so `now` and `sleep` here are virtual. Must be
/// created and used inside a simulated host.
#[derive(Debug, Clone, Copy)]
pub struct SimEnv {
    origin: tokio::time::Instant,
}

impl SimEnv {
    /// Environment whose elapsed time starts now.
    pub fn new() -> Self {
        Self { origin: tokio::time::Instant::now() }
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn sleep_advances_virtual_time() {
        let observed = Arc::new(Mutex::new(None));
        let mut sim = turmoil::Builder::new().build();

        let slot = Arc::clone(&observed);
        sim.client("client", async move {
            let env = SimEnv::new();
            let start = env.now();
            env.sleep(Duration::from_millis(250)).await;
            *slot.lock().expect("lock") = Some((env.now() - start, env.elapsed()));
            Ok(())
        });
        sim.run().expect("simulation");

        let (slept, elapsed) = observed.lock().expect("lock").expect("client ran");
        assert!(slept >= Duration::from_millis(250));
        assert!(slept < Duration::from_millis(252), "slept {slept:?}");
        assert_eq!(slept, elapsed);
    }

    #[test]
    fn sleep_until_past_deadline_returns_immediately() {
        let observed = Arc::new(Mutex::new(None));
        let mut sim = turmoil::Builder::new().build();

        let slot = Arc::clone(&observed);
        sim.client("client", async move {
            let env = SimEnv::new();
            let deadline = env.now();
            env.sleep(Duration::from_millis(10)).await;
            let before = env.elapsed();
            env.sleep_until(deadline).await;
            *slot.lock().expect("lock") = Some((before, env.elapsed()));
            Ok(())
        });
        sim.run().expect("simulation");

        let (before, after) = observed.lock().expect("lock").expect("client ran");
        assert_eq!(before, after);
    }
}
