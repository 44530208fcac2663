//! Client session driver.
//!
//! Runs the fixed-step loop that services one client session:
//!
//! ```text
//! loop {
//!     stop requested?            -> Interrupted
//!     tick limit reached?        -> TickLimit
//!     service(session, now)
//!     connected?                 -> send one echo packet
//!     drain + validate receives  -> fatal on mismatch
//!     state <= Disconnected?     -> Terminated(state)
//!     stop requested?            -> Interrupted
//!     sleep to next tick boundary, now += dt
//! }
//! ```
//!
//! The driver never interprets connection failures. A timeout, a denial and a
//! clean disconnect all look the same: a terminal state, and the loop ends.
//! The only error it returns is a broken echo invariant.

use std::time::Duration;

use echoprobe_proto::ClientState;

use crate::{
    clock::{DELTA_TIME, SimClock},
    engine::{ClientSession, EngineSession},
    env::Environment,
    error::DriverError,
    shutdown::ShutdownSignal,
    validator::Validator,
};

/// Loop configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverConfig {
    /// Tick length in simulated seconds.
    pub delta_time: f64,
    /// Stop cleanly after this many ticks.
    pub max_ticks: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { delta_time: DELTA_TIME, max_ticks: None }
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The session reached a terminal state.
    Terminated(ClientState),
    /// A stop was requested.
    Interrupted,
    /// The configured tick limit was reached.
    TickLimit,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// Why the loop ended.
    pub outcome: SessionOutcome,
    /// Ticks serviced.
    pub ticks: u64,
    /// Simulated clock at exit.
    pub final_time: f64,
    /// Session state at exit.
    pub final_state: ClientState,
    /// Tick on which the session first reported `Connected`.
    pub connected_at_tick: Option<u64>,
    /// Echo packets sent.
    pub packets_sent: u64,
    /// Echo packets received and validated.
    pub packets_validated: u64,
}

/// Drives one client session to completion.
pub struct SessionDriver<E: Environment, S: EngineSession> {
    env: E,
    session: ClientSession<S>,
    shutdown: ShutdownSignal,
    config: DriverConfig,
    clock: SimClock,
    validator: Validator,
    ticks: u64,
    connected_at_tick: Option<u64>,
}

impl<E: Environment, S: EngineSession> SessionDriver<E, S> {
    /// Take ownership of a connecting session.
    pub fn new(
        env: E,
        session: ClientSession<S>,
        shutdown: ShutdownSignal,
        config: DriverConfig,
    ) -> Self {
        Self {
            env,
            session,
            shutdown,
            clock: SimClock::new(config.delta_time),
            config,
            validator: Validator::new(),
            ticks: 0,
            connected_at_tick: None,
        }
    }

    /// Run until the session ends, a stop is requested or the tick limit is
    /// hit.
    ///
    /// The session is destroyed when this returns, on every path.
    pub async fn run(mut self) -> Result<SessionReport, DriverError> {
        let tick_duration = Duration::from_secs_f64(self.config.delta_time);
        let start = self.env.now();
        let mut previous_state = self.session.state();

        tracing::info!(
            bind_address = self.session.bind_address(),
            state = %previous_state,
            "session loop starting"
        );

        let outcome = loop {
            if self.shutdown.is_requested() {
                break SessionOutcome::Interrupted;
            }
            if self.config.max_ticks.is_some_and(|max| self.ticks >= max) {
                break SessionOutcome::TickLimit;
            }

            let state = self.tick(previous_state)?;
            previous_state = state;

            if state.is_terminal() {
                break SessionOutcome::Terminated(state);
            }
            if self.shutdown.is_requested() {
                break SessionOutcome::Interrupted;
            }

            let boundary = tick_duration.saturating_mul(saturating_u32(self.ticks));
            self.env.sleep_until(start + boundary).await;
            self.clock.advance();
        };

        let report = self.report(outcome);
        match outcome {
            SessionOutcome::Interrupted => tracing::info!("shutting down"),
            SessionOutcome::Terminated(state) if state.is_failure() => {
                tracing::info!(%state, "session ended");
            },
            SessionOutcome::Terminated(_) => tracing::info!("session disconnected"),
            SessionOutcome::TickLimit => tracing::info!(ticks = report.ticks, "tick limit reached"),
        }
        Ok(report)
    }

    fn tick(&mut self, previous_state: ClientState) -> Result<ClientState, DriverError> {
        let tick = self.ticks;
        self.session.service(self.clock.now());
        self.ticks += 1;

        let state = self.session.state();
        if state != previous_state {
            tracing::info!(tick, from = %previous_state, to = %state, "client state changed");
        }

        if state == ClientState::Connected {
            self.connected_at_tick.get_or_insert(tick);
            self.validator.send(&mut self.session);
        }

        let received = self
            .validator
            .drain(&mut self.session)
            .map_err(|source| DriverError::Invariant { tick, source })?;
        if received > 0 {
            tracing::debug!(tick, received, "echo packets validated");
        }

        Ok(self.session.state())
    }

    fn report(&self, outcome: SessionOutcome) -> SessionReport {
        SessionReport {
            outcome,
            ticks: self.ticks,
            final_time: self.clock.now(),
            final_state: self.session.state(),
            connected_at_tick: self.connected_at_tick,
            packets_sent: self.validator.sent(),
            packets_validated: self.validator.validated(),
        }
    }
}

fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
