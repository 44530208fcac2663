//! Echoprobe client runtime.
//!
//! Connects to a server with a connect token and keeps a steady stream of
//! echo packets flowing, checking that every packet that comes back is
//! byte-identical to what was sent.
//!
//! ## Architecture
//!
//! ```text
//! echoprobe-client
//!   ├─ SystemEnv        (production Environment impl)
//!   ├─ UdpEngine        (plaintext UDP session state machine)
//!   ├─ TokioTransport   (production sockets; PlainUdpEngine = UdpEngine<TokioTransport>)
//!   └─ Client           (token -> engine -> session -> SessionDriver)
//! ```
//!
//! `Client` is generic over environment and engine, and `UdpEngine` over its
//! socket source, so the same run path drives simulated sockets in tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod system_env;
mod transport;
mod udp;

pub use echoprobe_core::{DriverConfig, SessionOutcome, SessionReport, ShutdownSignal};
use echoprobe_core::{ConnectionEngine, EngineHandle, Environment, SessionDriver};
use echoprobe_proto::ConnectToken;
pub use error::{ClientError, EXIT_FAILURE, EXIT_INVARIANT};
pub use system_env::SystemEnv;
pub use transport::{PlainUdpEngine, TokioSocket, TokioTransport};
pub use udp::{UdpEngine, UdpSession};

/// Client configuration for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Local address for the client socket (e.g., "0.0.0.0")
    pub bind_address: String,
    /// Loop configuration (tick length, tick limit)
    pub driver: DriverConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0".to_string(), driver: DriverConfig::default() }
    }
}

/// Echo probe client.
///
/// Owns the engine for its whole life; the engine is terminated when the
/// client is consumed by [`Client::run`], after the session is destroyed.
pub struct Client<E: Environment, C: ConnectionEngine> {
    env: E,
    engine: EngineHandle<C>,
    config: ClientConfig,
    shutdown: ShutdownSignal,
}

impl<E: Environment, C: ConnectionEngine> Client<E, C> {
    /// Take ownership of an initialized engine.
    pub fn new(env: E, engine: C, config: ClientConfig) -> Self {
        Self { env, engine: EngineHandle::new(engine), config, shutdown: ShutdownSignal::new() }
    }

    /// Stop the run through `shutdown` instead of a signal of its own.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Signal that stops the run at the next tick boundary.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Connect with a base64 token and run the echo loop to completion.
    ///
    /// Connection failures are not errors: the report carries the terminal
    /// state. Errors are a bad token, a failed session setup, or a broken
    /// echo invariant.
    pub async fn run(mut self, token: &str) -> Result<SessionReport, ClientError> {
        let token = ConnectToken::load(token)?;

        let mut session = self.engine.create_session(&self.config.bind_address, 0.0)?;
        session.connect(token);
        tracing::info!(state = %session.state(), "client connecting");

        let driver = SessionDriver::new(self.env, session, self.shutdown, self.config.driver);
        let report = driver.run().await?;

        tracing::info!(
            outcome = ?report.outcome,
            ticks = report.ticks,
            sent = report.packets_sent,
            validated = report.packets_validated,
            "client finished"
        );
        Ok(report)
    }
}
