//! Deterministic simulation harness for echoprobe testing.
//!
//! Turmoil-based implementations of the `Environment` and `Transport`
//! traits, so the real client, engine and session loop run inside a
//! simulated network with virtual time:
//!
//! - [`SimEnv`]: Turmoil's virtual clock
//! - [`SimTransport`]: simulated UDP sockets under the real UDP engine
//! - [`EchoServer`]: server host with scripted misbehavior
//! - [`RecordingEngine`]: records how the loop used the engine
//! - [`Scenario`]: one client run against one or more server hosts
//! - [`TestTokenBuilder`]: well-formed connect tokens for tests
//!
//! Given the same [`Network`] seed a scenario always replays the same way.
//!
//! # Example
//!
//! ```rust,ignore
//! use echoprobe_harness::{Scenario, ServerBehavior};
//!
//! let outcome = Scenario::with_behavior(ServerBehavior::Echo).max_ticks(120).run()?;
//! let report = outcome.result?;
//! assert!(report.packets_validated > 0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod recording;
pub mod scenario;
pub mod server;
mod sim_env;
mod sim_transport;
pub mod token;

pub use recording::{EngineStats, RecordingEngine, RecordingSession, StatsHandle};
pub use scenario::{Network, Scenario, ScenarioOutcome};
pub use server::{EchoServer, SERVER_PORT, ServerBehavior, ServerStats, ServerStatsHandle};
pub use sim_env::SimEnv;
pub use sim_transport::{SimSocket, SimTransport};
pub use token::{TEST_PROTOCOL_ID, TestTokenBuilder};
