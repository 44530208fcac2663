//! Echoprobe core.
//!
//! The client session loop and everything it coordinates, independent of
//! any particular transport:
//!
//! - [`SessionDriver`]: fixed-step loop servicing one session
//! - [`Validator`]: sends the echo payload and checks every packet received
//! - [`ShutdownSignal`]: cooperative stop flag fed by the interrupt handler
//! - [`ConnectionEngine`] / [`EngineSession`]: the engine surface the loop
//!   consumes, with [`EngineHandle`] and [`ClientSession`] guaranteeing
//!   teardown on every exit path
//! - [`Environment`]: time and sleeping, swappable for simulation
//! - [`Transport`] / [`DatagramSocket`]: the socket seam under UDP sessions
//!
//! ## Architecture
//!
//! ```text
//! ConnectToken ─▶ EngineHandle ─▶ ClientSession ─▶ SessionDriver
//!                                                    ├─ Validator
//!                                                    └─ ShutdownSignal
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod clock;
pub mod driver;
pub mod engine;
pub mod env;
mod error;
pub mod shutdown;
pub mod transport;
pub mod validator;

pub use clock::{DELTA_TIME, SimClock};
pub use driver::{DriverConfig, SessionDriver, SessionOutcome, SessionReport};
pub use engine::{
    ClientSession, ConnectionEngine, EngineError, EngineHandle, EngineSession, ReceivedPacket,
};
pub use env::Environment;
pub use error::DriverError;
pub use shutdown::ShutdownSignal;
pub use transport::{DatagramSocket, Transport};
pub use validator::{ValidationError, Validator};
