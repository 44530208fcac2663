//! Driver error types.

use thiserror::Error;

use crate::validator::ValidationError;

/// Errors that end a session run abnormally.
///
/// Connection failures are not here: they surface as terminal states and end
/// the run cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// A received packet broke the echo invariant.
    #[error("echo invariant violated on tick {tick}: {source}")]
    Invariant {
        /// Tick on which the packet was received.
        tick: u64,
        /// What was wrong with it.
        source: ValidationError,
    },
}

impl DriverError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Every driver error is: each one means delivered data was corrupted.
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Invariant { .. } => true,
        }
    }
}
