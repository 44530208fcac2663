//! Client error types.

use echoprobe_core::{DriverError, EngineError};
use echoprobe_proto::TokenError;
use thiserror::Error;

/// Process exit code for usage, token and setup failures.
pub const EXIT_FAILURE: u8 = 1;

/// Process exit code for a broken echo invariant.
pub const EXIT_INVARIANT: u8 = 101;

/// Errors that end a client run.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connect token could not be loaded.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Engine or session setup failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The session loop hit a broken invariant.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl ClientError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Token(_) | Self::Engine(_) => EXIT_FAILURE,
            Self::Driver(_) => EXIT_INVARIANT,
        }
    }

    /// Whether this error means the peer misbehaved rather than the run
    /// being misconfigured.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Driver(e) if e.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use echoprobe_core::ValidationError;

    use super::*;

    #[test]
    fn token_errors_exit_with_failure() {
        let err = ClientError::from(TokenError::InvalidTokenLength { expected: 2048, actual: 2047 });
        assert_eq!(err.exit_code(), EXIT_FAILURE);
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("2047"));
    }

    #[test]
    fn engine_errors_exit_with_failure() {
        let err = ClientError::from(EngineError::Init { reason: "no sockets".to_string() });
        assert_eq!(err.exit_code(), EXIT_FAILURE);
        assert!(!err.is_fatal());
    }

    #[test]
    fn invariant_violation_is_fatal() {
        let err = ClientError::from(DriverError::Invariant {
            tick: 12,
            source: ValidationError::WrongLength { sequence: 3, expected: 1200, actual: 1199 },
        });
        assert_eq!(err.exit_code(), EXIT_INVARIANT);
        assert!(err.is_fatal());
    }
}
