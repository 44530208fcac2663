//! Connect token loading.
//!
//! A connect token is issued out of band by a web backend and handed to the
//! client as base64 text. The client never looks inside the encrypted part;
//! it only checks the decoded size and passes the bytes to the engine.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;

use crate::constants::CONNECT_TOKEN_BYTES;

/// Errors from turning text into a connect token.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Input is not valid base64.
    #[error("invalid base64 connect token: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    /// Decoded token has the wrong size.
    #[error("invalid connect token length: expected {expected} bytes, got {actual}")]
    InvalidTokenLength {
        /// Required size.
        expected: usize,
        /// Decoded size.
        actual: usize,
    },
}

/// Opaque, fixed-size connect token.
///
/// # Security
///
/// The `Debug` impl prints only the size. The private section is encrypted
/// but the trailing key material is not, so tokens never go to logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectToken(Box<[u8; CONNECT_TOKEN_BYTES]>);

impl ConnectToken {
    /// Decode a base64 (standard alphabet) token.
    ///
    /// Leading and trailing ASCII whitespace is ignored so tokens piped in
    /// from files with a trailing newline still load.
    pub fn load(encoded: &str) -> Result<Self, TokenError> {
        let decoded = STANDARD.decode(encoded.trim_ascii())?;
        Self::from_vec(decoded)
    }

    /// Wrap already decoded bytes.
    pub fn from_vec(bytes: Vec<u8>) -> Result<Self, TokenError> {
        let actual = bytes.len();
        bytes
            .into_boxed_slice()
            .try_into()
            .map(Self)
            .map_err(|_| TokenError::InvalidTokenLength { expected: CONNECT_TOKEN_BYTES, actual })
    }

    /// Raw token bytes.
    pub fn as_bytes(&self) -> &[u8; CONNECT_TOKEN_BYTES] {
        &self.0
    }

    /// Encode back to base64 text.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0.as_slice())
    }
}

impl From<[u8; CONNECT_TOKEN_BYTES]> for ConnectToken {
    fn from(bytes: [u8; CONNECT_TOKEN_BYTES]) -> Self {
        Self(Box::new(bytes))
    }
}

impl fmt::Debug for ConnectToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectToken(<redacted {} bytes>)", self.0.len())
    }
}
