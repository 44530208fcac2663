//! Canonical echo payload.
//!
//! Byte `i` of the payload is `i mod 256`, so any truncation, reordering or
//! bit flip shows up as a mismatch at a specific offset.

use crate::constants::MAX_PACKET_SIZE;

/// The payload every probe sends and expects back.
pub static ECHO_PACKET: EchoPacket = EchoPacket(build());

/// Fixed-size deterministic payload.
#[derive(Debug, PartialEq, Eq)]
pub struct EchoPacket([u8; MAX_PACKET_SIZE]);

/// First difference between a received buffer and the echo payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoMismatch {
    /// Received buffer has the wrong length.
    Length {
        /// Received length.
        actual: usize,
    },
    /// Received buffer differs at `offset`.
    Content {
        /// Offset of the first differing byte.
        offset: usize,
        /// Byte the payload has at `offset`.
        expected: u8,
        /// Byte received at `offset`.
        actual: u8,
    },
}

impl EchoPacket {
    /// Payload bytes.
    pub const fn as_bytes(&self) -> &[u8; MAX_PACKET_SIZE] {
        &self.0
    }

    /// Payload length, always `MAX_PACKET_SIZE`.
    pub const fn len(&self) -> usize {
        MAX_PACKET_SIZE
    }

    /// Never empty; present for API symmetry with `len`.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Compare a received buffer against the payload.
    pub fn check(&self, received: &[u8]) -> Result<(), EchoMismatch> {
        if received.len() != MAX_PACKET_SIZE {
            return Err(EchoMismatch::Length { actual: received.len() });
        }
        match self.0.iter().zip(received).position(|(a, b)| a != b) {
            None => Ok(()),
            Some(offset) => Err(EchoMismatch::Content {
                offset,
                expected: self.0[offset],
                actual: received[offset],
            }),
        }
    }
}

impl AsRef<[u8]> for EchoPacket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn build() -> [u8; MAX_PACKET_SIZE] {
    let mut bytes = [0u8; MAX_PACKET_SIZE];
    let mut i = 0;
    while i < MAX_PACKET_SIZE {
        bytes[i] = (i % 256) as u8;
        i += 1;
    }
    bytes
}
