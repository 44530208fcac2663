//! Echo round-trip validation.
//!
//! The server echoes every payload back unchanged, and the transport promises
//! lossless, unmodified delivery of whatever does arrive. So every received
//! packet must be byte-identical to the canonical echo payload. Anything else
//! means the transport or its encryption is broken, and the run stops.

use echoprobe_proto::{ECHO_PACKET, EchoMismatch, EchoPacket, MAX_PACKET_SIZE};
use thiserror::Error;

use crate::engine::{ClientSession, EngineSession, ReceivedPacket};

/// A received packet broke the echo invariant.
///
/// Never recoverable: it signals corrupted delivery, not an I/O hiccup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Packet has the wrong size.
    #[error("packet {sequence}: expected {expected} bytes, received {actual}")]
    WrongLength {
        /// Packet sequence.
        sequence: u64,
        /// Required size.
        expected: usize,
        /// Received size.
        actual: usize,
    },

    /// Packet content differs from the echo payload.
    #[error(
        "packet {sequence}: byte {offset} is {actual:#04x}, expected {expected:#04x}"
    )]
    ContentMismatch {
        /// Packet sequence.
        sequence: u64,
        /// Offset of the first differing byte.
        offset: usize,
        /// Expected byte.
        expected: u8,
        /// Received byte.
        actual: u8,
    },
}

/// Sends the echo payload and checks everything that comes back.
#[derive(Debug)]
pub struct Validator {
    payload: &'static EchoPacket,
    sent: u64,
    validated: u64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// Validator for the canonical echo payload.
    pub fn new() -> Self {
        Self { payload: &ECHO_PACKET, sent: 0, validated: 0 }
    }

    /// Packets sent so far.
    pub const fn sent(&self) -> u64 {
        self.sent
    }

    /// Packets received and validated so far.
    pub const fn validated(&self) -> u64 {
        self.validated
    }

    /// Send one echo payload.
    pub fn send<S: EngineSession>(&mut self, session: &mut ClientSession<S>) {
        session.send_packet(self.payload.as_bytes());
        self.sent += 1;
    }

    /// Check one packet against the echo payload.
    pub fn inspect(&self, packet: &ReceivedPacket) -> Result<(), ValidationError> {
        self.payload.check(&packet.payload).map_err(|mismatch| match mismatch {
            EchoMismatch::Length { actual } => ValidationError::WrongLength {
                sequence: packet.sequence,
                expected: MAX_PACKET_SIZE,
                actual,
            },
            EchoMismatch::Content { offset, expected, actual } => {
                ValidationError::ContentMismatch {
                    sequence: packet.sequence,
                    offset,
                    expected,
                    actual,
                }
            },
        })
    }

    /// Receive and check every queued packet, in delivery order.
    ///
    /// Each packet goes back to the engine before its verdict is acted on, so
    /// the failing packet is released too. Stops at the first failure.
    pub fn drain<S: EngineSession>(
        &mut self,
        session: &mut ClientSession<S>,
    ) -> Result<usize, ValidationError> {
        let mut received = 0;
        while let Some(packet) = session.try_receive() {
            let verdict = self.inspect(&packet);
            let sequence = packet.sequence;
            session.release_packet(packet);
            verdict?;

            tracing::trace!(sequence, "echo packet validated");
            self.validated += 1;
            received += 1;
        }
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::Bytes;
    use echoprobe_proto::{ClientState, ConnectToken};

    use super::*;

    #[derive(Default)]
    struct QueueSession {
        inbox: VecDeque<ReceivedPacket>,
        outbox: Vec<Vec<u8>>,
        released: Vec<u64>,
    }

    impl EngineSession for QueueSession {
        fn connect(&mut self, _token: ConnectToken) {}
        fn service(&mut self, _time: f64) {}
        fn state(&self) -> ClientState {
            ClientState::Connected
        }
        fn send_packet(&mut self, payload: &[u8]) {
            self.outbox.push(payload.to_vec());
        }
        fn try_receive(&mut self) -> Option<ReceivedPacket> {
            self.inbox.pop_front()
        }
        fn release_packet(&mut self, packet: ReceivedPacket) {
            self.released.push(packet.sequence);
        }
        fn destroy(&mut self) {}
    }

    fn echo(sequence: u64) -> ReceivedPacket {
        ReceivedPacket::new(sequence, Bytes::from_static(ECHO_PACKET.as_bytes()))
    }

    fn session_with(packets: Vec<ReceivedPacket>) -> ClientSession<QueueSession> {
        ClientSession::new(QueueSession { inbox: packets.into(), ..Default::default() }, "test")
    }

    #[test]
    fn send_uses_canonical_payload() {
        let mut session = session_with(vec![]);
        let mut validator = Validator::new();
        validator.send(&mut session);
        validator.send(&mut session);
        assert_eq!(validator.sent(), 2);
        assert_eq!(session.get_ref().outbox.len(), 2);
        assert!(session.get_ref().outbox.iter().all(|p| p.as_slice() == ECHO_PACKET.as_bytes()));
    }

    #[test]
    fn drain_validates_and_releases_everything() {
        let mut session = session_with(vec![echo(1), echo(2), echo(3)]);
        let mut validator = Validator::new();

        assert_eq!(validator.drain(&mut session), Ok(3));
        assert_eq!(validator.validated(), 3);
        assert_eq!(session.get_ref().released, vec![1, 2, 3]);
        assert_eq!(validator.drain(&mut session), Ok(0));
    }

    #[test]
    fn wrong_length_is_fatal_and_still_released() {
        let short = ReceivedPacket::new(7, Bytes::from_static(&ECHO_PACKET.as_bytes()[..100]));
        let mut session = session_with(vec![echo(6), short, echo(8)]);
        let mut validator = Validator::new();

        let err = validator.drain(&mut session).unwrap_err();
        assert_eq!(
            err,
            ValidationError::WrongLength { sequence: 7, expected: MAX_PACKET_SIZE, actual: 100 }
        );
        assert_eq!(validator.validated(), 1);
        assert_eq!(session.get_ref().released, vec![6, 7]);
        assert_eq!(session.try_receive().map(|p| p.sequence), Some(8));
    }

    #[test]
    fn altered_byte_is_fatal() {
        let mut corrupted = ECHO_PACKET.as_bytes().to_vec();
        corrupted[10] = 0xff;
        let mut session = session_with(vec![ReceivedPacket::new(4, Bytes::from(corrupted))]);
        let mut validator = Validator::new();

        let err = validator.drain(&mut session).unwrap_err();
        assert_eq!(
            err,
            ValidationError::ContentMismatch { sequence: 4, offset: 10, expected: 10, actual: 0xff }
        );
        assert_eq!(validator.validated(), 0);
        assert_eq!(session.get_ref().released, vec![4]);
    }

    #[test]
    fn error_display() {
        let err = ValidationError::ContentMismatch { sequence: 3, offset: 5, expected: 5, actual: 6 };
        assert_eq!(err.to_string(), "packet 3: byte 5 is 0x06, expected 0x05");
    }
}
