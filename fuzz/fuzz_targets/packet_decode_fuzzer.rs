//! Fuzz target for the plaintext packet codec
//!
//! # Strategy
//!
//! - Arbitrary datagrams straight into `Packet::decode`
//! - Anything that decodes is re-encoded with its sequence
//!
//! # Invariants
//!
//! - NEVER panic on malformed datagrams
//! - Payloads that decode are `1..=MAX_PACKET_SIZE` bytes
//! - Decoded packets re-encode to the same datagram

#![no_main]

use echoprobe_proto::{Packet, MAX_PACKET_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|datagram: &[u8]| {
    let Ok(decoded) = Packet::decode(datagram) else { return };

    if let Packet::Payload(payload) = &decoded.packet {
        assert!(!payload.is_empty());
        assert!(payload.len() <= MAX_PACKET_SIZE);
    }

    let encoded = decoded.packet.to_bytes(decoded.sequence);
    assert_eq!(&encoded[..], datagram);
});
