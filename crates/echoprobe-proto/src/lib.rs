//! Echoprobe wire types.
//!
//! Everything the client needs to know about bytes on the wire lives here:
//! protocol constants, the observable client lifecycle states, the opaque
//! connect token and its public section, the canonical echo payload, and the
//! plaintext packet codec used by the development transport.
//!
//! This crate has no I/O and no notion of time. Engines and drivers build on
//! top of it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod constants;
pub mod echo;
pub mod packet;
pub mod state;
pub mod token;
pub mod token_info;

pub use constants::{
    CONNECT_TOKEN_BYTES, CONNECT_TOKEN_NONCE_BYTES, CONNECT_TOKEN_PRIVATE_BYTES, MAX_PACKET_SIZE,
    VERSION_INFO, VERSION_INFO_BYTES,
};
pub use echo::{ECHO_PACKET, EchoMismatch, EchoPacket};
pub use packet::{Packet, PacketError, PacketKind, SequencedPacket};
pub use state::ClientState;
pub use token::{ConnectToken, TokenError};
pub use token_info::{ConnectTokenInfo, TokenInfoError};
