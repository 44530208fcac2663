//! Protocol constants.
//!
//! Sizes are fixed by the protocol and shared with every server
//! implementation. Changing any of them breaks interoperability.

/// Size of a decoded connect token.
pub const CONNECT_TOKEN_BYTES: usize = 2048;

/// Size of the encrypted private section carried inside a connect token.
pub const CONNECT_TOKEN_PRIVATE_BYTES: usize = 1024;

/// Size of the nonce used to encrypt the private section.
pub const CONNECT_TOKEN_NONCE_BYTES: usize = 24;

/// Size of the NUL-terminated version string.
pub const VERSION_INFO_BYTES: usize = 13;

/// Version string at the start of every connect token and connection request.
pub const VERSION_INFO: &[u8; VERSION_INFO_BYTES] = b"NETCODE 1.02\0";

/// Size of each symmetric key carried in the token.
pub const KEY_BYTES: usize = 32;

/// Largest payload a single packet may carry.
pub const MAX_PACKET_SIZE: usize = 1200;

/// Upper bound on server addresses listed in a connect token.
pub const MAX_SERVERS_PER_CONNECT: usize = 32;

/// Size of the opaque challenge token echoed back during the handshake.
pub const CHALLENGE_TOKEN_BYTES: usize = 300;

/// Handshake and keep-alive packets per second.
pub const PACKET_SEND_RATE: f64 = 10.0;

/// Disconnect packets sent redundantly when a connected client leaves.
pub const NUM_DISCONNECT_PACKETS: usize = 10;
