//! Public section of a connect token.
//!
//! Layout (little-endian):
//!
//! ```text
//! version info        13 bytes, "NETCODE 1.02\0"
//! protocol id         u64
//! create timestamp    u64
//! expire timestamp    u64
//! nonce               24 bytes
//! private data        1024 bytes, encrypted, opaque to the client
//! timeout seconds     i32, negative disables the timeout
//! server count        u32, 1..=32
//! server addresses    type u8 (1 = IPv4, 2 = IPv6), address, port u16
//! client->server key  32 bytes
//! server->client key  32 bytes
//! zero padding up to 2048 bytes
//! ```
//!
//! Only engines read this. The session driver treats the token as opaque.

use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{I32, LittleEndian, U32, U64},
};

use crate::{
    constants::{
        CONNECT_TOKEN_BYTES, CONNECT_TOKEN_NONCE_BYTES, CONNECT_TOKEN_PRIVATE_BYTES, KEY_BYTES,
        MAX_SERVERS_PER_CONNECT, VERSION_INFO, VERSION_INFO_BYTES,
    },
    token::ConnectToken,
};

const ADDRESS_IPV4: u8 = 1;
const ADDRESS_IPV6: u8 = 2;

/// Errors from reading or writing the public section.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenInfoError {
    /// Version string does not match ours.
    #[error("connect token version mismatch")]
    VersionMismatch,

    /// Server count outside `1..=32`.
    #[error("invalid server address count: {0}")]
    InvalidServerCount(usize),

    /// Unknown address type tag.
    #[error("invalid server address type: {0}")]
    InvalidAddressType(u8),

    /// Token ended in the middle of a field.
    #[error("connect token truncated")]
    Truncated,

    /// Token claims to expire before it was created.
    #[error("connect token expires ({expire}) before it was created ({create})")]
    InvalidTimestamps {
        /// Creation timestamp.
        create: u64,
        /// Expiry timestamp.
        expire: u64,
    },
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawTokenHead {
    version_info: [u8; VERSION_INFO_BYTES],
    protocol_id: U64<LittleEndian>,
    create_timestamp: U64<LittleEndian>,
    expire_timestamp: U64<LittleEndian>,
    nonce: [u8; CONNECT_TOKEN_NONCE_BYTES],
    private_data: [u8; CONNECT_TOKEN_PRIVATE_BYTES],
    timeout_seconds: I32<LittleEndian>,
    num_server_addresses: U32<LittleEndian>,
}

/// Decoded public section of a connect token.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectTokenInfo {
    /// Application protocol id; must match the server's.
    pub protocol_id: u64,
    /// Unix seconds when the token was issued.
    pub create_timestamp: u64,
    /// Unix seconds after which the token is rejected.
    pub expire_timestamp: u64,
    /// Nonce for the private section.
    pub nonce: [u8; CONNECT_TOKEN_NONCE_BYTES],
    /// Encrypted private section, forwarded verbatim in the connection request.
    pub private_data: Box<[u8; CONNECT_TOKEN_PRIVATE_BYTES]>,
    /// Seconds of silence before the connection times out. Negative disables.
    pub timeout_seconds: i32,
    /// Servers to try, in order.
    pub server_addresses: Vec<SocketAddr>,
    /// Key for client to server packets.
    pub client_to_server_key: [u8; KEY_BYTES],
    /// Key for server to client packets.
    pub server_to_client_key: [u8; KEY_BYTES],
}

impl ConnectTokenInfo {
    /// Read the public section of a token.
    pub fn parse(token: &ConnectToken) -> Result<Self, TokenInfoError> {
        let (head, mut rest) = RawTokenHead::ref_from_prefix(token.as_bytes().as_slice())
            .map_err(|_| TokenInfoError::Truncated)?;

        if &head.version_info != VERSION_INFO {
            return Err(TokenInfoError::VersionMismatch);
        }

        let create = head.create_timestamp.get();
        let expire = head.expire_timestamp.get();
        if create > expire {
            return Err(TokenInfoError::InvalidTimestamps { create, expire });
        }

        let count = usize::try_from(head.num_server_addresses.get())
            .map_err(|_| TokenInfoError::InvalidServerCount(usize::MAX))?;
        if count == 0 || count > MAX_SERVERS_PER_CONNECT {
            return Err(TokenInfoError::InvalidServerCount(count));
        }

        let mut server_addresses = Vec::with_capacity(count);
        for _ in 0..count {
            server_addresses.push(read_address(&mut rest)?);
        }

        if rest.remaining() < 2 * KEY_BYTES {
            return Err(TokenInfoError::Truncated);
        }
        let mut client_to_server_key = [0u8; KEY_BYTES];
        let mut server_to_client_key = [0u8; KEY_BYTES];
        rest.copy_to_slice(&mut client_to_server_key);
        rest.copy_to_slice(&mut server_to_client_key);

        Ok(Self {
            protocol_id: head.protocol_id.get(),
            create_timestamp: create,
            expire_timestamp: expire,
            nonce: head.nonce,
            private_data: Box::new(head.private_data),
            timeout_seconds: head.timeout_seconds.get(),
            server_addresses,
            client_to_server_key,
            server_to_client_key,
        })
    }

    /// Serialize into a full-size token, zero padded.
    pub fn to_token(&self) -> Result<ConnectToken, TokenInfoError> {
        let count = self.server_addresses.len();
        if count == 0 || count > MAX_SERVERS_PER_CONNECT {
            return Err(TokenInfoError::InvalidServerCount(count));
        }
        let num_server_addresses =
            u32::try_from(count).map_err(|_| TokenInfoError::InvalidServerCount(count))?;

        let head = RawTokenHead {
            version_info: *VERSION_INFO,
            protocol_id: U64::new(self.protocol_id),
            create_timestamp: U64::new(self.create_timestamp),
            expire_timestamp: U64::new(self.expire_timestamp),
            nonce: self.nonce,
            private_data: *self.private_data,
            timeout_seconds: I32::new(self.timeout_seconds),
            num_server_addresses: U32::new(num_server_addresses),
        };

        let mut buf = BytesMut::with_capacity(CONNECT_TOKEN_BYTES);
        buf.put_slice(head.as_bytes());
        for address in &self.server_addresses {
            write_address(&mut buf, address);
        }
        buf.put_slice(&self.client_to_server_key);
        buf.put_slice(&self.server_to_client_key);

        let mut raw = [0u8; CONNECT_TOKEN_BYTES];
        let used = buf.len().min(CONNECT_TOKEN_BYTES);
        raw[..used].copy_from_slice(&buf[..used]);
        Ok(ConnectToken::from(raw))
    }

    /// Connection timeout in seconds, `None` when disabled.
    pub fn timeout(&self) -> Option<f64> {
        (self.timeout_seconds >= 0).then(|| f64::from(self.timeout_seconds))
    }

    /// Seconds between creation and expiry; how long a handshake may run.
    pub const fn lifetime_seconds(&self) -> u64 {
        self.expire_timestamp.saturating_sub(self.create_timestamp)
    }
}

impl fmt::Debug for ConnectTokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTokenInfo")
            .field("protocol_id", &format_args!("{:#x}", self.protocol_id))
            .field("create_timestamp", &self.create_timestamp)
            .field("expire_timestamp", &self.expire_timestamp)
            .field("private_data", &format_args!("<redacted {} bytes>", self.private_data.len()))
            .field("timeout_seconds", &self.timeout_seconds)
            .field("server_addresses", &self.server_addresses)
            .field("keys", &"<redacted>")
            .finish_non_exhaustive()
    }
}

fn read_address(buf: &mut &[u8]) -> Result<SocketAddr, TokenInfoError> {
    if !buf.has_remaining() {
        return Err(TokenInfoError::Truncated);
    }
    match buf.get_u8() {
        ADDRESS_IPV4 => {
            if buf.remaining() < 4 + 2 {
                return Err(TokenInfoError::Truncated);
            }
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);
            let port = buf.get_u16_le();
            Ok(SocketAddr::from((Ipv4Addr::from(octets), port)))
        },
        ADDRESS_IPV6 => {
            if buf.remaining() < 16 + 2 {
                return Err(TokenInfoError::Truncated);
            }
            let mut segments = [0u16; 8];
            for segment in &mut segments {
                *segment = buf.get_u16_le();
            }
            let port = buf.get_u16_le();
            Ok(SocketAddr::from((Ipv6Addr::from(segments), port)))
        },
        other => Err(TokenInfoError::InvalidAddressType(other)),
    }
}

fn write_address(buf: &mut BytesMut, address: &SocketAddr) {
    match address {
        SocketAddr::V4(v4) => {
            buf.put_u8(ADDRESS_IPV4);
            buf.put_slice(&v4.ip().octets());
            buf.put_u16_le(v4.port());
        },
        SocketAddr::V6(v6) => {
            buf.put_u8(ADDRESS_IPV6);
            for segment in v6.ip().segments() {
                buf.put_u16_le(segment);
            }
            buf.put_u16_le(v6.port());
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConnectTokenInfo {
        ConnectTokenInfo {
            protocol_id: 0x1122_3344_5566_7788,
            create_timestamp: 1_000,
            expire_timestamp: 1_030,
            nonce: [3; CONNECT_TOKEN_NONCE_BYTES],
            private_data: Box::new([9; CONNECT_TOKEN_PRIVATE_BYTES]),
            timeout_seconds: 5,
            server_addresses: vec![
                "127.0.0.1:40000".parse().expect("ipv4"),
                "[::1]:40001".parse().expect("ipv6"),
            ],
            client_to_server_key: [1; KEY_BYTES],
            server_to_client_key: [2; KEY_BYTES],
        }
    }

    #[test]
    fn parse_reads_what_to_token_wrote() {
        let info = sample();
        let token = info.to_token().expect("serialize");
        assert_eq!(ConnectTokenInfo::parse(&token).expect("parse"), info);
    }

    #[test]
    fn header_is_little_endian_at_fixed_offsets() {
        let token = sample().to_token().expect("serialize");
        let bytes = token.as_bytes();
        assert_eq!(&bytes[..VERSION_INFO_BYTES], VERSION_INFO);
        assert_eq!(bytes[13..21], 0x1122_3344_5566_7788u64.to_le_bytes());
    }

    #[test]
    fn rejects_wrong_version() {
        let mut raw = *sample().to_token().expect("serialize").as_bytes();
        raw[0] = b'X';
        let err = ConnectTokenInfo::parse(&ConnectToken::from(raw)).unwrap_err();
        assert_eq!(err, TokenInfoError::VersionMismatch);
    }

    #[test]
    fn rejects_zero_servers() {
        let mut info = sample();
        info.server_addresses.clear();
        assert_eq!(info.to_token().unwrap_err(), TokenInfoError::InvalidServerCount(0));
    }

    #[test]
    fn rejects_all_zero_token() {
        let token = ConnectToken::from([0u8; CONNECT_TOKEN_BYTES]);
        assert_eq!(ConnectTokenInfo::parse(&token).unwrap_err(), TokenInfoError::VersionMismatch);
    }

    #[test]
    fn rejects_unknown_address_type() {
        let mut raw = *sample().to_token().expect("serialize").as_bytes();
        let first_address = std::mem::size_of::<RawTokenHead>();
        raw[first_address] = 7;
        let err = ConnectTokenInfo::parse(&ConnectToken::from(raw)).unwrap_err();
        assert_eq!(err, TokenInfoError::InvalidAddressType(7));
    }

    #[test]
    fn rejects_expiry_before_creation() {
        let mut info = sample();
        info.expire_timestamp = info.create_timestamp - 1;
        let token = info.to_token().expect("serialize");
        assert!(matches!(
            ConnectTokenInfo::parse(&token),
            Err(TokenInfoError::InvalidTimestamps { .. })
        ));
    }

    #[test]
    fn negative_timeout_disables_it() {
        let mut info = sample();
        assert_eq!(info.timeout(), Some(5.0));
        info.timeout_seconds = -1;
        assert_eq!(info.timeout(), None);
    }

    #[test]
    fn lifetime_never_underflows() {
        let mut info = sample();
        assert_eq!(info.lifetime_seconds(), info.expire_timestamp - info.create_timestamp);
        info.expire_timestamp = info.create_timestamp - 1;
        assert_eq!(info.lifetime_seconds(), 0);
    }

    #[test]
    fn debug_redacts_secrets() {
        let text = format!("{:?}", sample());
        assert!(text.contains("<redacted 1024 bytes>"));
        assert!(!text.contains("[1, 1, 1"));
    }
}
