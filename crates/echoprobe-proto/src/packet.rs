//! Plaintext packet codec for the development transport.
//!
//! Production servers encrypt everything after the connection request with
//! the keys from the connect token. The development transport skips that and
//! sends bodies in the clear, which is enough to exercise the client
//! lifecycle against a local echo server.
//!
//! # Wire format
//!
//! Connection request (unsequenced):
//!
//! ```text
//! [0u8][version info 13][protocol id u64][expire u64][nonce 24][private data 1024]
//! ```
//!
//! Every other packet:
//!
//! ```text
//! [kind u8][sequence u64][body]
//! ```
//!
//! All integers little-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U64},
};

use crate::constants::{
    CHALLENGE_TOKEN_BYTES, CONNECT_TOKEN_NONCE_BYTES, CONNECT_TOKEN_PRIVATE_BYTES,
    MAX_PACKET_SIZE, VERSION_INFO, VERSION_INFO_BYTES,
};

/// Packet type tag, first byte of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// Client asks to connect, carrying the token's private section.
    ConnectionRequest = 0,
    /// Server refuses.
    ConnectionDenied = 1,
    /// Server issues a challenge token.
    ConnectionChallenge = 2,
    /// Client echoes the challenge token.
    ConnectionResponse = 3,
    /// Liveness; the first one from the server completes the handshake.
    KeepAlive = 4,
    /// Application payload.
    Payload = 5,
    /// Either side is leaving.
    Disconnect = 6,
}

impl PacketKind {
    /// Parse a type tag.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ConnectionRequest),
            1 => Some(Self::ConnectionDenied),
            2 => Some(Self::ConnectionChallenge),
            3 => Some(Self::ConnectionResponse),
            4 => Some(Self::KeepAlive),
            5 => Some(Self::Payload),
            6 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

/// Packet decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Empty datagram or header cut short.
    #[error("packet truncated")]
    Truncated,

    /// Unknown type tag.
    #[error("unknown packet type: {0}")]
    UnknownKind(u8),

    /// Body length does not match the packet type.
    #[error("bad body length for {kind:?}: {len} bytes")]
    BadLength {
        /// Packet type.
        kind: PacketKind,
        /// Body length received.
        len: usize,
    },

    /// Connection request carries a different version string.
    #[error("connection request version mismatch")]
    VersionMismatch,
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct SequencedHeader {
    kind: u8,
    sequence: U64<LittleEndian>,
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawConnectionRequest {
    kind: u8,
    version_info: [u8; VERSION_INFO_BYTES],
    protocol_id: U64<LittleEndian>,
    expire_timestamp: U64<LittleEndian>,
    nonce: [u8; CONNECT_TOKEN_NONCE_BYTES],
    private_data: [u8; CONNECT_TOKEN_PRIVATE_BYTES],
}

/// Decoded packet.
#[derive(Clone, PartialEq, Eq)]
pub enum Packet {
    /// Opening request built from the connect token.
    ConnectionRequest {
        /// Application protocol id.
        protocol_id: u64,
        /// Token expiry, unix seconds.
        expire_timestamp: u64,
        /// Nonce for the private section.
        nonce: [u8; CONNECT_TOKEN_NONCE_BYTES],
        /// Encrypted private section.
        private_data: Box<[u8; CONNECT_TOKEN_PRIVATE_BYTES]>,
    },
    /// Server refused the request.
    ConnectionDenied,
    /// Server challenge.
    ConnectionChallenge {
        /// Challenge sequence chosen by the server.
        token_sequence: u64,
        /// Opaque challenge data.
        token_data: Bytes,
    },
    /// Client answer to a challenge.
    ConnectionResponse {
        /// Challenge sequence being answered.
        token_sequence: u64,
        /// Challenge data echoed back.
        token_data: Bytes,
    },
    /// Liveness packet.
    KeepAlive {
        /// Slot the server assigned to us.
        client_index: u32,
        /// Server capacity.
        max_clients: u32,
    },
    /// Application payload, `1..=MAX_PACKET_SIZE` bytes.
    Payload(Bytes),
    /// Peer is leaving.
    Disconnect,
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionRequest { protocol_id, expire_timestamp, .. } => f
                .debug_struct("ConnectionRequest")
                .field("protocol_id", &format_args!("{protocol_id:#x}"))
                .field("expire_timestamp", expire_timestamp)
                .finish_non_exhaustive(),
            Self::ConnectionDenied => f.write_str("ConnectionDenied"),
            Self::ConnectionChallenge { token_sequence, .. } => f
                .debug_struct("ConnectionChallenge")
                .field("token_sequence", token_sequence)
                .finish_non_exhaustive(),
            Self::ConnectionResponse { token_sequence, .. } => f
                .debug_struct("ConnectionResponse")
                .field("token_sequence", token_sequence)
                .finish_non_exhaustive(),
            Self::KeepAlive { client_index, max_clients } => f
                .debug_struct("KeepAlive")
                .field("client_index", client_index)
                .field("max_clients", max_clients)
                .finish(),
            Self::Payload(bytes) => write!(f, "Payload({} bytes)", bytes.len()),
            Self::Disconnect => f.write_str("Disconnect"),
        }
    }
}

/// A decoded packet with its sequence number (zero for connection requests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedPacket {
    /// Sender's packet sequence.
    pub sequence: u64,
    /// Decoded packet.
    pub packet: Packet,
}

impl Packet {
    /// Type tag of this packet.
    pub const fn kind(&self) -> PacketKind {
        match self {
            Self::ConnectionRequest { .. } => PacketKind::ConnectionRequest,
            Self::ConnectionDenied => PacketKind::ConnectionDenied,
            Self::ConnectionChallenge { .. } => PacketKind::ConnectionChallenge,
            Self::ConnectionResponse { .. } => PacketKind::ConnectionResponse,
            Self::KeepAlive { .. } => PacketKind::KeepAlive,
            Self::Payload(_) => PacketKind::Payload,
            Self::Disconnect => PacketKind::Disconnect,
        }
    }

    /// Append the wire form to `dst`. `sequence` is ignored for connection
    /// requests.
    pub fn encode(&self, sequence: u64, dst: &mut BytesMut) {
        if let Self::ConnectionRequest { protocol_id, expire_timestamp, nonce, private_data } = self
        {
            let raw = RawConnectionRequest {
                kind: PacketKind::ConnectionRequest as u8,
                version_info: *VERSION_INFO,
                protocol_id: U64::new(*protocol_id),
                expire_timestamp: U64::new(*expire_timestamp),
                nonce: *nonce,
                private_data: **private_data,
            };
            dst.put_slice(raw.as_bytes());
            return;
        }

        let header = SequencedHeader { kind: self.kind() as u8, sequence: U64::new(sequence) };
        dst.put_slice(header.as_bytes());

        match self {
            Self::ConnectionChallenge { token_sequence, token_data }
            | Self::ConnectionResponse { token_sequence, token_data } => {
                dst.put_u64_le(*token_sequence);
                dst.put_slice(token_data);
            },
            Self::KeepAlive { client_index, max_clients } => {
                dst.put_u32_le(*client_index);
                dst.put_u32_le(*max_clients);
            },
            Self::Payload(bytes) => dst.put_slice(bytes),
            Self::ConnectionRequest { .. } | Self::ConnectionDenied | Self::Disconnect => {},
        }
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self, sequence: u64) -> Bytes {
        let mut buf = BytesMut::with_capacity(MAX_PACKET_SIZE + 16);
        self.encode(sequence, &mut buf);
        buf.freeze()
    }

    /// Decode one datagram.
    pub fn decode(datagram: &[u8]) -> Result<SequencedPacket, PacketError> {
        let &tag = datagram.first().ok_or(PacketError::Truncated)?;
        let kind = PacketKind::from_u8(tag).ok_or(PacketError::UnknownKind(tag))?;

        if kind == PacketKind::ConnectionRequest {
            return decode_request(datagram);
        }

        let (header, mut body) =
            SequencedHeader::ref_from_prefix(datagram).map_err(|_| PacketError::Truncated)?;
        let sequence = header.sequence.get();
        let len = body.len();
        let bad_length = || PacketError::BadLength { kind, len };

        let packet = match kind {
            PacketKind::ConnectionDenied | PacketKind::Disconnect => {
                if len != 0 {
                    return Err(bad_length());
                }
                if kind == PacketKind::Disconnect { Self::Disconnect } else { Self::ConnectionDenied }
            },
            PacketKind::ConnectionChallenge | PacketKind::ConnectionResponse => {
                if len != 8 + CHALLENGE_TOKEN_BYTES {
                    return Err(bad_length());
                }
                let token_sequence = body.get_u64_le();
                let token_data = Bytes::copy_from_slice(body);
                if kind == PacketKind::ConnectionChallenge {
                    Self::ConnectionChallenge { token_sequence, token_data }
                } else {
                    Self::ConnectionResponse { token_sequence, token_data }
                }
            },
            PacketKind::KeepAlive => {
                if len != 8 {
                    return Err(bad_length());
                }
                Self::KeepAlive { client_index: body.get_u32_le(), max_clients: body.get_u32_le() }
            },
            PacketKind::Payload => {
                if len == 0 || len > MAX_PACKET_SIZE {
                    return Err(bad_length());
                }
                Self::Payload(Bytes::copy_from_slice(body))
            },
            PacketKind::ConnectionRequest => return decode_request(datagram),
        };

        Ok(SequencedPacket { sequence, packet })
    }
}

fn decode_request(datagram: &[u8]) -> Result<SequencedPacket, PacketError> {
    let raw = RawConnectionRequest::ref_from_bytes(datagram).map_err(|_| {
        PacketError::BadLength { kind: PacketKind::ConnectionRequest, len: datagram.len() }
    })?;
    if &raw.version_info != VERSION_INFO {
        return Err(PacketError::VersionMismatch);
    }
    Ok(SequencedPacket {
        sequence: 0,
        packet: Packet::ConnectionRequest {
            protocol_id: raw.protocol_id.get(),
            expire_timestamp: raw.expire_timestamp.get(),
            nonce: raw.nonce,
            private_data: Box::new(raw.private_data),
        },
    })
}
