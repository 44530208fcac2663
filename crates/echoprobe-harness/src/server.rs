//! Plaintext echo server for simulated hosts.
//!
//! Answers the client half of the handshake and echoes payloads back, with
//! scripted misbehavior for the failure scenarios. Loss and latency come
//! from the simulated network; everything the network cannot do (denying,
//! going quiet, altering echoes) happens here.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use echoprobe_proto::{Packet, constants::CHALLENGE_TOKEN_BYTES};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::token::TEST_PROTOCOL_ID;

/// Port simulated servers listen on.
pub const SERVER_PORT: u16 = 40000;

/// How the server treats its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerBehavior {
    /// Complete the handshake and echo every payload.
    Echo,
    /// Never answer anything.
    Silent,
    /// Deny every connection request.
    Deny,
    /// Send challenges but never accept the response.
    IgnoreResponse,
    /// Echo, then stop answering this long after the client connected.
    GoSilent {
        /// Time after connecting.
        after: Duration,
    },
    /// Echo, then disconnect the client this long after it connected.
    Disconnect {
        /// Time after connecting.
        after: Duration,
    },
    /// Flip one bit of the `nth` echoed payload (1-based).
    CorruptEcho {
        /// Payload to corrupt.
        nth: u64,
    },
    /// Drop the last byte of the `nth` echoed payload (1-based).
    TruncateEcho {
        /// Payload to truncate.
        nth: u64,
    },
}

/// What a server saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Connection requests received.
    pub requests_received: u64,
    /// Requests answered with a denial.
    pub requests_denied: u64,
    /// Challenge responses received.
    pub responses_received: u64,
    /// Payloads received from the client.
    pub payloads_received: u64,
    /// Payloads sent back.
    pub payloads_echoed: u64,
    /// Disconnect packets received from the client.
    pub disconnects_received: u64,
    /// Byte offset of the corrupted echo, once one was sent.
    pub corrupted_offset: Option<usize>,
}

/// Shared view of a server's [`ServerStats`].
#[derive(Debug, Clone, Default)]
pub struct ServerStatsHandle(Arc<Mutex<ServerStats>>);

impl ServerStatsHandle {
    /// Copy of the current counters.
    pub fn snapshot(&self) -> ServerStats {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, f: impl FnOnce(&mut ServerStats)) {
        f(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// Echo server for one client.
#[derive(Debug, Clone)]
pub struct EchoServer {
    behavior: ServerBehavior,
    protocol_id: u64,
    max_clients: u32,
    rng: ChaCha8Rng,
    challenges: u64,
    connected_at: Option<Duration>,
    stats: ServerStatsHandle,
}

impl EchoServer {
    /// Server accepting [`TEST_PROTOCOL_ID`] tokens.
    pub fn new(behavior: ServerBehavior) -> Self {
        Self {
            behavior,
            protocol_id: TEST_PROTOCOL_ID,
            max_clients: 64,
            rng: ChaCha8Rng::seed_from_u64(0),
            challenges: 0,
            connected_at: None,
            stats: ServerStatsHandle::default(),
        }
    }

    /// Seed for choosing which byte a corrupted echo alters.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Deny requests for any other protocol id.
    #[must_use]
    pub const fn protocol_id(mut self, protocol_id: u64) -> Self {
        self.protocol_id = protocol_id;
        self
    }

    /// Counters shared with every clone of this server.
    pub fn stats(&self) -> ServerStatsHandle {
        self.stats.clone()
    }

    /// Reply to `packet`, received `elapsed` after the server started.
    pub fn respond(&mut self, packet: Packet, elapsed: Duration) -> Option<Packet> {
        match packet {
            Packet::ConnectionRequest { protocol_id, .. } => self.on_request(protocol_id),
            Packet::ConnectionResponse { .. } => {
                self.stats.update(|s| s.responses_received += 1);
                if matches!(self.behavior, ServerBehavior::Silent | ServerBehavior::IgnoreResponse) {
                    return None;
                }
                self.connected_at.get_or_insert(elapsed);
                Some(self.keep_alive())
            },
            Packet::KeepAlive { .. } => {
                self.connected_at?;
                if self.is_quiet(elapsed) {
                    return None;
                }
                Some(self.after_connect(elapsed).unwrap_or_else(|| self.keep_alive()))
            },
            Packet::Payload(payload) => {
                self.stats.update(|s| s.payloads_received += 1);
                self.connected_at?;
                if let Some(reply) = self.after_connect(elapsed) {
                    return Some(reply);
                }
                if self.is_quiet(elapsed) {
                    return None;
                }
                Some(Packet::Payload(self.echo(payload)))
            },
            Packet::Disconnect => {
                self.stats.update(|s| s.disconnects_received += 1);
                None
            },
            Packet::ConnectionDenied | Packet::ConnectionChallenge { .. } => None,
        }
    }

    /// Serve on `port` until the simulation ends.
    pub async fn serve(mut self, port: u16) -> turmoil::Result {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let socket = turmoil::net::UdpSocket::bind(addr).await?;
        let started = tokio::time::Instant::now();
        let mut buf = vec![0u8; 2048];
        let mut sequence = 0u64;

        loop {
            let (len, from) = socket.recv_from(&mut buf).await?;
            let received = match Packet::decode(&buf[..len]) {
                Ok(received) => received,
                Err(e) => {
                    tracing::debug!(%from, "server dropping malformed datagram: {e}");
                    continue;
                },
            };
            if let Some(reply) = self.respond(received.packet, started.elapsed()) {
                sequence += 1;
                socket.send_to(&reply.to_bytes(sequence), from).await?;
            }
        }
    }

    fn on_request(&mut self, protocol_id: u64) -> Option<Packet> {
        self.stats.update(|s| s.requests_received += 1);
        match self.behavior {
            ServerBehavior::Silent => None,
            ServerBehavior::Deny => Some(self.deny()),
            _ if protocol_id != self.protocol_id => Some(self.deny()),
            _ => {
                self.challenges += 1;
                Some(Packet::ConnectionChallenge {
                    token_sequence: self.challenges,
                    token_data: Bytes::from(vec![0xc4; CHALLENGE_TOKEN_BYTES]),
                })
            },
        }
    }

    fn deny(&self) -> Packet {
        self.stats.update(|s| s.requests_denied += 1);
        Packet::ConnectionDenied
    }

    fn keep_alive(&self) -> Packet {
        Packet::KeepAlive { client_index: 0, max_clients: self.max_clients }
    }

    fn since_connect(&self, elapsed: Duration) -> Duration {
        self.connected_at.map_or(Duration::ZERO, |at| elapsed.saturating_sub(at))
    }

    /// Disconnect packet once a scripted disconnect is due.
    fn after_connect(&self, elapsed: Duration) -> Option<Packet> {
        match self.behavior {
            ServerBehavior::Disconnect { after } if self.since_connect(elapsed) >= after => {
                Some(Packet::Disconnect)
            },
            _ => None,
        }
    }

    fn is_quiet(&self, elapsed: Duration) -> bool {
        matches!(self.behavior, ServerBehavior::GoSilent { after } if self.since_connect(elapsed) >= after)
    }

    fn echo(&mut self, payload: Bytes) -> Bytes {
        let nth = self.stats.snapshot().payloads_received;
        let echoed = match self.behavior {
            ServerBehavior::CorruptEcho { nth: target } if nth == target => {
                let mut altered = payload.to_vec();
                let offset = self.rng.gen_range(0..altered.len());
                altered[offset] ^= 1 << self.rng.gen_range(0..8u8);
                self.stats.update(|s| s.corrupted_offset = Some(offset));
                Bytes::from(altered)
            },
            ServerBehavior::TruncateEcho { nth: target } if nth == target => {
                payload.slice(..payload.len().saturating_sub(1))
            },
            _ => payload,
        };
        self.stats.update(|s| s.payloads_echoed += 1);
        echoed
    }
}
