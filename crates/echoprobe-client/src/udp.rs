//! Plaintext UDP connection engine.
//!
//! Development transport: the handshake and packet framing of the secure
//! protocol without the encryption. It speaks [`Packet`] over any
//! non-blocking [`DatagramSocket`] and implements the client half of the
//! lifecycle:
//!
//! ```text
//! SendingConnectionRequest  --challenge-->  SendingConnectionResponse
//! SendingConnectionResponse --keep-alive--> Connected
//! Connected                 --disconnect--> Disconnected
//! ```
//!
//! Handshake and keep-alive packets go out at `PACKET_SEND_RATE`. When a
//! server denies the request or stops answering during the handshake, the
//! next address in the token is tried before the session gives up.

use std::{
    collections::VecDeque,
    io,
    net::{IpAddr, SocketAddr},
};

use bytes::Bytes;
use echoprobe_core::{
    ConnectionEngine, DatagramSocket, EngineError, EngineSession, ReceivedPacket, Transport,
};
use echoprobe_proto::{
    ClientState, ConnectToken, ConnectTokenInfo, Packet, SequencedPacket,
    constants::{NUM_DISCONNECT_PACKETS, PACKET_SEND_RATE},
};

/// Largest datagram we expect to read.
const RECV_BUFFER_BYTES: usize = 2048;

/// Slack for comparing tick times against the send interval.
const TIME_EPSILON: f64 = 1e-9;

/// Engine creating plaintext UDP sessions on sockets from `T`.
#[derive(Debug)]
pub struct UdpEngine<T: Transport> {
    transport: T,
    sessions_created: u64,
    terminated: bool,
}

impl<T: Transport> UdpEngine<T> {
    /// Engine binding its sessions through `transport`.
    pub const fn new(transport: T) -> Self {
        Self { transport, sessions_created: 0, terminated: false }
    }
}

impl<T: Transport> ConnectionEngine for UdpEngine<T> {
    type Session = UdpSession<T::Socket>;

    fn create_session(
        &mut self,
        bind_address: &str,
        time: f64,
    ) -> Result<UdpSession<T::Socket>, EngineError> {
        let bind = parse_bind_address(bind_address)?;
        let socket = self.transport.bind(bind)?;
        self.sessions_created += 1;
        tracing::debug!(local = ?socket.local_addr().ok(), "client socket bound");
        Ok(UdpSession::new(socket, time))
    }

    fn terminate(&mut self) {
        if !self.terminated {
            self.terminated = true;
            tracing::debug!(sessions = self.sessions_created, "plaintext UDP engine terminated");
        }
    }
}

/// Accepts `ip:port` or a bare IP, which binds an ephemeral port.
fn parse_bind_address(address: &str) -> Result<SocketAddr, EngineError> {
    address
        .parse::<SocketAddr>()
        .or_else(|_| address.parse::<IpAddr>().map(|ip| SocketAddr::new(ip, 0)))
        .map_err(|e| EngineError::InvalidBindAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// One client session over UDP.
pub struct UdpSession<S: DatagramSocket> {
    socket: S,
    state: ClientState,
    time: f64,
    token: Option<ConnectTokenInfo>,
    server_index: usize,
    connect_start: f64,
    last_sent: Option<f64>,
    last_received: f64,
    sequence: u64,
    challenge: Option<(u64, Bytes)>,
    client_index: u32,
    max_clients: u32,
    inbox: VecDeque<ReceivedPacket>,
    outstanding: usize,
    recv_buf: Box<[u8; RECV_BUFFER_BYTES]>,
}

impl<S: DatagramSocket> UdpSession<S> {
    fn new(socket: S, time: f64) -> Self {
        Self {
            socket,
            state: ClientState::Disconnected,
            time,
            token: None,
            server_index: 0,
            connect_start: time,
            last_sent: None,
            last_received: time,
            sequence: 0,
            challenge: None,
            client_index: 0,
            max_clients: 0,
            inbox: VecDeque::new(),
            outstanding: 0,
            recv_buf: Box::new([0; RECV_BUFFER_BYTES]),
        }
    }

    /// Local socket address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Server currently being talked to.
    pub fn server_address(&self) -> Option<SocketAddr> {
        self.token.as_ref().and_then(|token| token.server_addresses.get(self.server_index).copied())
    }

    /// Slot assigned by the server once connected.
    pub const fn client_index(&self) -> u32 {
        self.client_index
    }

    /// Server capacity reported in its keep-alives.
    pub const fn max_clients(&self) -> u32 {
        self.max_clients
    }

    fn set_state(&mut self, state: ClientState) {
        if state != self.state {
            tracing::debug!(from = %self.state, to = %state, "udp session state");
            self.state = state;
        }
    }

    /// Move to the next server in the token, or fail with `state`.
    fn fail_or_next_server(&mut self, state: ClientState) {
        let servers = self.token.as_ref().map_or(0, |token| token.server_addresses.len());
        if self.server_index + 1 >= servers {
            self.set_state(state);
            return;
        }

        self.server_index += 1;
        self.challenge = None;
        self.last_sent = None;
        self.last_received = self.time;
        tracing::info!(server = ?self.server_address(), reason = %state, "trying next server");
        self.set_state(ClientState::SendingConnectionRequest);
    }

    fn send(&mut self, packet: &Packet) {
        let Some(server) = self.server_address() else { return };
        let bytes = packet.to_bytes(self.sequence);
        self.sequence += 1;
        if let Err(e) = self.socket.try_send_to(&bytes, server) {
            tracing::debug!(%server, "send failed: {e}");
        }
        self.last_sent = Some(self.time);
    }

    fn receive_packets(&mut self) {
        loop {
            let (len, from) = match self.socket.try_recv_from(&mut self.recv_buf[..]) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => {
                    tracing::warn!("receive failed: {e}");
                    break;
                },
            };

            if self.server_address() != Some(from) {
                tracing::trace!(%from, "ignoring datagram from unknown peer");
                continue;
            }

            let decoded = Packet::decode(&self.recv_buf[..len]);
            match decoded {
                Ok(packet) => self.process_packet(packet),
                Err(e) => tracing::debug!(%from, len, "dropping malformed datagram: {e}"),
            }

            if self.state.is_terminal() {
                break;
            }
        }
    }

    fn process_packet(&mut self, SequencedPacket { sequence, packet }: SequencedPacket) {
        match (self.state, packet) {
            (state, Packet::ConnectionDenied) if state.is_connecting() => {
                self.fail_or_next_server(ClientState::ConnectionDenied);
            },
            (
                ClientState::SendingConnectionRequest,
                Packet::ConnectionChallenge { token_sequence, token_data },
            ) => {
                self.challenge = Some((token_sequence, token_data));
                self.last_received = self.time;
                self.last_sent = None;
                self.set_state(ClientState::SendingConnectionResponse);
            },
            (ClientState::SendingConnectionResponse, Packet::KeepAlive { client_index, max_clients }) => {
                self.client_index = client_index;
                self.max_clients = max_clients;
                self.last_received = self.time;
                self.last_sent = None;
                self.set_state(ClientState::Connected);
            },
            (ClientState::Connected, Packet::KeepAlive { .. }) => {
                self.last_received = self.time;
            },
            (ClientState::Connected, Packet::Payload(payload)) => {
                self.last_received = self.time;
                self.inbox.push_back(ReceivedPacket::new(sequence, payload));
            },
            (ClientState::Connected, Packet::Disconnect) => {
                self.set_state(ClientState::Disconnected);
            },
            (state, packet) => {
                tracing::trace!(%state, kind = ?packet.kind(), "ignoring packet");
            },
        }
    }

    fn send_packets(&mut self) {
        let interval = 1.0 / PACKET_SEND_RATE;
        if self.last_sent.is_some_and(|at| self.time - at + TIME_EPSILON < interval) {
            return;
        }

        let packet = match self.state {
            ClientState::SendingConnectionRequest => {
                let Some(token) = &self.token else { return };
                Packet::ConnectionRequest {
                    protocol_id: token.protocol_id,
                    expire_timestamp: token.expire_timestamp,
                    nonce: token.nonce,
                    private_data: token.private_data.clone(),
                }
            },
            ClientState::SendingConnectionResponse => {
                let Some((token_sequence, token_data)) = &self.challenge else { return };
                Packet::ConnectionResponse {
                    token_sequence: *token_sequence,
                    token_data: token_data.clone(),
                }
            },
            ClientState::Connected => Packet::KeepAlive {
                client_index: self.client_index,
                max_clients: self.max_clients,
            },
            _ => return,
        };
        self.send(&packet);
    }

    fn check_timeouts(&mut self) {
        let Some(token) = &self.token else { return };

        #[allow(clippy::cast_precision_loss)]
        let lifetime = token.lifetime_seconds() as f64;
        if self.state.is_connecting() && self.time - self.connect_start >= lifetime {
            self.set_state(ClientState::ConnectTokenExpired);
            return;
        }

        let Some(timeout) = token.timeout() else { return };
        if self.time - self.last_received < timeout {
            return;
        }
        match self.state {
            ClientState::SendingConnectionRequest => {
                self.fail_or_next_server(ClientState::ConnectionRequestTimedOut);
            },
            ClientState::SendingConnectionResponse => {
                self.fail_or_next_server(ClientState::ConnectionResponseTimedOut);
            },
            ClientState::Connected => self.set_state(ClientState::ConnectionTimedOut),
            _ => {},
        }
    }
}

impl<S: DatagramSocket> EngineSession for UdpSession<S> {
    fn connect(&mut self, token: ConnectToken) {
        let info = match ConnectTokenInfo::parse(&token) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("connect token rejected: {e}");
                self.set_state(ClientState::InvalidConnectToken);
                return;
            },
        };

        tracing::info!(
            protocol_id = info.protocol_id,
            servers = info.server_addresses.len(),
            server = ?info.server_addresses.first(),
            "connecting"
        );

        self.token = Some(info);
        self.server_index = 0;
        self.connect_start = self.time;
        self.last_received = self.time;
        self.last_sent = None;
        self.challenge = None;
        self.set_state(ClientState::SendingConnectionRequest);
    }

    fn service(&mut self, time: f64) {
        self.time = time;
        if self.state.is_terminal() {
            return;
        }
        self.receive_packets();
        if self.state.is_terminal() {
            return;
        }
        self.send_packets();
        self.check_timeouts();
    }

    fn state(&self) -> ClientState {
        self.state
    }

    fn send_packet(&mut self, payload: &[u8]) {
        if self.state != ClientState::Connected {
            return;
        }
        if payload.is_empty() || payload.len() > echoprobe_proto::MAX_PACKET_SIZE {
            tracing::warn!(len = payload.len(), "payload size out of range, not sent");
            return;
        }
        self.send(&Packet::Payload(Bytes::copy_from_slice(payload)));
    }

    fn try_receive(&mut self) -> Option<ReceivedPacket> {
        let packet = self.inbox.pop_front()?;
        self.outstanding += 1;
        Some(packet)
    }

    fn release_packet(&mut self, packet: ReceivedPacket) {
        drop(packet);
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    fn destroy(&mut self) {
        if self.state == ClientState::Connected {
            for _ in 0..NUM_DISCONNECT_PACKETS {
                self.send(&Packet::Disconnect);
            }
            self.set_state(ClientState::Disconnected);
        }
        if self.outstanding > 0 {
            tracing::warn!(outstanding = self.outstanding, "session destroyed with unreleased packets");
        }
        self.inbox.clear();
        self.token = None;
    }
}
