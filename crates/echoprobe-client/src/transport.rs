//! Tokio UDP transport.
//!
//! Sockets are bound with the standard library so binding stays
//! synchronous, then registered with the runtime's I/O driver. Readiness is
//! learned from the driver, so a fresh socket may report `WouldBlock` until
//! the session loop has slept through its first tick.

use std::{io, net::SocketAddr};

use echoprobe_core::{DatagramSocket, EngineError, Transport};
use tokio::runtime::Handle;

use crate::udp::UdpEngine;

/// The production engine: plaintext UDP over Tokio sockets.
pub type PlainUdpEngine = UdpEngine<TokioTransport>;

impl UdpEngine<TokioTransport> {
    /// Initialize the engine on the current Tokio runtime.
    pub fn init() -> Result<Self, EngineError> {
        let engine = Self::new(TokioTransport::new()?);
        tracing::debug!("plaintext UDP engine ready");
        Ok(engine)
    }
}

/// Binds non-blocking UDP sockets registered with a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioTransport {
    runtime: Handle,
}

impl TokioTransport {
    /// Transport on the runtime this is called from.
    pub fn new() -> Result<Self, EngineError> {
        let runtime =
            Handle::try_current().map_err(|e| EngineError::Init { reason: e.to_string() })?;
        Ok(Self { runtime })
    }
}

impl Transport for TokioTransport {
    type Socket = TokioSocket;

    fn bind(&mut self, addr: SocketAddr) -> io::Result<TokioSocket> {
        let socket = std::net::UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let _runtime = self.runtime.enter();
        tokio::net::UdpSocket::from_std(socket).map(TokioSocket)
    }
}

/// A Tokio UDP socket used through its non-blocking `try_*` calls.
#[derive(Debug)]
pub struct TokioSocket(tokio::net::UdpSocket);

impl DatagramSocket for TokioSocket {
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.0.try_send_to(buf, target)
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.0.try_recv_from(buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use echoprobe_core::{ConnectionEngine, EngineSession};
    use echoprobe_proto::{ClientState, ConnectTokenInfo, Packet, PacketKind};

    use super::*;

    #[test]
    fn init_outside_a_runtime_fails() {
        assert!(matches!(PlainUdpEngine::init(), Err(EngineError::Init { .. })));
    }

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let mut transport = TokioTransport::new().expect("runtime");
        let socket = transport.bind(SocketAddr::from(([127, 0, 0, 1], 0))).expect("bind");
        assert_ne!(socket.local_addr().expect("addr").port(), 0);
    }

    #[tokio::test]
    async fn second_bind_on_same_port_fails() {
        let mut transport = TokioTransport::new().expect("runtime");
        let first = transport.bind(SocketAddr::from(([127, 0, 0, 1], 0))).expect("bind");
        let taken = first.local_addr().expect("addr");
        assert!(transport.bind(taken).is_err());
    }

    #[tokio::test]
    async fn request_reaches_a_real_socket() {
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.expect("server");
        let server_addr = server.local_addr().expect("addr");
        let token = ConnectTokenInfo {
            protocol_id: 7,
            create_timestamp: 100,
            expire_timestamp: 130,
            nonce: [1; echoprobe_proto::CONNECT_TOKEN_NONCE_BYTES],
            private_data: Box::new([2; echoprobe_proto::CONNECT_TOKEN_PRIVATE_BYTES]),
            timeout_seconds: 5,
            server_addresses: vec![server_addr],
            client_to_server_key: [3; 32],
            server_to_client_key: [4; 32],
        }
        .to_token()
        .expect("token");

        let mut engine = PlainUdpEngine::init().expect("init");
        let mut session = engine.create_session("127.0.0.1", 0.0).expect("session");
        session.connect(token);

        // Let the driver register the socket before the first send.
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.service(0.0);

        let mut buf = [0u8; 2048];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), server.recv_from(&mut buf))
            .await
            .expect("request in time")
            .expect("recv");
        let request = Packet::decode(&buf[..len]).expect("decode");
        assert_eq!(request.packet.kind(), PacketKind::ConnectionRequest);

        server.send_to(&Packet::ConnectionDenied.to_bytes(0), from).await.expect("deny");
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.service(0.1);
        assert_eq!(session.state(), ClientState::ConnectionDenied);
        engine.terminate();
    }
}
