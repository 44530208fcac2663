//! Client runs over real localhost UDP against an in-process echo server.

use std::{
    net::{SocketAddr, UdpSocket},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use bytes::Bytes;
use echoprobe_client::{
    Client, ClientConfig, ClientError, DriverConfig, EXIT_FAILURE, PlainUdpEngine, SessionOutcome,
    SystemEnv,
};
use echoprobe_core::EngineError;
use echoprobe_proto::{
    CONNECT_TOKEN_NONCE_BYTES, CONNECT_TOKEN_PRIVATE_BYTES, ClientState, ConnectTokenInfo, Packet,
    TokenError,
    constants::{CHALLENGE_TOKEN_BYTES, KEY_BYTES},
};

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Echo,
    Deny,
}

/// Minimal plaintext server: one client, answers until stopped.
struct EchoServer {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    disconnects: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl EchoServer {
    fn start(mode: Mode) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind");
        socket.set_read_timeout(Some(Duration::from_millis(20))).expect("timeout");
        let addr = socket.local_addr().expect("addr");
        let stop = Arc::new(AtomicBool::new(false));
        let disconnects = Arc::new(AtomicU64::new(0));

        let thread = {
            let stop = Arc::clone(&stop);
            let disconnects = Arc::clone(&disconnects);
            thread::spawn(move || serve(&socket, mode, &stop, &disconnects))
        };

        Self { addr, stop, disconnects, thread: Some(thread) }
    }

    fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn serve(socket: &UdpSocket, mode: Mode, stop: &AtomicBool, disconnects: &AtomicU64) {
    let mut buf = [0u8; 2048];
    let mut sequence = 0u64;
    while !stop.load(Ordering::Relaxed) {
        let Ok((len, from)) = socket.recv_from(&mut buf) else { continue };
        let Ok(received) = Packet::decode(&buf[..len]) else { continue };

        let reply = match (mode, received.packet) {
            (Mode::Deny, Packet::ConnectionRequest { .. }) => Some(Packet::ConnectionDenied),
            (Mode::Echo, Packet::ConnectionRequest { .. }) => Some(Packet::ConnectionChallenge {
                token_sequence: 1,
                token_data: Bytes::from(vec![0x11; CHALLENGE_TOKEN_BYTES]),
            }),
            (Mode::Echo, Packet::ConnectionResponse { .. } | Packet::KeepAlive { .. }) => {
                Some(Packet::KeepAlive { client_index: 0, max_clients: 1 })
            },
            (Mode::Echo, Packet::Payload(payload)) => Some(Packet::Payload(payload)),
            (_, Packet::Disconnect) => {
                disconnects.fetch_add(1, Ordering::Relaxed);
                None
            },
            _ => None,
        };

        if let Some(reply) = reply {
            sequence += 1;
            let _ = socket.send_to(&reply.to_bytes(sequence), from);
        }
    }
}

/// Base64 token for `server` with a 30 s lifetime.
fn token(server: SocketAddr, timeout_seconds: i32) -> String {
    ConnectTokenInfo {
        protocol_id: 0x00ec_0000,
        create_timestamp: 1_700_000_000,
        expire_timestamp: 1_700_000_030,
        nonce: [0x4e; CONNECT_TOKEN_NONCE_BYTES],
        private_data: Box::new([0x50; CONNECT_TOKEN_PRIVATE_BYTES]),
        timeout_seconds,
        server_addresses: vec![server],
        client_to_server_key: [0xc5; KEY_BYTES],
        server_to_client_key: [0x5c; KEY_BYTES],
    }
    .to_token()
    .expect("token")
    .to_base64()
}

fn config(max_ticks: u64) -> ClientConfig {
    ClientConfig {
        bind_address: "127.0.0.1".to_string(),
        driver: DriverConfig { max_ticks: Some(max_ticks), ..Default::default() },
    }
}

#[tokio::test]
async fn echoes_round_trip_over_udp() {
    let server = EchoServer::start(Mode::Echo);
    let token = token(server.addr, 5);
    let engine = PlainUdpEngine::init().expect("init");

    let report = Client::new(SystemEnv::new(), engine, config(60)).run(&token).await.expect("run");

    assert_eq!(report.outcome, SessionOutcome::TickLimit);
    assert_eq!(report.final_state, ClientState::Connected);
    assert!(report.connected_at_tick.is_some());
    assert!(report.packets_validated > 0, "no echoes validated: {report:?}");

    thread::sleep(Duration::from_millis(100));
    assert!(server.disconnects() > 0, "server never saw a disconnect");
}

#[tokio::test]
async fn denial_ends_the_run_cleanly() {
    let server = EchoServer::start(Mode::Deny);
    let token = token(server.addr, 5);
    let engine = PlainUdpEngine::init().expect("init");

    let report =
        Client::new(SystemEnv::new(), engine, config(120)).run(&token).await.expect("run");

    assert_eq!(report.outcome, SessionOutcome::Terminated(ClientState::ConnectionDenied));
    assert_eq!(report.packets_sent, 0);
}

#[tokio::test]
async fn unreachable_server_times_out() {
    let silent = UdpSocket::bind("127.0.0.1:0").expect("bind");
    let token = token(silent.local_addr().expect("addr"), 1);
    let engine = PlainUdpEngine::init().expect("init");

    let report =
        Client::new(SystemEnv::new(), engine, config(180)).run(&token).await.expect("run");

    assert_eq!(
        report.outcome,
        SessionOutcome::Terminated(ClientState::ConnectionRequestTimedOut)
    );
    assert!(report.connected_at_tick.is_none());
}

#[tokio::test]
async fn short_token_fails_before_any_session() {
    let engine = PlainUdpEngine::init().expect("init");
    let err = Client::new(SystemEnv::new(), engine, config(60)).run("AAAA").await.expect_err("short");

    assert!(matches!(
        err,
        ClientError::Token(TokenError::InvalidTokenLength { expected: 2048, actual: 3 })
    ));
    assert_eq!(err.exit_code(), EXIT_FAILURE);
}

#[tokio::test]
async fn garbage_token_is_an_input_error() {
    let engine = PlainUdpEngine::init().expect("init");
    let err =
        Client::new(SystemEnv::new(), engine, config(60)).run("not base64!").await.expect_err("garbage");

    assert!(matches!(err, ClientError::Token(TokenError::InvalidEncoding(_))));
    assert_eq!(err.exit_code(), EXIT_FAILURE);
}

#[tokio::test]
async fn bad_bind_address_exits_with_failure() {
    let engine = PlainUdpEngine::init().expect("init");
    let config = ClientConfig { bind_address: "nowhere".to_string(), ..config(60) };
    let token = token(SocketAddr::from(([127, 0, 0, 1], 40000)), 5);

    let err = Client::new(SystemEnv::new(), engine, config).run(&token).await.expect_err("bind");

    assert!(matches!(err, ClientError::Engine(EngineError::InvalidBindAddress { .. })));
    assert_eq!(err.exit_code(), EXIT_FAILURE);
}
