//! Fuzz target for the client session lifecycle
//!
//! # Strategy
//!
//! - The real UDP session over an in-memory link, answered by the harness
//!   echo server acting out any `ServerBehavior`
//! - Event sequences: arbitrary interleavings of service calls (with time
//!   jumps), sends, receive drains, dropped replies and raw datagrams from
//!   the server or a stranger
//!
//! # Invariants
//!
//! - A fresh session starts `Disconnected`
//! - Terminal states are sticky
//! - Delivered payloads are never empty
//! - Every received packet released leaves nothing outstanding

#![no_main]

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    io,
    net::SocketAddr,
    rc::Rc,
    time::Duration,
};

use arbitrary::Arbitrary;
use echoprobe_client::UdpEngine;
use echoprobe_core::{DatagramSocket, EngineHandle, Transport, DELTA_TIME};
use echoprobe_harness::{EchoServer, RecordingEngine, ServerBehavior, TestTokenBuilder};
use echoprobe_proto::{ClientState, Packet, ECHO_PACKET};
use libfuzzer_sys::fuzz_target;

const SERVER: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 40000);
const STRANGER: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 40999);

#[derive(Debug, Arbitrary)]
enum Behavior {
    Echo,
    Silent,
    Deny,
    IgnoreResponse,
    GoSilent(u8),
    Disconnect(u8),
    CorruptEcho(u8),
    TruncateEcho(u8),
}

impl Behavior {
    fn into_server(self) -> ServerBehavior {
        let tenths = |n: u8| Duration::from_millis(u64::from(n) * 100);
        match self {
            Self::Echo => ServerBehavior::Echo,
            Self::Silent => ServerBehavior::Silent,
            Self::Deny => ServerBehavior::Deny,
            Self::IgnoreResponse => ServerBehavior::IgnoreResponse,
            Self::GoSilent(after) => ServerBehavior::GoSilent { after: tenths(after) },
            Self::Disconnect(after) => ServerBehavior::Disconnect { after: tenths(after) },
            Self::CorruptEcho(nth) => ServerBehavior::CorruptEcho { nth: u64::from(nth) + 1 },
            Self::TruncateEcho(nth) => ServerBehavior::TruncateEcho { nth: u64::from(nth) + 1 },
        }
    }
}

#[derive(Debug, Arbitrary)]
enum Event {
    /// Service after skipping this many ticks.
    Service(u8),
    Send,
    Drain,
    /// Lose the oldest reply in flight.
    DropReply,
    /// Raw datagram from the server.
    Inject(Vec<u8>),
    /// Raw datagram from an unknown peer.
    Stray(Vec<u8>),
}

#[derive(Debug, Arbitrary)]
struct Input {
    behavior: Behavior,
    seed: u64,
    timeout: i8,
    lifetime: u8,
    events: Vec<Event>,
}

/// In-memory link: the client's sends are answered by the server at once.
struct Link {
    server: RefCell<EchoServer>,
    now: Cell<Duration>,
    inbound: RefCell<VecDeque<(Vec<u8>, SocketAddr)>>,
    sequence: Cell<u64>,
}

struct LinkSocket(Rc<Link>);

impl DatagramSocket for LinkSocket {
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        if target != SERVER {
            return Ok(buf.len());
        }
        let packet = Packet::decode(buf).expect("client sends valid packets");
        let reply = self.0.server.borrow_mut().respond(packet.packet, self.0.now.get());
        if let Some(reply) = reply {
            let sequence = self.0.sequence.get() + 1;
            self.0.sequence.set(sequence);
            self.0.inbound.borrow_mut().push_back((reply.to_bytes(sequence).to_vec(), SERVER));
        }
        Ok(buf.len())
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (datagram, from) =
            self.0.inbound.borrow_mut().pop_front().ok_or(io::ErrorKind::WouldBlock)?;
        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok((len, from))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], 50000)))
    }
}

struct LinkTransport(Rc<Link>);

impl Transport for LinkTransport {
    type Socket = LinkSocket;

    fn bind(&mut self, _addr: SocketAddr) -> io::Result<LinkSocket> {
        Ok(LinkSocket(Rc::clone(&self.0)))
    }
}

fuzz_target!(|input: Input| {
    let link = Rc::new(Link {
        server: RefCell::new(EchoServer::new(input.behavior.into_server()).seed(input.seed)),
        now: Cell::new(Duration::ZERO),
        inbound: RefCell::default(),
        sequence: Cell::new(0),
    });
    let engine = RecordingEngine::new(UdpEngine::new(LinkTransport(Rc::clone(&link))));
    let stats = engine.stats();

    {
        let mut handle = EngineHandle::new(engine);
        let mut session = handle.create_session("0.0.0.0", 0.0).expect("link always binds");
        assert_eq!(session.state(), ClientState::Disconnected);

        let token = TestTokenBuilder::new(SERVER)
            .timeout(i32::from(input.timeout))
            .lifetime(u64::from(input.lifetime))
            .build()
            .expect("test token");
        session.connect(token);

        let mut ticks = 0u64;
        let mut terminal: Option<ClientState> = None;

        for event in input.events.into_iter().take(4096) {
            match event {
                Event::Service(skip) => {
                    ticks += u64::from(skip) + 1;
                    #[allow(clippy::cast_precision_loss)]
                    let now = ticks as f64 * DELTA_TIME;
                    link.now.set(Duration::from_secs_f64(now));
                    session.service(now);
                },
                Event::Send => session.send_packet(ECHO_PACKET.as_bytes()),
                Event::Drain => {
                    while let Some(packet) = session.try_receive() {
                        assert!(!packet.is_empty());
                        session.release_packet(packet);
                    }
                },
                Event::DropReply => {
                    link.inbound.borrow_mut().pop_front();
                },
                Event::Inject(datagram) => link.inbound.borrow_mut().push_back((datagram, SERVER)),
                Event::Stray(datagram) => link.inbound.borrow_mut().push_back((datagram, STRANGER)),
            }

            let state = session.state();
            if let Some(previous) = terminal {
                assert_eq!(state, previous, "left terminal state {previous}");
            } else if state.is_terminal() {
                terminal = Some(state);
            }
        }

        while let Some(packet) = session.try_receive() {
            session.release_packet(packet);
        }
    }

    let stats = stats.snapshot();
    assert_eq!(stats.sessions_destroyed, 1);
    assert_eq!(stats.engines_terminated, 1);
    assert_eq!(stats.outstanding(), 0);
});
