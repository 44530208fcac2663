//! Connection engine interface and scoped ownership guards.
//!
//! The engine owns everything below the session loop: handshake, packet
//! encryption, keep-alives, timeouts, sockets. The loop only sees a small
//! poll-style surface.
//!
//! ```text
//! EngineHandle<E>            terminate() on drop
//!   └─ ClientSession<S>      destroy() on drop, exactly once
//!        ├─ connect(token)
//!        ├─ service(time)
//!        ├─ state()
//!        ├─ send_packet(bytes)
//!        ├─ try_receive() -> ReceivedPacket
//!        └─ release_packet(packet)
//! ```
//!
//! Sessions must be dropped before the engine handle. Declaring the session
//! after the handle in the same scope gives that order for free.

use bytes::Bytes;
use echoprobe_proto::{ClientState, ConnectToken};
use thiserror::Error;

/// Errors from engine setup.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine-wide initialization failed.
    #[error("failed to initialize connection engine: {reason}")]
    Init {
        /// Description of the failure.
        reason: String,
    },

    /// Bind address could not be parsed.
    #[error("invalid bind address {address:?}: {reason}")]
    InvalidBindAddress {
        /// Address as given.
        address: String,
        /// Parser message.
        reason: String,
    },

    /// Session could not be created.
    #[error("failed to create client session: {0}")]
    CreateSession(#[from] std::io::Error),
}

/// A packet the engine handed out.
///
/// The engine keeps ownership of the underlying buffer until the packet goes
/// back through [`EngineSession::release_packet`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "received packets must be released back to the engine"]
pub struct ReceivedPacket {
    /// Sender sequence number.
    pub sequence: u64,
    /// Packet payload.
    pub payload: Bytes,
}

impl ReceivedPacket {
    /// Create a packet.
    pub const fn new(sequence: u64, payload: Bytes) -> Self {
        Self { sequence, payload }
    }

    /// Payload length.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Process-wide engine.
pub trait ConnectionEngine {
    /// Session type produced by this engine.
    type Session: EngineSession;

    /// Create a client session bound to `bind_address` at engine time `time`.
    fn create_session(
        &mut self,
        bind_address: &str,
        time: f64,
    ) -> Result<Self::Session, EngineError>;

    /// Release engine-wide resources. Called exactly once, by
    /// [`EngineHandle`].
    fn terminate(&mut self);
}

/// One client session inside an engine.
///
/// All methods are non-blocking.
pub trait EngineSession {
    /// Start connecting with `token`. The engine takes ownership of it.
    fn connect(&mut self, token: ConnectToken);

    /// Advance the session to engine time `time`: read the socket, progress
    /// the handshake, send keep-alives, fire timeouts.
    fn service(&mut self, time: f64);

    /// Current lifecycle state.
    fn state(&self) -> ClientState;

    /// Queue a payload for the server. Fire-and-forget.
    fn send_packet(&mut self, payload: &[u8]);

    /// Next received payload, `None` once the queue is empty.
    fn try_receive(&mut self) -> Option<ReceivedPacket>;

    /// Return a received packet's buffer to the engine.
    fn release_packet(&mut self, packet: ReceivedPacket);

    /// Tear the session down. Called exactly once, by [`ClientSession`].
    fn destroy(&mut self);
}

/// Scoped owner of an engine; terminates it on drop.
pub struct EngineHandle<E: ConnectionEngine> {
    engine: E,
}

impl<E: ConnectionEngine> EngineHandle<E> {
    /// Take ownership of an initialized engine.
    pub fn new(engine: E) -> Self {
        tracing::debug!("connection engine initialized");
        Self { engine }
    }

    /// Create a session wrapped in its own guard.
    pub fn create_session(
        &mut self,
        bind_address: &str,
        time: f64,
    ) -> Result<ClientSession<E::Session>, EngineError> {
        let session = self.engine.create_session(bind_address, time)?;
        tracing::info!(bind_address, "client session created");
        Ok(ClientSession::new(session, bind_address))
    }
}

impl<E: ConnectionEngine> Drop for EngineHandle<E> {
    fn drop(&mut self) {
        self.engine.terminate();
        tracing::debug!("connection engine terminated");
    }
}

/// Scoped owner of an engine session; destroys it exactly once.
pub struct ClientSession<S: EngineSession> {
    session: S,
    bind_address: String,
    destroyed: bool,
}

impl<S: EngineSession> ClientSession<S> {
    /// Wrap a freshly created session.
    pub fn new(session: S, bind_address: impl Into<String>) -> Self {
        Self { session, bind_address: bind_address.into(), destroyed: false }
    }

    /// Address the session was bound to.
    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    /// Borrow the wrapped engine session.
    pub const fn get_ref(&self) -> &S {
        &self.session
    }

    /// Start connecting with `token`.
    pub fn connect(&mut self, token: ConnectToken) {
        self.session.connect(token);
    }

    /// Advance the session to `time`.
    pub fn service(&mut self, time: f64) {
        self.session.service(time);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.session.state()
    }

    /// Queue a payload.
    pub fn send_packet(&mut self, payload: &[u8]) {
        self.session.send_packet(payload);
    }

    /// Next received payload.
    pub fn try_receive(&mut self) -> Option<ReceivedPacket> {
        self.session.try_receive()
    }

    /// Return a packet to the engine.
    pub fn release_packet(&mut self, packet: ReceivedPacket) {
        self.session.release_packet(packet);
    }

    /// Destroy the session now instead of at end of scope.
    pub fn close(mut self) {
        self.destroy();
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.session.destroy();
            tracing::debug!(bind_address = %self.bind_address, "client session destroyed");
        }
    }
}

impl<S: EngineSession> Drop for ClientSession<S> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    #[derive(Default)]
    struct Calls {
        destroyed: u32,
        terminated: u32,
        released: u32,
        log: Vec<&'static str>,
    }

    struct CountingSession(Rc<RefCell<Calls>>);

    impl EngineSession for CountingSession {
        fn connect(&mut self, _token: ConnectToken) {}
        fn service(&mut self, _time: f64) {}
        fn state(&self) -> ClientState {
            ClientState::Disconnected
        }
        fn send_packet(&mut self, _payload: &[u8]) {}
        fn try_receive(&mut self) -> Option<ReceivedPacket> {
            None
        }
        fn release_packet(&mut self, _packet: ReceivedPacket) {
            self.0.borrow_mut().released += 1;
        }
        fn destroy(&mut self) {
            let mut calls = self.0.borrow_mut();
            calls.destroyed += 1;
            calls.log.push("destroy");
        }
    }

    struct CountingEngine(Rc<RefCell<Calls>>);

    impl ConnectionEngine for CountingEngine {
        type Session = CountingSession;

        fn create_session(&mut self, _bind: &str, _time: f64) -> Result<CountingSession, EngineError> {
            Ok(CountingSession(Rc::clone(&self.0)))
        }

        fn terminate(&mut self) {
            let mut calls = self.0.borrow_mut();
            calls.terminated += 1;
            calls.log.push("terminate");
        }
    }

    #[test]
    fn session_destroyed_once_on_drop() {
        let calls = Rc::new(RefCell::new(Calls::default()));
        {
            let session = ClientSession::new(CountingSession(Rc::clone(&calls)), "0.0.0.0");
            assert_eq!(session.bind_address(), "0.0.0.0");
        }
        assert_eq!(calls.borrow().destroyed, 1);
    }

    #[test]
    fn explicit_close_does_not_double_destroy() {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let session = ClientSession::new(CountingSession(Rc::clone(&calls)), "0.0.0.0");
        session.close();
        assert_eq!(calls.borrow().destroyed, 1);
    }

    #[test]
    fn session_torn_down_before_engine() {
        let calls = Rc::new(RefCell::new(Calls::default()));
        {
            let mut engine = EngineHandle::new(CountingEngine(Rc::clone(&calls)));
            let _session = engine.create_session("0.0.0.0", 0.0).expect("session");
        }
        let calls = calls.borrow();
        assert_eq!(calls.log, vec!["destroy", "terminate"]);
        assert_eq!(calls.terminated, 1);
    }

    #[test]
    fn release_reaches_engine() {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let mut session = ClientSession::new(CountingSession(Rc::clone(&calls)), "0.0.0.0");
        session.release_packet(ReceivedPacket::new(1, Bytes::from_static(b"x")));
        assert_eq!(calls.borrow().released, 1);
    }
}
