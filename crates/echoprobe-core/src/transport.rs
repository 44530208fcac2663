//! Datagram transport abstraction.
//!
//! The UDP session state machine only needs to push and pull whole
//! datagrams without blocking. Production binds Tokio sockets; the harness
//! hands out Turmoil sockets so the same state machine runs inside a
//! deterministic simulated network.

use std::{io, net::SocketAddr};

/// Non-blocking datagram socket.
///
/// Both operations return [`io::ErrorKind::WouldBlock`] instead of waiting.
pub trait DatagramSocket {
    /// Send one datagram to `target`.
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// Receive one datagram into `buf`.
    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Address the socket is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Source of bound sockets for client sessions.
pub trait Transport {
    /// Socket handed to each session.
    type Socket: DatagramSocket;

    /// Bind a socket on `addr` (port 0 picks an ephemeral port).
    fn bind(&mut self, addr: SocketAddr) -> io::Result<Self::Socket>;
}
