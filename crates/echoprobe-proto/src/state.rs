//! Client lifecycle states.
//!
//! States are ranked. Negative ranks are failures, zero is a plain
//! disconnect, positive ranks are the handshake in progress and finally
//! `Connected`. Anything at or below `Disconnected` is terminal: no packet
//! exchange happens from there.

use std::{cmp::Ordering, fmt};

/// Observable state of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum ClientState {
    /// The token expired before a connection was established.
    ConnectTokenExpired = -6,
    /// The token could not be parsed or was inconsistent.
    InvalidConnectToken = -5,
    /// An established connection stopped hearing from the server.
    ConnectionTimedOut = -4,
    /// The server never accepted our challenge response.
    ConnectionResponseTimedOut = -3,
    /// The server never answered our connection request.
    ConnectionRequestTimedOut = -2,
    /// The server refused the connection.
    ConnectionDenied = -1,
    /// Not connected; initial state and clean disconnect.
    Disconnected = 0,
    /// Handshake step one: repeating the connection request.
    SendingConnectionRequest = 1,
    /// Handshake step two: repeating the challenge response.
    SendingConnectionResponse = 2,
    /// Connected; payload packets may flow.
    Connected = 3,
}

impl ClientState {
    /// Every state, ordered by rank.
    pub const ALL: [Self; 10] = [
        Self::ConnectTokenExpired,
        Self::InvalidConnectToken,
        Self::ConnectionTimedOut,
        Self::ConnectionResponseTimedOut,
        Self::ConnectionRequestTimedOut,
        Self::ConnectionDenied,
        Self::Disconnected,
        Self::SendingConnectionRequest,
        Self::SendingConnectionResponse,
        Self::Connected,
    ];

    /// Numeric rank of the state.
    pub const fn rank(self) -> i8 {
        self as i8
    }

    /// Look up a state by rank.
    pub fn from_rank(rank: i8) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.rank() == rank)
    }

    /// True when no further packet exchange will happen.
    pub const fn is_terminal(self) -> bool {
        self.rank() <= Self::Disconnected.rank()
    }

    /// True for terminal states caused by a failure rather than a disconnect.
    pub const fn is_failure(self) -> bool {
        self.rank() < Self::Disconnected.rank()
    }

    /// True while the handshake is in progress.
    pub const fn is_connecting(self) -> bool {
        matches!(self, Self::SendingConnectionRequest | Self::SendingConnectionResponse)
    }

    /// Short label used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectTokenExpired => "connect token expired",
            Self::InvalidConnectToken => "invalid connect token",
            Self::ConnectionTimedOut => "connection timed out",
            Self::ConnectionResponseTimedOut => "connection response timed out",
            Self::ConnectionRequestTimedOut => "connection request timed out",
            Self::ConnectionDenied => "connection denied",
            Self::Disconnected => "disconnected",
            Self::SendingConnectionRequest => "sending connection request",
            Self::SendingConnectionResponse => "sending connection response",
            Self::Connected => "connected",
        }
    }
}

impl PartialOrd for ClientState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClientState {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
