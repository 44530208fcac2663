//! Connect tokens for tests.
//!
//! Real tokens come from a backend that encrypts the private section. Tests
//! only need the public section to be well formed, so the private section is
//! filled with a recognizable pattern.

use std::net::SocketAddr;

use echoprobe_proto::{
    ConnectToken, ConnectTokenInfo, TokenInfoError,
    constants::{CONNECT_TOKEN_NONCE_BYTES, CONNECT_TOKEN_PRIVATE_BYTES, KEY_BYTES},
};

use crate::server::SERVER_PORT;

/// Protocol id used by test tokens unless overridden.
pub const TEST_PROTOCOL_ID: u64 = 0x1122_3344_5566_7788;

/// Builder for well-formed test tokens.
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    protocol_id: u64,
    create_timestamp: u64,
    lifetime_seconds: u64,
    timeout_seconds: i32,
    server_addresses: Vec<SocketAddr>,
}

impl TestTokenBuilder {
    /// Token for a single server with a 30 s lifetime and a 5 s timeout.
    pub fn new(server: SocketAddr) -> Self {
        Self {
            protocol_id: TEST_PROTOCOL_ID,
            create_timestamp: 1_700_000_000,
            lifetime_seconds: 30,
            timeout_seconds: 5,
            server_addresses: vec![server],
        }
    }

    /// Token for the conventional local test server address.
    pub fn localhost() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], SERVER_PORT)))
    }

    /// Override the protocol id.
    #[must_use]
    pub const fn protocol_id(mut self, protocol_id: u64) -> Self {
        self.protocol_id = protocol_id;
        self
    }

    /// Seconds between creation and expiry.
    #[must_use]
    pub const fn lifetime(mut self, seconds: u64) -> Self {
        self.lifetime_seconds = seconds;
        self
    }

    /// Connection timeout; negative disables it.
    #[must_use]
    pub const fn timeout(mut self, seconds: i32) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Append a fallback server.
    #[must_use]
    pub fn server(mut self, server: SocketAddr) -> Self {
        self.server_addresses.push(server);
        self
    }

    /// Replace the server list.
    #[must_use]
    pub fn servers(mut self, servers: Vec<SocketAddr>) -> Self {
        self.server_addresses = servers;
        self
    }

    /// Public section this builder describes.
    pub fn info(&self) -> ConnectTokenInfo {
        ConnectTokenInfo {
            protocol_id: self.protocol_id,
            create_timestamp: self.create_timestamp,
            expire_timestamp: self.create_timestamp.saturating_add(self.lifetime_seconds),
            nonce: [0x4e; CONNECT_TOKEN_NONCE_BYTES],
            private_data: Box::new([0x50; CONNECT_TOKEN_PRIVATE_BYTES]),
            timeout_seconds: self.timeout_seconds,
            server_addresses: self.server_addresses.clone(),
            client_to_server_key: [0xc5; KEY_BYTES],
            server_to_client_key: [0x5c; KEY_BYTES],
        }
    }

    /// Serialize to a full-size token.
    pub fn build(&self) -> Result<ConnectToken, TokenInfoError> {
        self.info().to_token()
    }

    /// Serialize to base64 text, as passed on the command line.
    pub fn build_base64(&self) -> Result<String, TokenInfoError> {
        self.build().map(|token| token.to_base64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_token_parses_back() {
        let builder = TestTokenBuilder::localhost().timeout(7).lifetime(60);
        let token = builder.build().expect("build");
        let info = ConnectTokenInfo::parse(&token).expect("parse");
        assert_eq!(info, builder.info());
        assert_eq!(info.timeout_seconds, 7);
        assert_eq!(info.expire_timestamp - info.create_timestamp, 60);
    }

    #[test]
    fn servers_replace_the_list() {
        let fallback = SocketAddr::from(([10, 0, 0, 2], 9));
        let builder = TestTokenBuilder::localhost()
            .server(fallback)
            .servers(vec![fallback])
            .protocol_id(0xdead);
        let info = builder.info();
        assert_eq!(info.server_addresses, vec![fallback]);
        assert_eq!(info.protocol_id, 0xdead);
    }

    #[test]
    fn base64_form_loads() {
        let text = TestTokenBuilder::localhost().build_base64().expect("build");
        assert!(ConnectToken::load(&text).is_ok());
    }
}
