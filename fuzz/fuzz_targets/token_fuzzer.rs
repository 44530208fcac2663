//! Fuzz target for connect token loading and parsing
//!
//! # Strategy
//!
//! - Text input: arbitrary strings through the base64 loader
//! - Raw input: arbitrary bytes padded or cut to token size through the
//!   public-section parser
//!
//! # Invariants
//!
//! - NEVER panic on malformed input
//! - A loaded token is exactly `CONNECT_TOKEN_BYTES` long
//! - A parsed public section re-encodes to a token that parses back equal

#![no_main]

use arbitrary::Arbitrary;
use echoprobe_proto::{ConnectToken, ConnectTokenInfo, CONNECT_TOKEN_BYTES};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Input<'a> {
    Text(&'a str),
    Raw(&'a [u8]),
}

fuzz_target!(|input: Input<'_>| {
    match input {
        Input::Text(text) => {
            if let Ok(token) = ConnectToken::load(text) {
                assert_eq!(token.as_bytes().len(), CONNECT_TOKEN_BYTES);
                let reloaded = ConnectToken::load(&token.to_base64()).expect("own encoding loads");
                assert_eq!(reloaded, token);
            }
        },
        Input::Raw(bytes) => {
            let mut raw = [0u8; CONNECT_TOKEN_BYTES];
            let used = bytes.len().min(CONNECT_TOKEN_BYTES);
            raw[..used].copy_from_slice(&bytes[..used]);
            let token = ConnectToken::from(raw);

            if let Ok(info) = ConnectTokenInfo::parse(&token) {
                let rebuilt = info.to_token().expect("parsed info re-encodes");
                let reparsed = ConnectTokenInfo::parse(&rebuilt).expect("re-encoded token parses");
                assert_eq!(reparsed, info);
            }
        },
    }
});
