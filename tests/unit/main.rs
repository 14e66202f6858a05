//! Unit Tests
//!
//! - verifier: signed-token outcomes and identity extraction
//! - gate: bypass, locate and verify ordering per front end
//! - spoe: NOTIFY handling and ACK payloads
//! - http: router responses

#[path = "../support/mod.rs"]
mod support;

mod http;
