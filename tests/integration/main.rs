//! Integration Tests
//!
//! Both front ends over real sockets on 127.0.0.1.
//!
//! - spoe_agent: handshake, NOTIFY/ACK, protocol errors, shutdown
//! - http_server: requests through a bound listener and graceful shutdown

#[path = "../support/mod.rs"]
mod support;

mod http_server;
mod spoe_agent;
