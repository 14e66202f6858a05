//! Property-Based Tests
//!
//! Uses proptest for invariant verification; each property runs at least
//! 100 cases.
//!
//! - verification: key binding, identity requirement, idempotence, bypass precedence
//! - cookies: parser tolerance
//! - codec: SPOP varint and typed-data decoding

#[path = "../support/mod.rs"]
mod support;

mod cookies;
mod generators;
