//! SPOE Auth Service - PASETO v4.public gatekeeper.
//!
//! Verifies Ed25519-signed PASETO tokens for a reverse proxy, either as an
//! HTTP `/check` endpoint or as a HAProxy SPOE agent that writes the decision
//! into transaction variables. Both front ends share one [`gate::AuthGate`]
//! pipeline: admin key bypass, credential location, token verification.

#![forbid(unsafe_code)]

pub mod bypass;
pub mod config;
pub mod credential;
pub mod error;
pub mod gate;
pub mod http;
pub mod observability;
pub mod shutdown;
pub mod spoe;
pub mod token;

pub use config::{Config, Mode};
pub use error::{ErrorCode, GatekeeperError};
pub use gate::{AuthGate, Frontend, GateDecision};
pub use token::{TokenVerifier, VerificationError, VerificationOutcome, VerifierConfig};
