//! Shared test helpers: Ed25519 signing of `v4.public` tokens.

#![allow(dead_code)]

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{Value, json};

use spoe_auth::token::paseto::{HEADER, pre_auth_encode};
use spoe_auth::token::{TokenVerifier, VerifierConfig};

/// Key pair that issues tokens for tests.
pub struct TestSigner {
    pair: Ed25519KeyPair,
}

impl TestSigner {
    pub fn generate() -> Self {
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new()).unwrap();
        Self {
            pair: Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap(),
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            pair: Ed25519KeyPair::from_seed_unchecked(&seed).unwrap(),
        }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.pair.public_key().as_ref())
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig::from_hex(&self.public_key_hex()).unwrap()
    }

    pub fn verifier(&self) -> Arc<TokenVerifier> {
        Arc::new(TokenVerifier::new(self.verifier_config()))
    }

    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_footer(claims, b"")
    }

    pub fn sign_with_footer(&self, claims: &Value, footer: &[u8]) -> String {
        let message = serde_json::to_vec(claims).unwrap();
        let pae = pre_auth_encode(&[HEADER.as_bytes(), &message, footer, b""]);
        let mut body = message;
        body.extend_from_slice(self.pair.sign(&pae).as_ref());

        let mut token = format!("{HEADER}{}", URL_SAFE_NO_PAD.encode(body));
        if !footer.is_empty() {
            token.push('.');
            token.push_str(&URL_SAFE_NO_PAD.encode(footer));
        }
        token
    }
}

/// Claims valid for the next hour, identifying `user`.
pub fn valid_claims(user: &str) -> Value {
    let now = Utc::now();
    json!({
        "userId": user,
        "sub": format!("sub-{user}"),
        "iat": now.to_rfc3339(),
        "nbf": now.to_rfc3339(),
        "exp": (now + Duration::hours(1)).to_rfc3339(),
    })
}

/// Claims that expired an hour ago.
pub fn expired_claims(user: &str) -> Value {
    let now = Utc::now();
    json!({
        "userId": user,
        "iat": (now - Duration::hours(2)).to_rfc3339(),
        "exp": (now - Duration::hours(1)).to_rfc3339(),
    })
}
