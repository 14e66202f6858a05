//! Ed25519 public key used to verify `v4.public` tokens.

use curve25519_dalek::edwards::CompressedEdwardsY;
use ring::signature::{ED25519, UnparsedPublicKey};
use thiserror::Error;

/// Length of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Public key parsing failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Input is not hexadecimal
    #[error("public key is not valid hex: {0}")]
    InvalidHex(String),

    /// Decoded key is not 32 bytes
    #[error("public key must be {PUBLIC_KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),

    /// Bytes do not decode to a curve point
    #[error("public key is not a valid Ed25519 point")]
    InvalidPoint,
}

/// A validated Ed25519 public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    bytes: [u8; PUBLIC_KEY_LEN],
}

impl PublicKey {
    /// Parses a key from raw bytes, rejecting wrong lengths and non-points.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; PUBLIC_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;

        if CompressedEdwardsY(bytes).decompress().is_none() {
            return Err(KeyError::InvalidPoint);
        }

        Ok(Self { bytes })
    }

    /// Parses a hex-encoded key, ignoring surrounding whitespace.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let raw = hex::decode(hex_str.trim()).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&raw)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.bytes
    }

    /// Checks an Ed25519 signature over `message`.
    pub(crate) fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        UnparsedPublicKey::new(&ED25519, &self.bytes)
            .verify(message, signature)
            .is_ok()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PublicKey")
            .field(&hex::encode(self.bytes))
            .finish()
    }
}
