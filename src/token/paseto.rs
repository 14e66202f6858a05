//! Type-state PASETO `v4.public` token.
//!
//! A token moves from `Unvalidated` (structurally decoded) through
//! `SignatureValidated` (Ed25519 signature checked, payload parsed) to
//! `Validated` (time, audience and issuer rules applied). Claims are only
//! readable once the signature has been checked.

use std::marker::PhantomData;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};

use crate::token::claims::Claims;
use crate::token::error::VerificationError;
use crate::token::key::PublicKey;

/// Version and purpose prefix of every accepted token.
pub const HEADER: &str = "v4.public.";

/// Ed25519 signature length appended to the message.
pub const SIGNATURE_LEN: usize = 64;

/// PASETO pre-authentication encoding.
///
/// `LE64(n) || LE64(len(p0)) || p0 || ... ` with the top bit of every length
/// cleared.
pub fn pre_auth_encode(pieces: &[&[u8]]) -> Vec<u8> {
    fn le64(n: usize) -> [u8; 8] {
        ((n as u64) & (u64::MAX >> 1)).to_le_bytes()
    }

    let capacity = 8 + pieces.iter().map(|p| 8 + p.len()).sum::<usize>();
    let mut out = Vec::with_capacity(capacity);
    out.extend_from_slice(&le64(pieces.len()));
    for piece in pieces {
        out.extend_from_slice(&le64(piece.len()));
        out.extend_from_slice(piece);
    }
    out
}

mod private {
    pub trait Sealed {}
}

/// Marker trait for token validation states
pub trait TokenState: private::Sealed {
    fn state_name() -> &'static str;
}

/// Decoded, nothing verified
#[derive(Debug)]
pub struct Unvalidated;
impl private::Sealed for Unvalidated {}
impl TokenState for Unvalidated {
    fn state_name() -> &'static str {
        "Unvalidated"
    }
}

/// Signature verified, claims parsed but not checked
#[derive(Debug)]
pub struct SignatureValidated;
impl private::Sealed for SignatureValidated {}
impl TokenState for SignatureValidated {
    fn state_name() -> &'static str {
        "SignatureValidated"
    }
}

/// Signature and claim rules verified
#[derive(Debug)]
pub struct Validated;
impl private::Sealed for Validated {}
impl TokenState for Validated {
    fn state_name() -> &'static str {
        "Validated"
    }
}

/// Claim rules applied after the signature check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimRules {
    /// Enforce `exp`, `nbf` and `iat` against the clock.
    pub check_time: bool,
    /// Exact `aud` value required.
    pub audience: Option<String>,
    /// Exact `iss` value required.
    pub issuer: Option<String>,
}

#[derive(Debug)]
pub struct Token<State: TokenState> {
    message: Vec<u8>,
    signature: Vec<u8>,
    footer: Vec<u8>,
    claims: Claims,
    _state: PhantomData<State>,
}

impl Token<Unvalidated> {
    /// Decodes `v4.public.<payload>[.<footer>]` without checking anything
    /// cryptographic.
    pub fn parse(raw: &str) -> Result<Self, VerificationError> {
        if raw.is_empty() {
            return Err(VerificationError::Empty);
        }

        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() < 3 {
            return Err(VerificationError::malformed("expected at least 3 segments"));
        }
        if parts.len() > 4 {
            return Err(VerificationError::malformed("too many segments"));
        }
        if parts[0] != "v4" || parts[1] != "public" {
            return Err(VerificationError::UnsupportedHeader);
        }

        let body = URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|e| VerificationError::malformed(format!("payload encoding: {e}")))?;
        if body.len() < SIGNATURE_LEN {
            return Err(VerificationError::malformed("payload shorter than signature"));
        }

        let footer = match parts.get(3) {
            Some(f) => URL_SAFE_NO_PAD
                .decode(f)
                .map_err(|e| VerificationError::malformed(format!("footer encoding: {e}")))?,
            None => Vec::new(),
        };

        let (message, signature) = body.split_at(body.len() - SIGNATURE_LEN);

        Ok(Token {
            message: message.to_vec(),
            signature: signature.to_vec(),
            footer,
            claims: Claims::default(),
            _state: PhantomData,
        })
    }

    /// Raw footer bytes; empty when the token has none.
    pub fn footer(&self) -> &[u8] {
        &self.footer
    }

    /// Verifies the signature over `PAE(header, message, footer, "")` and
    /// parses the payload.
    pub fn verify_signature(
        self,
        key: &PublicKey,
    ) -> Result<Token<SignatureValidated>, VerificationError> {
        let pae = pre_auth_encode(&[HEADER.as_bytes(), &self.message, &self.footer, b""]);
        if !key.verify(&pae, &self.signature) {
            return Err(VerificationError::BadSignature);
        }

        let claims = Claims::from_json(&self.message)?;

        Ok(Token {
            message: self.message,
            signature: self.signature,
            footer: self.footer,
            claims,
            _state: PhantomData,
        })
    }
}

impl Token<SignatureValidated> {
    /// Applies `rules` at instant `now`.
    pub fn validate_claims(
        self,
        rules: &ClaimRules,
        now: DateTime<Utc>,
    ) -> Result<Token<Validated>, VerificationError> {
        if rules.check_time {
            let expired_at = self
                .claims
                .expiration()?
                .ok_or(VerificationError::MissingExpiry)?;
            if now > expired_at {
                return Err(VerificationError::Expired { expired_at });
            }
            if let Some(valid_from) = self.claims.not_before()? {
                if now < valid_from {
                    return Err(VerificationError::NotYetValid { valid_from });
                }
            }
            if let Some(issued_at) = self.claims.issued_at()? {
                if now < issued_at {
                    return Err(VerificationError::IssuedInFuture { issued_at });
                }
            }
        }

        if let Some(expected) = &rules.audience {
            if self.claims.audience() != Some(expected.as_str()) {
                return Err(VerificationError::AudienceMismatch {
                    expected: expected.clone(),
                });
            }
        }

        if let Some(expected) = &rules.issuer {
            if self.claims.issuer() != Some(expected.as_str()) {
                return Err(VerificationError::IssuerMismatch {
                    expected: expected.clone(),
                });
            }
        }

        Ok(Token {
            message: self.message,
            signature: self.signature,
            footer: self.footer,
            claims: self.claims,
            _state: PhantomData,
        })
    }
}

impl Token<Validated> {
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn footer(&self) -> &[u8] {
        &self.footer
    }
}

impl<S: TokenState> Token<S> {
    pub fn state_name(&self) -> &'static str {
        S::state_name()
    }
}
