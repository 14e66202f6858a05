//! Token verification failures.
//!
//! Every failure carries a stable short code for callers that need a fixed
//! vocabulary, while `Display` keeps the descriptive text the SPOE front end
//! propagates as a diagnostic.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Reason a token was rejected.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// Nothing to verify after trimming.
    #[error("token is empty")]
    Empty,

    /// Token structure could not be decoded
    #[error("token malformed: {reason}")]
    Malformed {
        /// Description of the malformation
        reason: String,
    },

    /// Header is not `v4.public.`
    #[error("unsupported token header, expected v4.public")]
    UnsupportedHeader,

    /// Ed25519 signature did not verify against the configured key
    #[error("bad signature")]
    BadSignature,

    /// Signed payload is not a JSON claims object
    #[error("invalid token payload: {reason}")]
    InvalidPayload {
        /// Parser error text
        reason: String,
    },

    /// A registered claim has the wrong type or format
    #[error("invalid claim '{claim}': {reason}")]
    InvalidClaim {
        /// Claim name
        claim: String,
        /// What was wrong with it
        reason: String,
    },

    /// Time checks are enabled and the token has no `exp` claim
    #[error("token has no expiration")]
    MissingExpiry,

    /// `exp` is in the past
    #[error("token expired at {expired_at}")]
    Expired {
        /// Value of the exp claim
        expired_at: DateTime<Utc>,
    },

    /// `nbf` is in the future
    #[error("token not valid until {valid_from}")]
    NotYetValid {
        /// Value of the nbf claim
        valid_from: DateTime<Utc>,
    },

    /// `iat` is in the future
    #[error("token issued in the future at {issued_at}")]
    IssuedInFuture {
        /// Value of the iat claim
        issued_at: DateTime<Utc>,
    },

    /// `aud` differs from the required audience
    #[error("token audience does not match, expected '{expected}'")]
    AudienceMismatch {
        /// Required audience
        expected: String,
    },

    /// `iss` differs from the required issuer
    #[error("token issuer does not match, expected '{expected}'")]
    IssuerMismatch {
        /// Required issuer
        expected: String,
    },

    /// Neither the identity claim nor `sub` carried a value
    #[error("missing identity claim")]
    MissingIdentity,
}

impl VerificationError {
    /// Stable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Empty => "missing_token",
            Self::Malformed { .. } => "malformed_token",
            Self::UnsupportedHeader => "unsupported_token",
            Self::BadSignature => "bad_signature",
            Self::InvalidPayload { .. } | Self::InvalidClaim { .. } => "invalid_claims",
            Self::MissingExpiry => "missing_expiry",
            Self::Expired { .. } => "expired",
            Self::NotYetValid { .. } => "not_yet_valid",
            Self::IssuedInFuture { .. } => "issued_in_future",
            Self::AudienceMismatch { .. } => "audience_mismatch",
            Self::IssuerMismatch { .. } => "issuer_mismatch",
            Self::MissingIdentity => "missing_identity",
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_claim(claim: &str, reason: impl Into<String>) -> Self {
        Self::InvalidClaim {
            claim: claim.to_string(),
            reason: reason.into(),
        }
    }
}
