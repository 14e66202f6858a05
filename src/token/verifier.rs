//! Token verifier shared by both front ends.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::token::error::VerificationError;
use crate::token::key::{KeyError, PublicKey};
use crate::token::paseto::{ClaimRules, Token, Unvalidated};

/// Identity claim read when none is configured.
pub const DEFAULT_IDENTITY_CLAIM: &str = "userId";

/// Immutable verification settings, built once at startup.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Key every token must be signed with
    pub public_key: PublicKey,
    /// Skip exp/nbf/iat checks
    pub ignore_time: bool,
    /// Required `aud`
    pub audience: Option<String>,
    /// Required `iss`
    pub issuer: Option<String>,
    /// Primary identity claim; `sub` is the fallback
    pub identity_claim: String,
}

impl VerifierConfig {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            ignore_time: false,
            audience: None,
            issuer: None,
            identity_claim: DEFAULT_IDENTITY_CLAIM.to_string(),
        }
    }

    /// Builds a config from a hex public key.
    pub fn from_hex(public_key_hex: &str) -> Result<Self, KeyError> {
        PublicKey::from_hex(public_key_hex).map(Self::new)
    }

    #[must_use]
    pub fn with_ignore_time(mut self, ignore: bool) -> Self {
        self.ignore_time = ignore;
        self
    }

    /// Blank values leave the audience unchecked.
    #[must_use]
    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = non_blank(audience);
        self
    }

    /// Blank values leave the issuer unchecked.
    #[must_use]
    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.issuer = non_blank(issuer);
        self
    }

    /// Blank names keep the default claim.
    #[must_use]
    pub fn with_identity_claim(mut self, claim: impl Into<String>) -> Self {
        let claim = claim.into();
        if !claim.trim().is_empty() {
            self.identity_claim = claim.trim().to_string();
        }
        self
    }

    fn rules(&self) -> ClaimRules {
        ClaimRules {
            check_time: !self.ignore_time,
            audience: self.audience.clone(),
            issuer: self.issuer.clone(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Result of verifying one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Accepted { identity: String },
    Rejected { error: VerificationError },
}

impl VerificationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Accepted { identity } => Some(identity),
            Self::Rejected { .. } => None,
        }
    }

    /// Stable code for rejections, `ok` for acceptance.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "ok",
            Self::Rejected { error } => error.code(),
        }
    }
}

impl From<Result<String, VerificationError>> for VerificationOutcome {
    fn from(result: Result<String, VerificationError>) -> Self {
        match result {
            Ok(identity) => Self::Accepted { identity },
            Err(error) => Self::Rejected { error },
        }
    }
}

/// Removes surrounding whitespace and a case-insensitive `Bearer ` prefix.
pub fn strip_bearer(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => raw[7..].trim(),
        _ => raw,
    }
}

/// Verifies `v4.public` tokens against a fixed key and rule set.
///
/// Holds no mutable state, so one instance is shared by every connection.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    config: VerifierConfig,
    rules: ClaimRules,
}

impl TokenVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        let rules = config.rules();
        Self { config, rules }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verifies against the current clock.
    pub fn verify(&self, raw: &str) -> VerificationOutcome {
        self.verify_at(raw, Utc::now())
    }

    /// Verifies as if the clock read `now`.
    pub fn verify_at(&self, raw: &str, now: DateTime<Utc>) -> VerificationOutcome {
        let result = self.try_verify_at(raw, now);
        if let Err(err) = &result {
            debug!(reason = err.code(), error = %err, "token verification failed");
        }
        result.into()
    }

    /// Same as [`verify_at`](Self::verify_at) but as a `Result`.
    pub fn try_verify_at(&self, raw: &str, now: DateTime<Utc>) -> Result<String, VerificationError> {
        debug!(token_len = raw.len(), "verifying token");
        let token = strip_bearer(raw);

        let validated = Token::<Unvalidated>::parse(token)?
            .verify_signature(&self.config.public_key)?
            .validate_claims(&self.rules, now)?;

        let claims = validated.claims();
        [claims.get_str(&self.config.identity_claim), claims.subject()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or(VerificationError::MissingIdentity)
    }
}
