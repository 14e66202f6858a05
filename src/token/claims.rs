use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::token::error::VerificationError;

/// Claims carried in a verified PASETO payload.
///
/// Registered claims are kept in the same JSON object as custom claims; the
/// typed accessors below read them by their reserved names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims {
    inner: Map<String, Value>,
}

impl Claims {
    pub const ISSUER: &'static str = "iss";
    pub const SUBJECT: &'static str = "sub";
    pub const AUDIENCE: &'static str = "aud";
    pub const EXPIRATION: &'static str = "exp";
    pub const NOT_BEFORE: &'static str = "nbf";
    pub const ISSUED_AT: &'static str = "iat";
    pub const TOKEN_ID: &'static str = "jti";

    pub fn from_json(payload: &[u8]) -> Result<Self, VerificationError> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| VerificationError::InvalidPayload {
                reason: e.to_string(),
            })?;

        match value {
            Value::Object(inner) => Ok(Self { inner }),
            _ => Err(VerificationError::InvalidPayload {
                reason: "payload is not a JSON object".to_string(),
            }),
        }
    }

    /// Reads a claim as a string; other JSON types count as absent.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.inner.get(name).and_then(Value::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.inner.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.get_str(Self::ISSUER)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get_str(Self::SUBJECT)
    }

    pub fn audience(&self) -> Option<&str> {
        self.get_str(Self::AUDIENCE)
    }

    pub fn expiration(&self) -> Result<Option<DateTime<Utc>>, VerificationError> {
        self.time_claim(Self::EXPIRATION)
    }

    pub fn not_before(&self) -> Result<Option<DateTime<Utc>>, VerificationError> {
        self.time_claim(Self::NOT_BEFORE)
    }

    pub fn issued_at(&self) -> Result<Option<DateTime<Utc>>, VerificationError> {
        self.time_claim(Self::ISSUED_AT)
    }

    /// PASETO time claims are RFC 3339 strings.
    fn time_claim(&self, name: &str) -> Result<Option<DateTime<Utc>>, VerificationError> {
        let Some(value) = self.inner.get(name) else {
            return Ok(None);
        };
        let text = value
            .as_str()
            .ok_or_else(|| VerificationError::invalid_claim(name, "expected an RFC 3339 string"))?;
        DateTime::parse_from_rfc3339(text)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| VerificationError::invalid_claim(name, e.to_string()))
    }
}
