//! Credential location across transports.
//!
//! Front ends expose their request fields through [`FieldSource`]; the
//! [`CredentialLocator`] walks a prioritized list of [`CredentialSource`]s and
//! returns the first non-empty token it finds.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::token::strip_bearer;

/// Field carrying a raw `Cookie` header value.
pub const COOKIE_FIELD: &str = "cookie";

/// Case-sensitive prefix required by [`CredentialSource::BearerField`].
pub const BEARER_PREFIX: &str = "Bearer ";

/// Read access to named string fields of one request.
pub trait FieldSource {
    /// Value of a header or argument, if present and textual.
    fn field(&self, name: &str) -> Option<Cow<'_, str>>;

    /// Value of a named cookie. The default parses the [`COOKIE_FIELD`]
    /// field; transports with a native cookie accessor override it.
    fn cookie(&self, name: &str) -> Option<Cow<'_, str>> {
        let header = self.field(COOKIE_FIELD)?;
        parse_cookies(&header).remove(name).map(Cow::Owned)
    }
}

impl FieldSource for HashMap<String, String> {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

/// Parses a `Cookie` header into name/value pairs.
///
/// Segments are split on `;` and then on the first `=`, with both sides
/// trimmed. Empty segments and segments without `=` are skipped; a repeated
/// name keeps its last value.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Where a credential may be found, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Field that must literally start with `Bearer `; anything else is
    /// treated as absent.
    BearerField(String),
    /// Authorization-style field used as-is, with an optional `Bearer `
    /// prefix of any case.
    AuthorizationField(String),
    /// Named cookie, read through [`FieldSource::cookie`].
    Cookie(String),
}

/// Diagnostic tag recording where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTag {
    BearerHeader,
    AuthorizationHeader,
    SessionCookie,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BearerHeader => "bearer_header",
            Self::AuthorizationHeader => "authorization_header",
            Self::SessionCookie => "session_cookie",
        }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token string extracted from a transport, plus its origin.
#[derive(Clone, PartialEq, Eq)]
pub struct RawCredential {
    pub token: String,
    pub source: SourceTag,
}

impl std::fmt::Debug for RawCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawCredential")
            .field("token_len", &self.token.len())
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CredentialLocator {
    sources: Vec<CredentialSource>,
}

impl CredentialLocator {
    pub fn new(sources: Vec<CredentialSource>) -> Self {
        Self { sources }
    }

    /// First non-empty credential in priority order. A value that is only
    /// whitespace still counts as present and is left for the verifier to
    /// reject.
    pub fn locate<F: FieldSource + ?Sized>(&self, fields: &F) -> Option<RawCredential> {
        self.sources.iter().find_map(|source| match source {
            CredentialSource::BearerField(name) => {
                let value = fields.field(name)?;
                let token = value.strip_prefix(BEARER_PREFIX)?;
                non_empty(token, SourceTag::BearerHeader)
            }
            CredentialSource::AuthorizationField(name) => {
                let value = fields.field(name).filter(|v| !v.is_empty())?;
                Some(RawCredential {
                    token: strip_bearer(&value).to_string(),
                    source: SourceTag::AuthorizationHeader,
                })
            }
            CredentialSource::Cookie(name) => {
                let value = fields.cookie(name)?;
                non_empty(&value, SourceTag::SessionCookie)
            }
        })
    }
}

fn non_empty(token: &str, source: SourceTag) -> Option<RawCredential> {
    if token.is_empty() {
        return None;
    }
    Some(RawCredential {
        token: token.to_string(),
        source,
    })
}
