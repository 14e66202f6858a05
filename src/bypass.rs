//! Admin API key bypass.

use subtle::ConstantTimeEq;

/// Reason recorded when the admin key short-circuits verification.
pub const BYPASS_REASON: &str = "bypass_api_key";

/// True only when a non-empty configured key equals the presented one.
pub fn evaluate(configured: &str, presented: &str) -> bool {
    if configured.is_empty() {
        return false;
    }
    configured.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Admin key holder checked before any credential lookup.
#[derive(Clone, Default)]
pub struct BypassEvaluator {
    admin_key: Option<String>,
}

impl BypassEvaluator {
    /// Blank keys disable the bypass.
    pub fn new(admin_key: Option<String>) -> Self {
        Self {
            admin_key: admin_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.admin_key.is_some()
    }

    pub fn matches(&self, presented: Option<&str>) -> bool {
        match (&self.admin_key, presented) {
            (Some(key), Some(presented)) => evaluate(key, presented),
            _ => false,
        }
    }
}

impl std::fmt::Debug for BypassEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BypassEvaluator")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
