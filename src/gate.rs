//! Bypass, locate and verify, shared by both front ends.
//!
//! Each front end builds one [`AuthGate`] describing where its transport
//! keeps the admin key and the credential, then renders the resulting
//! [`GateDecision`] in its own wire format.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::bypass::BypassEvaluator;
use crate::credential::{CredentialLocator, FieldSource, SourceTag};
use crate::observability::AuthMetrics;
use crate::token::{TokenVerifier, VerificationError, VerificationOutcome};

/// Front end a gate serves, used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frontend {
    Http,
    Spoe,
}

impl Frontend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Spoe => "spoe",
        }
    }
}

/// Outcome of one pass through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Admin key matched; no token was inspected.
    Bypassed,
    /// No credential in any configured location.
    MissingToken,
    Accepted {
        identity: String,
        source: SourceTag,
    },
    Rejected {
        error: VerificationError,
        source: SourceTag,
    },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Bypassed | Self::Accepted { .. })
    }

    /// Low-cardinality label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bypassed => "bypass",
            Self::MissingToken => "missing_token",
            Self::Accepted { .. } => "accepted",
            Self::Rejected { .. } => "rejected",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthGate {
    frontend: Frontend,
    verifier: Arc<TokenVerifier>,
    bypass: BypassEvaluator,
    bypass_field: String,
    locator: CredentialLocator,
    metrics: Option<Arc<AuthMetrics>>,
}

impl AuthGate {
    pub fn new(
        frontend: Frontend,
        verifier: Arc<TokenVerifier>,
        bypass: BypassEvaluator,
        bypass_field: impl Into<String>,
        locator: CredentialLocator,
    ) -> Self {
        Self {
            frontend,
            verifier,
            bypass,
            bypass_field: bypass_field.into(),
            locator,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<AuthMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn decide<F: FieldSource + ?Sized>(&self, fields: &F) -> GateDecision {
        let decision = self.evaluate(fields);
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(self.frontend.as_str(), decision.label());
        }
        decision
    }

    fn evaluate<F: FieldSource + ?Sized>(&self, fields: &F) -> GateDecision {
        if self.bypass.is_enabled() {
            let presented = fields.field(&self.bypass_field);
            if self.bypass.matches(presented.as_deref()) {
                debug!(frontend = self.frontend.as_str(), "admin API key bypass");
                return GateDecision::Bypassed;
            }
        }

        let Some(credential) = self.locator.locate(fields) else {
            debug!(frontend = self.frontend.as_str(), "no token found");
            return GateDecision::MissingToken;
        };
        debug!(
            frontend = self.frontend.as_str(),
            source = %credential.source,
            token_len = credential.token.len(),
            "token located"
        );

        let started = Instant::now();
        let outcome = self.verifier.verify(&credential.token);
        if let Some(metrics) = &self.metrics {
            metrics.observe_verify(started.elapsed());
        }

        match outcome {
            VerificationOutcome::Accepted { identity } => GateDecision::Accepted {
                identity,
                source: credential.source,
            },
            VerificationOutcome::Rejected { error } => GateDecision::Rejected {
                error,
                source: credential.source,
            },
        }
    }
}
