//! Turns NOTIFY messages into transaction variables.

use std::sync::Arc;

use tracing::debug;

use crate::bypass::{BypassEvaluator, BYPASS_REASON};
use crate::config::{ReasonFormat, SpoeSettings};
use crate::credential::{CredentialLocator, CredentialSource, FieldSource};
use crate::gate::{AuthGate, Frontend, GateDecision};
use crate::spoe::message::{Action, Message, VarScope};
use crate::token::TokenVerifier;

pub const VAR_AUTH_OK: &str = "auth_ok";
pub const VAR_REASON: &str = "reason";
pub const VAR_USER_ID: &str = "user_id";

pub const REASON_OK: &str = "ok";
pub const REASON_MESSAGE_NOT_FOUND: &str = "message_not_found";
pub const REASON_MISSING_TOKEN: &str = "missing_token";
pub const REASON_INVALID_MESSAGE: &str = "invalid_message";

/// Cookie read from the `cookie` argument when `auth` carries no token.
pub const SESSION_COOKIE: &str = "hedera-portal-session";

const ADVISORY_ARGS: [&str; 3] = ["method", "path", "host"];
const COOKIE_ARG: &str = "cookie";

/// Gate wired for SPOE: admin key from the API-key argument, token from the
/// auth argument (`Bearer ` required), then the session cookie.
pub fn spoe_gate(
    verifier: Arc<TokenVerifier>,
    admin_api_key: Option<String>,
    settings: &SpoeSettings,
) -> AuthGate {
    AuthGate::new(
        Frontend::Spoe,
        verifier,
        BypassEvaluator::new(admin_api_key),
        settings.api_key_arg.clone(),
        CredentialLocator::new(vec![
            CredentialSource::BearerField(settings.auth_arg.clone()),
            CredentialSource::Cookie(SESSION_COOKIE.to_string()),
        ]),
    )
}

/// Decision variables for one proxy transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionContext {
    pub auth_ok: bool,
    pub reason: String,
    /// Set only when a token was accepted.
    pub user_id: Option<String>,
}

impl TransactionContext {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            auth_ok: false,
            reason: reason.into(),
            user_id: None,
        }
    }

    pub fn from_decision(decision: GateDecision, format: ReasonFormat) -> Self {
        match decision {
            GateDecision::Bypassed => Self {
                auth_ok: true,
                reason: BYPASS_REASON.to_string(),
                user_id: None,
            },
            GateDecision::MissingToken => Self::denied(REASON_MISSING_TOKEN),
            GateDecision::Rejected { error, .. } => Self::denied(match format {
                ReasonFormat::Raw => error.to_string(),
                ReasonFormat::Code => error.code().to_string(),
            }),
            GateDecision::Accepted { identity, .. } => Self {
                auth_ok: true,
                reason: REASON_OK.to_string(),
                user_id: Some(identity),
            },
        }
    }

    /// SET-VAR actions in transaction scope: `auth_ok`, then `user_id` when
    /// present, then `reason`.
    pub fn into_actions(self) -> Vec<Action> {
        let mut actions = Vec::with_capacity(3);
        actions.push(Action::set_var(VarScope::Transaction, VAR_AUTH_OK, self.auth_ok));
        if let Some(user_id) = self.user_id {
            actions.push(Action::set_var(VarScope::Transaction, VAR_USER_ID, user_id));
        }
        actions.push(Action::set_var(VarScope::Transaction, VAR_REASON, self.reason));
        actions
    }
}

/// Handles the configured message of each NOTIFY frame.
#[derive(Debug, Clone)]
pub struct NotifyHandler {
    gate: AuthGate,
    message_name: String,
    auth_arg: String,
    api_key_arg: String,
    reason_format: ReasonFormat,
}

impl NotifyHandler {
    pub fn new(gate: AuthGate, settings: &SpoeSettings) -> Self {
        Self {
            gate,
            message_name: settings.message_name.clone(),
            auth_arg: settings.auth_arg.clone(),
            api_key_arg: settings.api_key_arg.clone(),
            reason_format: settings.reason_format,
        }
    }

    /// Evaluates the first message named like the configured one; other
    /// messages in the frame are ignored.
    pub fn handle(&self, messages: &[Message]) -> TransactionContext {
        let Some(message) = messages.iter().find(|m| m.name == self.message_name) else {
            debug!(expected = %self.message_name, "configured message not in NOTIFY");
            return TransactionContext::denied(REASON_MESSAGE_NOT_FOUND);
        };

        self.log_arguments(message);
        let ctx = TransactionContext::from_decision(self.gate.decide(message), self.reason_format);
        debug!(auth_ok = ctx.auth_ok, reason = %ctx.reason, "transaction evaluated");
        ctx
    }

    fn log_arguments(&self, message: &Message) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        let advisory = |name: &str| message.field(name).map(|v| v.into_owned()).unwrap_or_default();
        debug!(
            method = %advisory(ADVISORY_ARGS[0]),
            path = %advisory(ADVISORY_ARGS[1]),
            host = %advisory(ADVISORY_ARGS[2]),
            has_auth = message.field(&self.auth_arg).is_some(),
            has_api_key = message.field(&self.api_key_arg).is_some(),
            has_cookie = message.field(COOKIE_ARG).is_some(),
            "NOTIFY arguments"
        );
    }
}
