//! HTTP front end.
//!
//! - `/health`: liveness, any method
//! - `/check`: bypass → locate → verify, any method
//! - `/metrics`: Prometheus text exposition
//!
//! Rejections are deliberately opaque: every failure produces the same 401
//! body and the specific reason only reaches the logs.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::bypass::BypassEvaluator;
use crate::credential::{CredentialLocator, CredentialSource, FieldSource};
use crate::error::GatekeeperError;
use crate::gate::{AuthGate, Frontend, GateDecision};
use crate::observability::AuthMetrics;
use crate::token::TokenVerifier;

/// Header carrying the admin key.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Cookie consulted when no Authorization header is present.
pub const SESSION_COOKIE: &str = "session";
/// Body of every 401.
pub const UNAUTHORIZED_MESSAGE: &str = "Invalid or expired token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpState {
    gate: Arc<AuthGate>,
    metrics: Option<Arc<AuthMetrics>>,
}

impl HttpState {
    pub fn new(gate: AuthGate, metrics: Option<Arc<AuthMetrics>>) -> Self {
        Self {
            gate: Arc::new(gate),
            metrics,
        }
    }
}

/// Gate wired for HTTP: admin key from `X-API-Key`, token from the
/// Authorization header, then the `session` cookie.
pub fn http_gate(verifier: Arc<TokenVerifier>, admin_api_key: Option<String>) -> AuthGate {
    AuthGate::new(
        Frontend::Http,
        verifier,
        BypassEvaluator::new(admin_api_key),
        API_KEY_HEADER,
        CredentialLocator::new(vec![
            CredentialSource::AuthorizationField(AUTHORIZATION.as_str().to_string()),
            CredentialSource::Cookie(SESSION_COOKIE.to_string()),
        ]),
    )
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/health", any(health))
        .route("/check", any(check))
        .route("/metrics", get(metrics))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    correlation_id = %Uuid::new_v4(),
                )
            }),
        )
        .with_state(state)
}

/// Binds `host:port`; host names are resolved and the first address that
/// binds wins.
pub async fn bind(addr: &str) -> Result<TcpListener, GatekeeperError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| GatekeeperError::transport(addr, e))
}

/// Serves the router until `shutdown` resolves; in-flight requests finish first.
pub async fn serve<F>(listener: TcpListener, state: HttpState, shutdown: F) -> Result<(), GatekeeperError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "HTTP front end listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| GatekeeperError::transport(addr, e))
}

#[derive(Debug, Serialize)]
struct Allowed {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    bypass: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct Denied {
    message: &'static str,
}

/// Header and cookie lookup for one request.
struct RequestFields<'a> {
    headers: &'a HeaderMap,
    jar: &'a CookieJar,
}

impl FieldSource for RequestFields<'_> {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(Cow::Borrowed)
    }

    fn cookie(&self, name: &str) -> Option<Cow<'_, str>> {
        self.jar.get(name).map(|c| Cow::Borrowed(c.value()))
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn check(State(state): State<HttpState>, headers: HeaderMap, jar: CookieJar) -> Response {
    let fields = RequestFields {
        headers: &headers,
        jar: &jar,
    };

    match state.gate.decide(&fields) {
        GateDecision::Bypassed => (
            StatusCode::OK,
            Json(Allowed {
                ok: true,
                bypass: Some("api_key"),
            }),
        )
            .into_response(),
        GateDecision::Accepted { source, .. } => {
            debug!(%source, "token accepted");
            (
                StatusCode::OK,
                Json(Allowed {
                    ok: true,
                    bypass: None,
                }),
            )
                .into_response()
        }
        GateDecision::MissingToken => unauthorized(),
        GateDecision::Rejected { error, source } => {
            debug!(%source, reason = error.code(), error = %error, "token rejected");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(Denied {
            message: UNAUTHORIZED_MESSAGE,
        }),
    )
        .into_response()
}

async fn metrics(State(state): State<HttpState>) -> Response {
    let Some(metrics) = &state.metrics else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match metrics.render() {
        Ok(body) => (
            [(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "unable to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
