//! Router responses through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use spoe_auth::http::{http_gate, router, HttpState};
use spoe_auth::observability::AuthMetrics;

use crate::support::{expired_claims, valid_claims, TestSigner};

fn app(signer: &TestSigner, admin: Option<&str>) -> Router {
    let metrics = Arc::new(AuthMetrics::new().unwrap());
    let gate = http_gate(signer.verifier(), admin.map(str::to_string)).with_metrics(Arc::clone(&metrics));
    router(HttpState::new(gate, Some(metrics)))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, content_type, body)
}

fn check() -> axum::http::request::Builder {
    Request::builder().uri("/check")
}

#[tokio::test]
async fn health_answers_any_method() {
    let signer = TestSigner::generate();
    for method in [Method::GET, Method::POST, Method::HEAD] {
        let request = Request::builder()
            .method(method.clone())
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(app(&signer, None), request).await;
        assert_eq!(status, StatusCode::OK, "{method}");
        if method != Method::HEAD {
            assert_eq!(body, b"ok");
        }
    }
}

#[tokio::test]
async fn api_key_bypass() {
    let signer = TestSigner::generate();
    let request = check().header("X-API-Key", "secret").body(Body::empty()).unwrap();

    let (status, content_type, body) = send(app(&signer, Some("secret")), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"ok": true, "bypass": "api_key"}));
}

#[tokio::test]
async fn missing_credentials_are_unauthorized() {
    let signer = TestSigner::generate();
    let (status, content_type, body) =
        send(app(&signer, Some("secret")), check().body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"message": "Invalid or expired token"}));
}

#[tokio::test]
async fn authorization_header_accepted_without_identity_in_body() {
    let signer = TestSigner::generate();
    let token = signer.sign(&valid_claims("alice"));
    let request = check()
        .method(Method::POST)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(app(&signer, None), request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn session_cookie_is_used_verbatim() {
    let signer = TestSigner::generate();
    let token = signer.sign(&valid_claims("bob"));
    let request = check()
        .header(COOKIE, format!("theme=dark; session={token}"))
        .body(Body::empty())
        .unwrap();

    let (status, _, _) = send(app(&signer, None), request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn every_rejection_has_the_same_body() {
    let signer = TestSigner::generate();
    let other = TestSigner::generate();
    let tokens = [
        signer.sign(&expired_claims("carol")),
        other.sign(&valid_claims("carol")),
        "v4.public.not-a-token".to_string(),
    ];

    for token in tokens {
        let request = check()
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(app(&signer, None), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            serde_json::from_slice::<Value>(&body).unwrap(),
            json!({"message": "Invalid or expired token"})
        );
    }
}

#[tokio::test]
async fn metrics_exposition() {
    let signer = TestSigner::generate();
    let app = app(&signer, None);

    let _ = send(app.clone(), check().body(Body::empty()).unwrap()).await;
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, _, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains(r#"spoe_auth_decisions_total{frontend="http",outcome="missing_token"} 1"#));
}
