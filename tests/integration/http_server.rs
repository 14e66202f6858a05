//! HTTP front end over a bound listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use spoe_auth::http::{self, http_gate, HttpState};
use spoe_auth::observability::AuthMetrics;

use crate::support::{valid_claims, TestSigner};

/// Sends one HTTP/1.1 request and returns the raw response.
async fn request(addr: SocketAddr, method: &str, path: &str, headers: &[(&str, &str)]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n");
    for (name, value) in headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str("\r\n");
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    response
}

#[tokio::test]
async fn serves_until_shutdown() {
    let signer = TestSigner::generate();
    let metrics = Arc::new(AuthMetrics::new().unwrap());
    let gate = http_gate(signer.verifier(), Some("secret".into())).with_metrics(Arc::clone(&metrics));

    let listener = http::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(http::serve(listener, HttpState::new(gate, Some(metrics)), async {
        let _ = stopped.await;
    }));

    let health = request(addr, "DELETE", "/health", &[]).await;
    assert!(health.starts_with("HTTP/1.1 200"), "{health}");
    assert!(health.ends_with("ok"));

    let token = signer.sign(&valid_claims("alice"));
    let bearer = format!("Bearer {token}");
    let ok = request(addr, "GET", "/check", &[("Authorization", &bearer)]).await;
    assert!(ok.starts_with("HTTP/1.1 200"), "{ok}");
    assert!(ok.to_ascii_lowercase().contains("content-type: application/json"));
    assert!(ok.ends_with(r#"{"ok":true}"#));

    let bypass = request(addr, "PUT", "/check", &[("X-API-Key", "secret")]).await;
    assert!(bypass.ends_with(r#"{"ok":true,"bypass":"api_key"}"#), "{bypass}");

    let denied = request(addr, "GET", "/check", &[("Cookie", "session=v4.public.forged")]).await;
    assert!(denied.starts_with("HTTP/1.1 401"), "{denied}");
    assert!(denied.ends_with(r#"{"message":"Invalid or expired token"}"#));

    let _ = stop.send(());
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn bind_failure_is_a_transport_error() {
    let first = http::bind("127.0.0.1:0").await.unwrap();
    let taken = first.local_addr().unwrap().to_string();

    let err = http::bind(&taken).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.code().as_str(), "TRANSPORT_ERROR");
}

#[tokio::test]
async fn binds_host_names() {
    let listener = http::bind("localhost:0").await.unwrap();
    assert!(listener.local_addr().unwrap().ip().is_loopback());
}
