//! Integration tests for analyzer-client.
//!
//! Each test starts a throwaway AI server on an ephemeral local port.

use std::net::SocketAddr;

use analyzer_client::{
    AnalyzeRequest, Analyzer, AnalyzerClient, AnalyzerConfig, AnalyzerError, SchemaVersion,
};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

/// Serve `app` on 127.0.0.1 and return its base URL.
async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client_for(base_url: &str) -> AnalyzerClient {
    AnalyzerClient::new(AnalyzerConfig::new(base_url)).unwrap()
}

#[tokio::test]
async fn test_successful_analysis() {
    let app = Router::new().route(
        "/analyze",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["code"], "print(1)");
            assert_eq!(body["language"], "python");
            assert!(body.get("purpose").is_none());
            Json(json!({
                "summary": "Prints a constant",
                "metrics": {"maintainability": 0.9, "readability": 0.95, "bug_probability": 0.01, "score": 97},
                "issues": []
            }))
        }),
    );
    let base = spawn_server(app).await;

    let report = client_for(&base)
        .analyze(&AnalyzeRequest::new("print(1)", "python"))
        .await
        .unwrap();

    assert_eq!(report.summary, "Prints a constant");
    assert_eq!(report.schema, SchemaVersion::V2);
    assert_eq!(report.metrics.unwrap().score, Some(97));
}

#[tokio::test]
async fn test_purpose_is_forwarded() {
    let app = Router::new().route(
        "/analyze",
        post(|Json(body): Json<Value>| async move {
            Json(json!({
                "summary": "ok",
                "issues": [],
                "final_purpose": body["purpose"].clone()
            }))
        }),
    );
    let base = spawn_server(app).await;

    let request = AnalyzeRequest::new("x = 1", "python").with_purpose("security_hardening");
    let report = client_for(&base).send(&request).await.unwrap();
    assert_eq!(report.purpose.as_deref(), Some("security_hardening"));
}

#[tokio::test]
async fn test_upstream_error_carries_body() {
    let app = Router::new().route(
        "/analyze",
        post(|| async { (StatusCode::BAD_GATEWAY, "model overloaded") }),
    );
    let base = spawn_server(app).await;

    let err = client_for(&base)
        .send(&AnalyzeRequest::new("print(1)", "python"))
        .await
        .unwrap_err();

    match &err {
        AnalyzerError::Upstream { status, body } => {
            assert_eq!(*status, 502);
            assert_eq!(body, "model overloaded");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("model overloaded"));
}

#[tokio::test]
async fn test_contract_violation_fails_loudly() {
    let app = Router::new().route(
        "/analyze",
        post(|| async { Json(json!({"issues": []})) }),
    );
    let base = spawn_server(app).await;

    let err = client_for(&base)
        .send(&AnalyzeRequest::new("print(1)", "python"))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyzerError::Contract(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    // Bind then drop to get a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client_for(&format!("http://{}", addr))
        .send(&AnalyzeRequest::new("print(1)", "python"))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyzerError::Http(_)));
}
