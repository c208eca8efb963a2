//! Shared fixtures for codewise-server integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use analyzer_client::{
    async_trait, AnalysisReport, AnalyzeRequest, Analyzer, AnalyzerError, QualityMetrics,
    SchemaVersion,
};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use codewise_server::identity::TokenService;
use codewise_server::password::PasswordHasher;
use codewise_server::AppState;
use database::Database;
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret-0123456789";

/// Analyzer double: returns a fixed report or a fixed error, and records requests.
pub struct StubAnalyzer {
    pub outcome: Result<AnalysisReport, String>,
    pub seen: Mutex<Vec<AnalyzeRequest>>,
}

impl StubAnalyzer {
    pub fn ok(summary: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(report(summary)),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(message.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Analyzer for StubAnalyzer {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisReport, AnalyzerError> {
        self.seen.lock().unwrap().push(request.clone());
        match &self.outcome {
            Ok(report) => Ok(report.clone()),
            Err(body) => Err(AnalyzerError::Upstream {
                status: 503,
                body: body.clone(),
            }),
        }
    }

    fn name(&self) -> &str {
        "stub"
    }
}

pub fn report(summary: &str) -> AnalysisReport {
    let raw = serde_json::json!({
        "summary": summary,
        "metrics": {"maintainability": 0.8, "readability": 0.9, "bug_probability": 0.1, "score": 84},
        "issues": [{"type": "warn", "message": "unused variable", "line": 2}]
    });
    let report = AnalysisReport::try_from(
        serde_json::from_value::<analyzer_client::RawAnalyzeResponse>(raw).unwrap(),
    )
    .unwrap();
    assert_eq!(report.schema, SchemaVersion::V2);
    assert!(matches!(report.metrics, Some(QualityMetrics { score: Some(84), .. })));
    report
}

pub fn tokens() -> TokenService {
    TokenService::new(
        &SecretString::from(SECRET.to_string()),
        Duration::from_secs(3600),
    )
}

/// Single-connection in-memory database; writers never contend.
pub async fn test_db() -> Database {
    let db = Database::connect_with_pool_size("sqlite::memory:", 1).await.unwrap();
    db.migrate().await.unwrap();
    db
}

pub async fn test_state(analyzer: Arc<dyn Analyzer>) -> AppState {
    AppState::new(test_db().await, analyzer, tokens()).with_passwords(PasswordHasher::new(4))
}

pub fn app(state: AppState) -> Router {
    codewise_server::app(state, &[])
}

/// Send one request and return status plus body (JSON if it parses, else a string).
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn delete(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

/// Sign up and log in, returning the token.
pub async fn register(app: &Router, email: &str, password: &str) -> String {
    let creds = serde_json::json!({"email": email, "password": password});
    let (status, _) = send(app, json_request("POST", "/auth/signup", None, creds.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(app, json_request("POST", "/auth/login", None, creds)).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}
