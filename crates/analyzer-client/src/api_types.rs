//! AI server request and response types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request body for `POST /analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Source code to analyze.
    pub code: String,
    /// Language tag (e.g. "python").
    pub language: String,
    /// Optional purpose tag forwarded to the analyzer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

impl AnalyzeRequest {
    /// Create a request without a purpose.
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            purpose: None,
        }
    }

    /// Attach a purpose tag.
    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }
}

/// A single issue reported by the analyzer.
///
/// Only `type`, `message` and `line` are interpreted; anything else is kept
/// verbatim so it survives storage and delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Severity (e.g. "error", "warn", "info").
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response body of `POST /analyze`, exactly as the server sends it.
///
/// Every field is optional here; [`crate::AnalysisReport`] decides which ones
/// are actually required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAnalyzeResponse {
    pub summary: Option<String>,
    pub metrics: Option<Map<String, Value>>,
    pub issues: Option<Vec<Issue>>,
    pub purpose: Option<String>,
    pub inferred_purpose: Option<String>,
    pub final_purpose: Option<String>,
}
