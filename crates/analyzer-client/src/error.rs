//! Error types for analyzer-client.

use thiserror::Error;

/// Errors that can occur when calling the AI analysis server.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Transport-level failure (connect, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("AI error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// The response body was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The response JSON did not match the expected contract.
    #[error("unexpected analyzer response: {0}")]
    Contract(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}
