//! Client library for the CodeWise AI analysis server.
//!
//! The AI server exposes a single `POST /analyze` endpoint that takes
//! `{code, language, purpose?}` and answers with a summary, optional quality
//! metrics and a list of issues. This crate provides:
//!
//! - [`AnalyzerClient`] - the `reqwest` based HTTP client
//! - [`Analyzer`] - the trait the relay is written against
//! - [`AnalysisReport`] - the validated, typed form of a response
//!
//! # Example
//!
//! ```no_run
//! use analyzer_client::{AnalyzeRequest, AnalyzerClient, AnalyzerConfig};
//!
//! # async fn example() -> Result<(), analyzer_client::AnalyzerError> {
//! let client = AnalyzerClient::new(AnalyzerConfig::new("http://localhost:8000"))?;
//! let report = client.send(&AnalyzeRequest::new("print(1)", "python")).await?;
//! println!("{}", report.summary);
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod api_types;
pub mod client;
pub mod config;
pub mod error;
pub mod report;

pub use analyzer::Analyzer;
pub use api_types::{AnalyzeRequest, Issue, RawAnalyzeResponse};
pub use client::AnalyzerClient;
pub use config::AnalyzerConfig;
pub use error::AnalyzerError;
pub use report::{AnalysisReport, QualityMetrics, SchemaVersion};

// Re-export async_trait for implementors
pub use async_trait::async_trait;
