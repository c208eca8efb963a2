//! AI analysis server HTTP client.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::analyzer::Analyzer;
use crate::api_types::{AnalyzeRequest, RawAnalyzeResponse};
use crate::config::AnalyzerConfig;
use crate::error::AnalyzerError;
use crate::report::AnalysisReport;

/// Client for the external AI analysis server.
#[derive(Clone)]
pub struct AnalyzerClient {
    http: Client,
    config: AnalyzerConfig,
}

impl AnalyzerClient {
    /// Build a client for the given configuration.
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|e| {
            AnalyzerError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self { http, config })
    }

    /// Create a client from environment variables.
    ///
    /// See [`AnalyzerConfig::from_env`].
    pub fn from_env() -> Result<Self, AnalyzerError> {
        Self::new(AnalyzerConfig::from_env()?)
    }

    /// Get the configuration.
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Send one analyze request and map the response.
    pub async fn send(&self, request: &AnalyzeRequest) -> Result<AnalysisReport, AnalyzerError> {
        let url = self.config.analyze_url();
        debug!(%url, language = %request.language, "Sending analyze request");

        let response = self.http.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "AI server rejected analyze request");
            return Err(AnalyzerError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let raw: RawAnalyzeResponse = serde_json::from_slice(&bytes)?;
        let report = AnalysisReport::try_from(raw)?;

        debug!(
            schema = ?report.schema,
            issues = report.issues.len(),
            "Received analysis"
        );

        Ok(report)
    }
}

#[async_trait]
impl Analyzer for AnalyzerClient {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisReport, AnalyzerError> {
        self.send(request).await
    }

    fn name(&self) -> &str {
        "AnalyzerClient"
    }
}

impl std::fmt::Debug for AnalyzerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerClient")
            .field("config", &self.config)
            .finish()
    }
}
