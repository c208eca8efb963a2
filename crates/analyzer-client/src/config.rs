//! Configuration for the analyzer client.

use std::env;
use std::time::Duration;

use crate::error::AnalyzerError;

/// Configuration for connecting to the AI analysis server.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Base URL of the AI server (e.g., "http://localhost:8000").
    pub base_url: String,
    /// Optional request timeout. `None` keeps the transport default.
    pub timeout: Option<Duration>,
}

impl AnalyzerConfig {
    /// Create a new configuration with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: None,
        }
    }

    /// Set a request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Create configuration from environment variables.
    ///
    /// - `AI_SERVER_URL` - base URL (required)
    /// - `AI_SERVER_TIMEOUT_SECS` - request timeout in seconds (optional)
    pub fn from_env() -> Result<Self, AnalyzerError> {
        let base_url = env::var("AI_SERVER_URL")
            .map_err(|_| AnalyzerError::Configuration("AI_SERVER_URL not set".to_string()))?;

        if base_url.trim().is_empty() {
            return Err(AnalyzerError::Configuration(
                "AI_SERVER_URL is empty".to_string(),
            ));
        }

        let mut config = Self::new(base_url.trim());
        if let Some(secs) = env::var("AI_SERVER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Get the analyze endpoint URL.
    pub fn analyze_url(&self) -> String {
        format!("{}/analyze", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_url_strips_trailing_slash() {
        let config = AnalyzerConfig::new("http://localhost:8000/");
        assert_eq!(config.analyze_url(), "http://localhost:8000/analyze");
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_with_timeout() {
        let config = AnalyzerConfig::new("http://ai").with_timeout(Duration::from_secs(5));
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
    }
}
