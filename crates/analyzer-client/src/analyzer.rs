//! The Analyzer trait definition.

use async_trait::async_trait;

use crate::api_types::AnalyzeRequest;
use crate::error::AnalyzerError;
use crate::report::AnalysisReport;

/// Something that can analyze a piece of code.
///
/// The HTTP implementation is [`crate::AnalyzerClient`]; the trait exists so
/// the relay can be driven by other backends. It is object-safe and can be
/// used as `Arc<dyn Analyzer>`.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze one submission. One attempt, no retry.
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisReport, AnalyzerError>;

    /// Get a human-readable name for this analyzer.
    fn name(&self) -> &str;
}
