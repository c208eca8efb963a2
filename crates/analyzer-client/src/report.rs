//! Typed mapping of analyzer responses.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::api_types::{Issue, RawAnalyzeResponse};
use crate::error::AnalyzerError;

/// Response schema generation, detected from the body shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchemaVersion {
    /// `summary` + `issues` only.
    V1,
    /// Adds a `metrics` object.
    V2,
}

/// Numeric quality metrics (schema V2).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub maintainability: Option<f64>,
    pub readability: Option<f64>,
    pub bug_probability: Option<f64>,
    pub score: Option<i64>,
}

/// A validated analyzer response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub schema: SchemaVersion,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<QualityMetrics>,
    pub issues: Vec<Issue>,
    /// Effective purpose: `final_purpose`, else `inferred_purpose`, else `purpose`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

impl AnalysisReport {
    /// Issues serialized as a JSON array, the form stored alongside a result.
    pub fn suggestions_text(&self) -> String {
        serde_json::to_string(&self.issues).unwrap_or_else(|_| "[]".to_string())
    }

    /// Metrics, or an all-empty set for V1 responses.
    pub fn metrics_or_default(&self) -> QualityMetrics {
        self.metrics.clone().unwrap_or_default()
    }
}

impl TryFrom<RawAnalyzeResponse> for AnalysisReport {
    type Error = AnalyzerError;

    fn try_from(raw: RawAnalyzeResponse) -> Result<Self, Self::Error> {
        let summary = raw
            .summary
            .ok_or_else(|| AnalyzerError::Contract("missing field `summary`".to_string()))?;
        let issues = raw
            .issues
            .ok_or_else(|| AnalyzerError::Contract("missing field `issues`".to_string()))?;

        let (schema, metrics) = match raw.metrics {
            None => (SchemaVersion::V1, None),
            Some(map) => (SchemaVersion::V2, Some(parse_metrics(&map)?)),
        };

        let purpose = raw
            .final_purpose
            .or(raw.inferred_purpose)
            .or(raw.purpose)
            .filter(|p| !p.trim().is_empty());

        Ok(Self {
            schema,
            summary,
            metrics,
            issues,
            purpose,
        })
    }
}

fn parse_metrics(map: &Map<String, Value>) -> Result<QualityMetrics, AnalyzerError> {
    Ok(QualityMetrics {
        maintainability: float_metric(map, "maintainability")?,
        readability: float_metric(map, "readability")?,
        bug_probability: float_metric(map, "bug_probability")?,
        score: integer_metric(map, "score")?,
    })
}

fn float_metric(map: &Map<String, Value>, key: &str) -> Result<Option<f64>, AnalyzerError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or_else(|| {
            AnalyzerError::Contract(format!("metric `{}` is not a number: {}", key, value))
        }),
    }
}

fn integer_metric(map: &Map<String, Value>, key: &str) -> Result<Option<i64>, AnalyzerError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            AnalyzerError::Contract(format!("metric `{}` is not an integer: {}", key, value))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawAnalyzeResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_v2_response_maps_metrics() {
        let report = AnalysisReport::try_from(raw(json!({
            "summary": "Readable overall",
            "metrics": {
                "maintainability": 0.82,
                "readability": 0.9,
                "bug_probability": 0.05,
                "score": 88
            },
            "issues": [{"type": "warn", "message": "unused variable", "line": 3}],
            "inferred_purpose": "refactor"
        })))
        .unwrap();

        assert_eq!(report.schema, SchemaVersion::V2);
        let metrics = report.metrics.clone().unwrap();
        assert_eq!(metrics.score, Some(88));
        assert_eq!(metrics.bug_probability, Some(0.05));
        assert_eq!(report.purpose.as_deref(), Some("refactor"));
        assert_eq!(report.issues[0].kind.as_deref(), Some("warn"));
    }

    #[test]
    fn test_v1_response_has_no_metrics() {
        let report = AnalysisReport::try_from(raw(json!({
            "summary": "ok",
            "issues": []
        })))
        .unwrap();

        assert_eq!(report.schema, SchemaVersion::V1);
        assert!(report.metrics.is_none());
        assert_eq!(report.metrics_or_default(), QualityMetrics::default());
        assert_eq!(report.suggestions_text(), "[]");
    }

    #[test]
    fn test_missing_summary_is_rejected() {
        let err = AnalysisReport::try_from(raw(json!({"issues": []}))).unwrap_err();
        assert!(matches!(err, AnalyzerError::Contract(msg) if msg.contains("summary")));
    }

    #[test]
    fn test_missing_issues_is_rejected() {
        let err = AnalysisReport::try_from(raw(json!({"summary": "x"}))).unwrap_err();
        assert!(matches!(err, AnalyzerError::Contract(msg) if msg.contains("issues")));
    }

    #[test]
    fn test_non_numeric_metric_is_rejected() {
        let err = AnalysisReport::try_from(raw(json!({
            "summary": "x",
            "issues": [],
            "metrics": {"readability": "high"}
        })))
        .unwrap_err();
        assert!(matches!(err, AnalyzerError::Contract(msg) if msg.contains("readability")));
    }

    #[test]
    fn test_fractional_score_is_rejected() {
        let err = AnalysisReport::try_from(raw(json!({
            "summary": "x",
            "issues": [],
            "metrics": {"score": 7.5}
        })))
        .unwrap_err();
        assert!(matches!(err, AnalyzerError::Contract(_)));
    }

    #[test]
    fn test_purpose_precedence() {
        let report = AnalysisReport::try_from(raw(json!({
            "summary": "x",
            "issues": [],
            "purpose": "a",
            "inferred_purpose": "b",
            "final_purpose": "c"
        })))
        .unwrap();
        assert_eq!(report.purpose.as_deref(), Some("c"));
    }

    #[test]
    fn test_suggestions_keep_unknown_issue_fields() {
        let report = AnalysisReport::try_from(raw(json!({
            "summary": "x",
            "issues": [{"message": "m", "rule": "E501"}]
        })))
        .unwrap();
        let text = report.suggestions_text();
        assert!(text.contains("\"rule\":\"E501\""));
        assert!(text.contains("\"message\":\"m\""));
    }
}
