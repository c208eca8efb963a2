//! Relay from `/app/analyze` messages to the AI server and back.
//!
//! Each request runs on its own task. Authenticated callers get the
//! submission and result persisted before delivery; anonymous callers only
//! receive the report. Replies go to `/user/queue/result`.

use std::sync::Arc;

use analyzer_client::{AnalysisReport, AnalyzeRequest, Analyzer};
use database::models::{AnalysisResult, CodeSubmission, NewAnalysisResult, NewSubmission};
use database::{result, user, Database, DatabaseError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::identity::{IdentityContext, Principal};

pub const RESULT_DESTINATION: &str = "/queue/result";

const DEFAULT_LANGUAGE: &str = "auto";

/// Body of a SEND to `/app/analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnalyzeMessage {
    pub code: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
}

impl AnalyzeMessage {
    fn to_request(&self) -> AnalyzeRequest {
        let language = self
            .language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LANGUAGE);
        let request = AnalyzeRequest::new(self.code.clone(), language);
        match self.purpose.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(purpose) => request.with_purpose(purpose),
            None => request,
        }
    }
}

/// What happened to one relayed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Persisted, then delivered.
    Delivered { submission_id: i64, result_id: i64 },
    /// Anonymous caller; delivered without storage.
    DeliveredWithoutPersistence,
    /// Analysis succeeded but storage failed; caller got the report and the error.
    StorageFailed(String),
    /// The AI server call failed; caller got the error.
    AnalyzerFailed(String),
    /// The message body could not be decoded.
    Rejected(String),
}

/// Success payload: the report plus the stored ids when there are any.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisDelivery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    submission_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_id: Option<i64>,
    suggestions: String,
    #[serde(flatten)]
    report: &'a AnalysisReport,
}

#[derive(Clone)]
pub struct RelayController {
    db: Database,
    analyzer: Arc<dyn Analyzer>,
    broker: Broker,
}

impl RelayController {
    pub fn new(db: Database, analyzer: Arc<dyn Analyzer>, broker: Broker) -> Self {
        Self {
            db,
            analyzer,
            broker,
        }
    }

    /// Start relaying `message` for `ctx`. Returns immediately.
    pub fn dispatch(&self, ctx: IdentityContext, message: AnalyzeMessage) -> JoinHandle<RelayOutcome> {
        let relay = self.clone();
        tokio::spawn(async move { relay.run(&ctx, message).await })
    }

    /// Tell the caller their message could not be decoded.
    pub async fn reject(&self, ctx: &IdentityContext, reason: &str) -> RelayOutcome {
        let payload = json!({ "error": format!("invalid analyze request: {reason}") });
        self.deliver(ctx, &payload).await;
        RelayOutcome::Rejected(reason.to_string())
    }

    async fn run(&self, ctx: &IdentityContext, message: AnalyzeMessage) -> RelayOutcome {
        let request = message.to_request();
        debug!(
            user = ctx.user_key(),
            analyzer = self.analyzer.name(),
            language = %request.language,
            "Relaying analysis request"
        );

        match self.analyzer.analyze(&request).await {
            Ok(report) => self.on_report(ctx, &request, &report).await,
            Err(err) => {
                warn!(user = ctx.user_key(), error = %err, "Analysis failed");
                let message = err.to_string();
                self.deliver(ctx, &json!({ "error": message })).await;
                RelayOutcome::AnalyzerFailed(message)
            }
        }
    }

    async fn on_report(
        &self,
        ctx: &IdentityContext,
        request: &AnalyzeRequest,
        report: &AnalysisReport,
    ) -> RelayOutcome {
        let Some(principal) = &ctx.principal else {
            self.deliver(ctx, &delivery(report, None)).await;
            return RelayOutcome::DeliveredWithoutPersistence;
        };

        match self.persist(principal, request, report).await {
            Ok((submission, stored)) => {
                info!(
                    user = %principal.email,
                    submission_id = submission.id,
                    result_id = stored.id,
                    "Analysis stored"
                );
                self.deliver(ctx, &delivery(report, Some((submission.id, stored.id))))
                    .await;
                RelayOutcome::Delivered {
                    submission_id: submission.id,
                    result_id: stored.id,
                }
            }
            Err(err) => {
                warn!(user = %principal.email, error = %err, "Failed to store analysis");
                let message = format!("analysis succeeded but storage failed: {err}");
                let payload = json!({
                    "error": message,
                    "result": delivery(report, None),
                });
                self.deliver(ctx, &payload).await;
                RelayOutcome::StorageFailed(err.to_string())
            }
        }
    }

    async fn persist(
        &self,
        principal: &Principal,
        request: &AnalyzeRequest,
        report: &AnalysisReport,
    ) -> Result<(CodeSubmission, AnalysisResult), DatabaseError> {
        let owner = user::get_user_by_email(self.db.pool(), &principal.email).await?;
        let metrics = report.metrics_or_default();

        let submission = NewSubmission {
            user_id: owner.id,
            code: request.code.clone(),
            language: request.language.clone(),
            purpose: request.purpose.clone().or_else(|| report.purpose.clone()),
        };
        let analysis = NewAnalysisResult {
            summary: report.summary.clone(),
            suggestions: report.suggestions_text(),
            maintainability_score: metrics.maintainability,
            readability_score: metrics.readability,
            bug_probability: metrics.bug_probability,
            score: metrics.score,
        };

        result::save_analysis(self.db.pool(), &submission, &analysis).await
    }

    async fn deliver(&self, ctx: &IdentityContext, payload: &Value) -> usize {
        let delivered = match &ctx.principal {
            Some(p) => {
                self.broker
                    .send_to_user(&p.email, RESULT_DESTINATION, payload)
                    .await
            }
            None => {
                self.broker
                    .send_to_session(&ctx.session_id, RESULT_DESTINATION, payload)
                    .await
            }
        };
        if delivered == 0 {
            debug!(user = ctx.user_key(), "No subscriber for analysis result");
        }
        delivered
    }
}

fn delivery(report: &AnalysisReport, ids: Option<(i64, i64)>) -> Value {
    let body = AnalysisDelivery {
        submission_id: ids.map(|(s, _)| s),
        result_id: ids.map(|(_, r)| r),
        suggestions: report.suggestions_text(),
        report,
    };
    serde_json::to_value(body).unwrap_or_else(|_| json!({ "summary": report.summary }))
}
