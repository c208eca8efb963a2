//! Per-issue analysis history and its statistics.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, NaiveDateTime};
use database::history;
use database::models::{AnalysisHistory, NewHistoryEntry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::caller;
use crate::error::{ApiError, Result};
use crate::identity::AuthUser;
use crate::state::AppState;

pub const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";
pub const DUPLICATE_IGNORED: &str = "Duplicate request ignored";

const TOP_LANGUAGES: usize = 5;
const TOP_PURPOSES: usize = 5;
const TOP_ERRORS: usize = 10;

/// Storage format, matching SQLite's `datetime('now')`.
const STORED_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";
const ACCEPTED_TIMESTAMPS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

#[derive(Debug, Clone, Deserialize)]
pub struct ReportedError {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveHistoryRequest {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub errors: Vec<ReportedError>,
}

impl SaveHistoryRequest {
    /// One row per reported error, or a single placeholder row.
    fn entries(&self) -> Vec<NewHistoryEntry> {
        let base = NewHistoryEntry {
            language: non_blank(self.language.as_deref()),
            purpose: non_blank(self.purpose.as_deref()),
            ..Default::default()
        };
        if self.errors.is_empty() {
            return vec![base];
        }
        self.errors
            .iter()
            .map(|e| NewHistoryEntry {
                error_type: non_blank(e.kind.as_deref()),
                error_message: non_blank(e.message.as_deref()),
                ..base.clone()
            })
            .collect()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Normalise a client timestamp to the stored format.
///
/// RFC 3339 values with an offset are converted to UTC.
pub fn normalize_timestamp(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| {
            ACCEPTED_TIMESTAMPS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        })
        .ok_or_else(|| ApiError::BadRequest(format!("invalid createdAt: {raw}")))?;
    Ok(parsed.format(STORED_TIMESTAMP).to_string())
}

pub async fn save(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(req): Json<SaveHistoryRequest>,
) -> Result<String> {
    let account = caller(&state, &auth).await?;
    let pool = state.db.pool();
    let created_at = non_blank(req.created_at.as_deref())
        .map(|raw| normalize_timestamp(&raw))
        .transpose()?;

    let key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| non_blank(Some(v)))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // Check-then-insert; two racing requests with one key can both pass.
    if history::exists_for_key(pool, account.id, &key).await? {
        debug!(user_id = account.id, key = %key, "Duplicate history save ignored");
        return Ok(DUPLICATE_IGNORED.to_string());
    }

    let inserted =
        history::insert_entries(pool, account.id, &key, created_at.as_deref(), &req.entries())
            .await?;
    info!(user_id = account.id, inserted, "History saved");

    Ok(format!("History saved ({inserted} rows)"))
}

pub async fn entries(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<AnalysisHistory>>> {
    let account = caller(&state, &auth).await?;
    Ok(Json(history::list_history_for_user(state.db.pool(), account.id).await?))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageCount {
    pub language: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurposeCount {
    pub purpose: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub error: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub top_languages: Vec<LanguageCount>,
    pub top_purposes: Vec<PurposeCount>,
    pub top_errors: Vec<ErrorCount>,
}

/// Most frequent values, ties broken alphabetically.
fn top_counts<'a>(values: impl Iterator<Item = &'a str>, limit: usize) -> Vec<(String, i64)> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for value in values.filter(|v| !v.trim().is_empty()) {
        *counts.entry(value).or_default() += 1;
    }
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(limit);
    ranked.into_iter().map(|(k, c)| (k.to_string(), c)).collect()
}

pub fn compute_stats(rows: &[AnalysisHistory]) -> HistoryStats {
    HistoryStats {
        top_languages: top_counts(rows.iter().filter_map(|r| r.language.as_deref()), TOP_LANGUAGES)
            .into_iter()
            .map(|(language, count)| LanguageCount { language, count })
            .collect(),
        top_purposes: top_counts(rows.iter().filter_map(|r| r.purpose.as_deref()), TOP_PURPOSES)
            .into_iter()
            .map(|(purpose, count)| PurposeCount { purpose, count })
            .collect(),
        top_errors: top_counts(rows.iter().filter_map(|r| r.error_message.as_deref()), TOP_ERRORS)
            .into_iter()
            .map(|(error, count)| ErrorCount { error, count })
            .collect(),
    }
}

pub async fn stats(State(state): State<AppState>, auth: AuthUser) -> Result<Json<HistoryStats>> {
    let account = caller(&state, &auth).await?;
    let rows = history::list_history_for_user(state.db.pool(), account.id).await?;
    Ok(Json(compute_stats(&rows)))
}
