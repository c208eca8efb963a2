//! Stored analysis results.

use axum::extract::{Path, Query, State};
use axum::Json;
use database::models::OwnedResult;
use database::result;
use serde::{Deserialize, Serialize};

use super::caller;
use crate::error::{ApiError, Result};
use crate::identity::AuthUser;
use crate::state::AppState;

/// A result as returned by the API, with its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResultDto {
    pub id: i64,
    pub submission_id: i64,
    pub user_id: i64,
    pub email: String,
    pub summary: String,
    pub suggestions: String,
    pub maintainability_score: Option<f64>,
    pub readability_score: Option<f64>,
    pub bug_probability: Option<f64>,
    pub score: Option<i64>,
    pub created_at: String,
}

impl From<OwnedResult> for AnalysisResultDto {
    fn from(row: OwnedResult) -> Self {
        let r = row.result;
        Self {
            id: r.id,
            submission_id: r.submission_id,
            user_id: row.user_id,
            email: row.email,
            summary: r.summary,
            suggestions: r.suggestions,
            maintainability_score: r.maintainability_score,
            readability_score: r.readability_score,
            bug_probability: r.bug_probability,
            score: r.score,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultQuery {
    pub user_id: Option<i64>,
}

/// Result of one submission. Only the submission's owner can see it; a
/// `userId` naming anyone else finds nothing.
pub async fn by_submission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(submission_id): Path<i64>,
    Query(query): Query<ResultQuery>,
) -> Result<Json<AnalysisResultDto>> {
    let account = caller(&state, &auth).await?;
    let owner_id = query.user_id.unwrap_or(account.id);

    let row = if owner_id == account.id {
        result::find_result_by_submission_and_user(state.db.pool(), submission_id, owner_id).await?
    } else {
        None
    };

    row.map(|r| Json(r.into()))
        .ok_or_else(|| ApiError::NotFound(format!("No result for submission {submission_id}")))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<AnalysisResultDto>> {
    let account = caller(&state, &auth).await?;
    let row = result::get_result(state.db.pool(), id).await?;
    if row.user_id != account.id {
        return Err(ApiError::NotFound(format!("AnalysisResult not found: {id}")));
    }
    Ok(Json(row.into()))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<AnalysisResultDto>>> {
    let account = caller(&state, &auth).await?;
    let rows = result::list_results_for_user(state.db.pool(), account.id).await?;
    Ok(Json(rows.into_iter().map(AnalysisResultDto::from).collect()))
}
