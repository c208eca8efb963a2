//! Code submissions over REST.

use axum::extract::{Path, State};
use axum::Json;
use database::models::{CodeSubmission, NewSubmission};
use database::submission;
use database::validation::validate_tag;
use serde::Deserialize;
use tracing::info;

use super::caller;
use crate::error::{ApiError, Result};
use crate::identity::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub purpose: Option<String>,
}

pub async fn submit(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<CodeSubmission>> {
    if req.code.trim().is_empty() {
        return Err(ApiError::BadRequest("code must not be empty".to_string()));
    }
    validate_tag("language", &req.language)?;
    let purpose = req.purpose.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
    if let Some(purpose) = &purpose {
        validate_tag("purpose", purpose)?;
    }

    let account = caller(&state, &auth).await?;
    let created = submission::create_submission(
        state.db.pool(),
        &NewSubmission {
            user_id: account.id,
            code: req.code,
            language: req.language.trim().to_string(),
            purpose,
        },
    )
    .await?;
    info!(user_id = account.id, submission_id = created.id, "Code submitted");

    Ok(Json(created))
}

/// The caller's submissions, newest first.
pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<CodeSubmission>>> {
    let account = caller(&state, &auth).await?;
    let rows = submission::list_submissions_for_user(state.db.pool(), account.id).await?;
    Ok(Json(rows))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<CodeSubmission>> {
    let account = caller(&state, &auth).await?;
    let row = submission::get_submission_for_user(state.db.pool(), id, account.id).await?;
    Ok(Json(row))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<&'static str> {
    let account = caller(&state, &auth).await?;
    submission::delete_submission(state.db.pool(), id, account.id).await?;
    info!(user_id = account.id, submission_id = id, "Submission deleted");
    Ok("Submission deleted")
}
