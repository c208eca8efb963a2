//! The caller's own account and result history.

use std::cmp::Ordering;

use axum::extract::{Query, State};
use axum::Json;
use database::models::{OwnedResult, User};
use database::validation::{validate_email, validate_password};
use database::{result, user};
use serde::Deserialize;
use tracing::info;

use super::analysis::AnalysisResultDto;
use super::caller;
use crate::error::{ApiError, Result};
use crate::identity::AuthUser;
use crate::state::AppState;

pub async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<User>> {
    Ok(Json(caller(&state, &auth).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Change email and/or password. Absent or blank fields are left alone.
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    let mut account = caller(&state, &auth).await?;
    let pool = state.db.pool();

    if let Some(email) = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        if email != account.email {
            validate_email(email)?;
            if user::exists_by_email(pool, email).await? {
                return Err(ApiError::BadRequest(format!("Email already registered: {email}")));
            }
            account.email = email.to_string();
        }
    }

    if let Some(password) = req.password.as_deref().filter(|p| !p.is_empty()) {
        validate_password(password)?;
        account.password_hash = Some(state.passwords.hash(password).await?);
    }

    user::update_user(pool, &account).await?;
    info!(user_id = account.id, "User updated");

    Ok(Json(account))
}

pub async fn delete_me(State(state): State<AppState>, auth: AuthUser) -> Result<&'static str> {
    let account = caller(&state, &auth).await?;
    user::delete_user_cascade(state.db.pool(), account.id).await?;
    info!(user_id = account.id, "User deleted");
    Ok("Account deleted")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    CreatedAt,
    Score,
    Maintainability,
    Readability,
    Bug,
}

impl SortKey {
    fn parse(raw: &str) -> Option<Self> {
        let key = match raw {
            "id" => SortKey::Id,
            "createdAt" => SortKey::CreatedAt,
            "score" => SortKey::Score,
            "maintainability" => SortKey::Maintainability,
            "readability" => SortKey::Readability,
            "bug" | "bugProbability" => SortKey::Bug,
            _ => return None,
        };
        Some(key)
    }

    fn compare(&self, a: &OwnedResult, b: &OwnedResult) -> Ordering {
        let (a, b) = (&a.result, &b.result);
        match self {
            SortKey::Id => a.id.cmp(&b.id),
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)),
            SortKey::Score => a.score.cmp(&b.score),
            SortKey::Maintainability => cmp_metric(a.maintainability_score, b.maintainability_score),
            SortKey::Readability => cmp_metric(a.readability_score, b.readability_score),
            SortKey::Bug => cmp_metric(a.bug_probability, b.bug_probability),
        }
    }
}

/// Missing metrics sort before present ones.
fn cmp_metric(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub sort_by: Option<String>,
    pub direction: Option<String>,
    pub keyword: Option<String>,
}

/// Filter by summary keyword and order the caller's results.
pub fn arrange_results(mut rows: Vec<OwnedResult>, query: &HistoryQuery) -> Result<Vec<OwnedResult>> {
    let key = match query.sort_by.as_deref().filter(|s| !s.is_empty()) {
        None => SortKey::CreatedAt,
        Some(raw) => SortKey::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("Unsupported sortBy: {raw}")))?,
    };
    let ascending = match query.direction.as_deref() {
        None | Some("") => false,
        Some(d) if d.eq_ignore_ascii_case("desc") => false,
        Some(d) if d.eq_ignore_ascii_case("asc") => true,
        Some(d) => return Err(ApiError::BadRequest(format!("Unsupported direction: {d}"))),
    };

    if let Some(keyword) = query.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        let needle = keyword.to_lowercase();
        rows.retain(|row| row.result.summary.to_lowercase().contains(&needle));
    }

    rows.sort_by(|a, b| {
        let ord = key.compare(a, b);
        if ascending {
            ord
        } else {
            ord.reverse()
        }
    });
    Ok(rows)
}

pub async fn history(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<AnalysisResultDto>>> {
    let account = caller(&state, &auth).await?;
    let rows = result::list_results_for_user(state.db.pool(), account.id).await?;
    let rows = arrange_results(rows, &query)?;
    Ok(Json(rows.into_iter().map(AnalysisResultDto::from).collect()))
}
