//! OAuth2 authorization-code callback.

use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use serde::Deserialize;
use tracing::info;

use crate::error::{ApiError, Result};
use crate::oauth::{provision_user, redirect_url, OAuthError};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Exchange the code, find or create the account, and send the browser to
/// the frontend with a fresh token.
pub async fn callback(
    State(state): State<AppState>,
    Path(registration_id): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect> {
    if let Some(error) = query.error {
        return Err(OAuthError::Exchange(error).into());
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing authorization code".to_string()))?;

    let provider = state.oauth.get(&registration_id)?.clone();
    let profile = provider.exchange(&code).await?;
    let account = provision_user(&state.db, &profile).await?;
    info!(user_id = account.id, provider = %registration_id, "OAuth2 login");

    let token = state
        .tokens
        .issue(&account.email)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let target = redirect_url(&state.frontend_redirect_url, &token)
        .map_err(|e| ApiError::Internal(format!("invalid redirect URL: {e}")))?;

    Ok(Redirect::to(&target))
}
