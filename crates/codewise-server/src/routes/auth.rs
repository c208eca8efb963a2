//! Signup and password login.

use axum::extract::State;
use axum::Json;
use database::models::NewUser;
use database::user;
use database::validation::{validate_email, validate_password};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub const SIGNUP_OK: &str = "회원가입 성공";

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<&'static str> {
    let email = req.email.trim();
    validate_email(email)?;
    validate_password(&req.password)?;

    let pool = state.db.pool();
    if user::exists_by_email(pool, email).await? {
        return Err(ApiError::BadRequest(format!("Email already registered: {email}")));
    }

    let hash = state.passwords.hash(&req.password).await?;
    let created = user::create_user(pool, &NewUser::with_password(email, hash)).await?;
    info!(user_id = created.id, "User signed up");

    Ok(SIGNUP_OK)
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<Json<TokenResponse>> {
    let email = req.email.trim();
    let account = user::find_user_by_email(state.db.pool(), email)
        .await?
        .ok_or_else(|| ApiError::UserNotFound(email.to_string()))?;

    let Some(hash) = account.password_hash.as_deref() else {
        return Err(ApiError::BadRequest(
            "This account signs in with a social provider".to_string(),
        ));
    };
    if !state.passwords.verify(&req.password, hash).await? {
        return Err(ApiError::BadRequest("Password does not match".to_string()));
    }

    let token = state
        .tokens
        .issue(&account.email)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(TokenResponse { token }))
}
