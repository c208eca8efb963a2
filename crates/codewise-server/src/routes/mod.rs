//! Route handlers for the CodeWise API.

pub mod analysis;
pub mod auth;
pub mod code;
pub mod health;
pub mod history;
pub mod oauth;
pub mod user;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use database::models::User;

use crate::error::Result;
use crate::identity::AuthUser;
use crate::state::AppState;

/// Build the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health::home))
        .route("/health", get(health::health))
        // Accounts
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/login/oauth2/code/:provider", get(oauth::callback))
        .route(
            "/user/me",
            get(user::me).put(user::update_me).delete(user::delete_me),
        )
        // History
        .route("/user/history", get(user::history).post(history::save))
        .route("/user/history/entries", get(history::entries))
        .route("/user/history/stats", get(history::stats))
        // Submissions and results
        .route("/code/submit", post(code::submit))
        .route("/code/list", get(code::list))
        .route("/code/submission/user", get(code::list))
        .route("/code/:id", get(code::get).delete(code::delete))
        .route("/analysis/results", get(analysis::list))
        .route("/analysis/result/:submission_id", get(analysis::by_submission))
        .route("/analysis/:id", get(analysis::get))
        // STOMP over WebSocket
        .route("/ws", get(ws::upgrade))
}

/// Load the account behind an authenticated request.
pub(crate) async fn caller(state: &AppState, auth: &AuthUser) -> Result<User> {
    Ok(database::user::get_user_by_email(state.db.pool(), &auth.0.email).await?)
}
