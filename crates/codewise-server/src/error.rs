//! Error types for the HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use database::{DatabaseError, ValidationError};
use thiserror::Error;

use crate::identity::IdentityError;
use crate::oauth::{OAuthError, ProvisionError};

/// Errors returned by REST handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid bearer token.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error("Database error: {0}")]
    Database(DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity: "User", id } => ApiError::UserNotFound(id),
            DatabaseError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{entity} not found: {id}"))
            }
            DatabaseError::AlreadyExists { .. } | DatabaseError::Invalid(_) => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::Database(other),
        }
    }
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::OAuth(e) => ApiError::OAuth(e),
            ProvisionError::Database(e) => e.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(err: bcrypt::BcryptError) -> Self {
        ApiError::Internal(format!("password hashing failed: {err}"))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Identity(IdentityError::UnknownUser(_)) => StatusCode::BAD_REQUEST,
            ApiError::Identity(_) => StatusCode::UNAUTHORIZED,
            ApiError::UserNotFound(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::OAuth(OAuthError::UnknownProvider(_)) => StatusCode::NOT_FOUND,
            ApiError::OAuth(_) => StatusCode::BAD_REQUEST,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, %status, "Request rejected");
        }

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}

/// Result type for handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
