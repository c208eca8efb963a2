//! Database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// A registered account, identified by its email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Auto-incrementing ID.
    pub id: i64,
    /// Unique email address.
    pub email: String,
    /// bcrypt hash; `None` for social-login-only accounts.
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub role: Role,
    /// OAuth2 registration id (e.g. "google").
    pub provider: Option<String>,
    /// Provider-scoped subject.
    pub provider_id: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
}

/// Fields required to create a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
}

impl NewUser {
    /// A password account with the `USER` role.
    pub fn with_password(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: Some(password_hash.into()),
            role: Role::User,
            provider: None,
            provider_id: None,
        }
    }

    /// A password-less account linked to an external identity provider.
    pub fn with_provider(
        email: impl Into<String>,
        provider: impl Into<String>,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password_hash: None,
            role: Role::User,
            provider: Some(provider.into()),
            provider_id: Some(provider_id.into()),
        }
    }
}

/// One unit of submitted code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CodeSubmission {
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    pub code: String,
    /// Language tag (e.g. "python").
    pub language: String,
    /// Optional purpose tag (e.g. "security_hardening").
    pub purpose: Option<String>,
    pub submitted_at: String,
}

/// Fields required to create a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmission {
    pub user_id: i64,
    pub code: String,
    pub language: String,
    pub purpose: Option<String>,
}

/// The outcome of analysing one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: i64,
    /// The submission this result belongs to (1:1).
    pub submission_id: i64,
    pub summary: String,
    /// Serialized issue list.
    pub suggestions: String,
    pub maintainability_score: Option<f64>,
    pub readability_score: Option<f64>,
    pub bug_probability: Option<f64>,
    pub score: Option<i64>,
    pub created_at: String,
}

/// Fields required to create a result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewAnalysisResult {
    pub summary: String,
    pub suggestions: String,
    pub maintainability_score: Option<f64>,
    pub readability_score: Option<f64>,
    pub bug_probability: Option<f64>,
    pub score: Option<i64>,
}

/// A result joined with the identity of its owner.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct OwnedResult {
    #[sqlx(flatten)]
    pub result: AnalysisResult,
    pub user_id: i64,
    pub email: String,
}

/// A denormalized history row used for statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisHistory {
    pub id: i64,
    pub user_id: i64,
    pub language: Option<String>,
    pub purpose: Option<String>,
    /// Severity reported by the analyzer (e.g. "error", "warn").
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub idempotency_key: String,
    pub created_at: String,
}

/// Fields required to create a history row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewHistoryEntry {
    pub language: Option<String>,
    pub purpose: Option<String>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}
