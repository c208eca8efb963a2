//! Bearer-token identity.
//!
//! Tokens are HS256 JWTs carrying the account email. The same validation is
//! used by REST handlers (via [`AuthUser`]) and by the WebSocket CONNECT
//! handshake, which produces an [`IdentityContext`] for the session.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ApiError;
use crate::state::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Identity failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
///
/// Only `exp` is required; the identity comes from `email` or `sub`.
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    pub exp: u64,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub email: String,
}

/// What to do when a valid token names an email with no account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProvisioningPolicy {
    /// Refuse the connection.
    #[default]
    Reject,
    /// Create a password-less account bound to the token.
    AutoProvision,
}

/// Identity of one WebSocket session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    pub session_id: String,
    pub principal: Option<Principal>,
}

impl IdentityContext {
    pub fn authenticated(session_id: impl Into<String>, principal: Principal) -> Self {
        Self {
            session_id: session_id.into(),
            principal: Some(principal),
        }
    }

    pub fn anonymous(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            principal: None,
        }
    }

    /// Key used for routing replies: the email, or the session id when anonymous.
    pub fn user_key(&self) -> &str {
        match &self.principal {
            Some(p) => &p.email,
            None => &self.session_id,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.principal.is_none()
    }
}

/// Issues and validates bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    inner: Arc<TokenKeys>,
}

struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validity: Duration,
}

impl TokenService {
    pub fn new(secret: &SecretString, validity: Duration) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            inner: Arc::new(TokenKeys {
                encoding: EncodingKey::from_secret(bytes),
                decoding: DecodingKey::from_secret(bytes),
                validity,
            }),
        }
    }

    pub fn validity(&self) -> Duration {
        self.inner.validity
    }

    /// Issue a token for `email`, valid from now for the configured lifetime.
    pub fn issue(&self, email: &str) -> Result<String, IdentityError> {
        let iat = now_secs();
        let claims = Claims {
            sub: Some(email.to_string()),
            email: Some(email.to_string()),
            iat: Some(iat),
            exp: iat + self.inner.validity.as_secs(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.inner.encoding)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))
    }

    /// Validate a raw token and extract the caller.
    ///
    /// The `email` claim wins over `sub`.
    pub fn validate(&self, token: &str) -> Result<Principal, IdentityError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<Claims>(token, &self.inner.decoding, &validation)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

        let claims = data.claims;
        let email = claims
            .email
            .filter(|e| !e.trim().is_empty())
            .or_else(|| claims.sub.filter(|s| !s.trim().is_empty()))
            .ok_or_else(|| IdentityError::InvalidToken("token carries no identity".to_string()))?;

        Ok(Principal { email })
    }

    /// Resolve an `Authorization` header value.
    pub fn resolve_bearer(&self, header: Option<&str>) -> Result<Principal, IdentityError> {
        self.validate(bearer_token(header)?)
    }
}

/// Strip the `Bearer ` prefix from an `Authorization` header value.
///
/// Any other scheme counts as no token at all.
pub fn bearer_token(header: Option<&str>) -> Result<&str, IdentityError> {
    let value = header.ok_or(IdentityError::MissingToken)?;
    let token = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(IdentityError::MissingToken)?
        .trim();
    if token.is_empty() {
        return Err(IdentityError::MissingToken);
    }
    Ok(token)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Extractor for handlers that require a signed-in caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let principal = state.tokens.resolve_bearer(header)?;
        Ok(AuthUser(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(
            &SecretString::from("test-secret-test-secret-test-secret".to_string()),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_issue_and_validate() {
        let tokens = service();
        let token = tokens.issue("dev@codewise.io").unwrap();
        let principal = tokens.validate(&token).unwrap();
        assert_eq!(principal.email, "dev@codewise.io");
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = service().issue("dev@codewise.io").unwrap();
        let other = TokenService::new(
            &SecretString::from("another-secret".to_string()),
            Duration::from_secs(3600),
        );
        assert!(matches!(
            other.validate(&token),
            Err(IdentityError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let secret = "test-secret-test-secret-test-secret";
        let claims = Claims {
            sub: Some("dev@codewise.io".to_string()),
            email: None,
            iat: Some(1_000),
            exp: 2_000,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            service().validate(&token),
            Err(IdentityError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_subject_is_fallback_identity() {
        let secret = "test-secret-test-secret-test-secret";
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({"sub": "sub@codewise.io", "exp": now_secs() + 60}),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        assert_eq!(service().validate(&token).unwrap().email, "sub@codewise.io");
    }

    #[test]
    fn test_email_only_token_is_accepted() {
        let secret = "test-secret-test-secret-test-secret";
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({"email": "e@codewise.io", "exp": now_secs() + 600}),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        assert_eq!(service().validate(&token).unwrap().email, "e@codewise.io");
    }

    #[test]
    fn test_token_without_identity_is_rejected() {
        let secret = "test-secret-test-secret-test-secret";
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({"email": " ", "exp": now_secs() + 600}),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            service().validate(&token),
            Err(IdentityError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert!(matches!(bearer_token(None), Err(IdentityError::MissingToken)));
        assert!(matches!(
            bearer_token(Some("Basic abc")),
            Err(IdentityError::MissingToken)
        ));
        assert!(matches!(
            bearer_token(Some("Bearer ")),
            Err(IdentityError::MissingToken)
        ));
        assert_eq!(bearer_token(Some("Bearer abc.def")).unwrap(), "abc.def");
    }

    #[test]
    fn test_user_key() {
        let anon = IdentityContext::anonymous("s-1");
        assert_eq!(anon.user_key(), "s-1");
        assert!(anon.is_anonymous());

        let named = IdentityContext::authenticated(
            "s-2",
            Principal {
                email: "a@x.com".to_string(),
            },
        );
        assert_eq!(named.user_key(), "a@x.com");
    }
}
