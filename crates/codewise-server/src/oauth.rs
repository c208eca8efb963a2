//! OAuth2 social login.
//!
//! The authorization-code exchange itself is delegated to an
//! [`OAuthProvider`]; this module maps the resulting profile onto a local
//! account and builds the frontend redirect.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use database::models::{NewUser, User};
use database::{user, Database, DatabaseError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("unknown OAuth2 provider: {0}")]
    UnknownProvider(String),

    #[error("authorization code exchange failed: {0}")]
    Exchange(String),

    #[error("provider did not return an email address")]
    MissingEmail,
}

/// Identity returned by a provider after a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider: String,
    pub provider_id: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Registration id used in the callback path (e.g. "google").
    fn registration_id(&self) -> &str;

    async fn exchange(&self, code: &str) -> Result<OAuthProfile, OAuthError>;
}

/// Providers keyed by registration id.
#[derive(Clone, Default)]
pub struct OAuthRegistry {
    providers: HashMap<String, Arc<dyn OAuthProvider>>,
}

impl OAuthRegistry {
    pub fn register(&mut self, provider: Arc<dyn OAuthProvider>) {
        self.providers
            .insert(provider.registration_id().to_string(), provider);
    }

    pub fn get(&self, registration_id: &str) -> Result<&Arc<dyn OAuthProvider>, OAuthError> {
        self.providers
            .get(registration_id)
            .ok_or_else(|| OAuthError::UnknownProvider(registration_id.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Find or create the local account for `profile`.
///
/// Lookup goes by provider pair first (refreshing the email if the provider
/// reports a new one), then by email. An existing email account without a
/// provider gets linked.
pub async fn provision_user(db: &Database, profile: &OAuthProfile) -> Result<User, ProvisionError> {
    let pool = db.pool();
    let email = profile.email.as_deref().filter(|e| !e.trim().is_empty());

    if let Some(mut existing) =
        user::find_user_by_provider(pool, &profile.provider, &profile.provider_id).await?
    {
        if let Some(email) = email.filter(|e| *e != existing.email) {
            info!(old = %existing.email, new = email, "Refreshing email from provider");
            existing.email = email.to_string();
            user::update_user(pool, &existing).await?;
        }
        return Ok(existing);
    }

    let email = email.ok_or(OAuthError::MissingEmail)?;

    match user::find_user_by_email(pool, email).await? {
        Some(existing) if existing.provider.is_none() => {
            info!(email, provider = %profile.provider, "Linking provider to existing account");
            Ok(user::link_provider(pool, existing.id, &profile.provider, &profile.provider_id).await?)
        }
        Some(existing) => Ok(existing),
        None => {
            info!(email, provider = %profile.provider, "Creating account from OAuth2 login");
            Ok(user::create_user(
                pool,
                &NewUser::with_provider(email, &profile.provider, &profile.provider_id),
            )
            .await?)
        }
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Append `token` to the frontend redirect URL.
pub fn redirect_url(base: &str, token: &str) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(base)?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}
