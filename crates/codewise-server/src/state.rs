//! Application state shared across handlers.

use std::sync::Arc;

use analyzer_client::Analyzer;
use database::Database;

use crate::broker::Broker;
use crate::identity::TokenService;
use crate::oauth::{OAuthProvider, OAuthRegistry};
use crate::password::PasswordHasher;
use crate::relay::RelayController;
use crate::routes::ws::WsPolicy;

const DEFAULT_FRONTEND_REDIRECT: &str = "http://localhost:3000/oauth2/redirect";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection.
    pub db: Database,
    pub tokens: TokenService,
    pub passwords: PasswordHasher,
    /// STOMP broker for WebSocket sessions.
    pub broker: Broker,
    pub relay: RelayController,
    pub ws_policy: WsPolicy,
    pub oauth: Arc<OAuthRegistry>,
    pub frontend_redirect_url: String,
}

impl AppState {
    /// Create new application state with default policies.
    pub fn new(db: Database, analyzer: Arc<dyn Analyzer>, tokens: TokenService) -> Self {
        let broker = Broker::new();
        let relay = RelayController::new(db.clone(), analyzer, broker.clone());
        Self {
            db,
            tokens,
            passwords: PasswordHasher::default(),
            broker,
            relay,
            ws_policy: WsPolicy::default(),
            oauth: Arc::new(OAuthRegistry::default()),
            frontend_redirect_url: DEFAULT_FRONTEND_REDIRECT.to_string(),
        }
    }

    pub fn with_passwords(mut self, passwords: PasswordHasher) -> Self {
        self.passwords = passwords;
        self
    }

    pub fn with_ws_policy(mut self, policy: WsPolicy) -> Self {
        self.ws_policy = policy;
        self
    }

    pub fn with_frontend_redirect(mut self, url: impl Into<String>) -> Self {
        self.frontend_redirect_url = url.into();
        self
    }

    pub fn with_oauth_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        Arc::make_mut(&mut self.oauth).register(provider);
        self
    }
}
