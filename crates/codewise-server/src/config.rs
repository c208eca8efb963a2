//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use analyzer_client::AnalyzerConfig;
use axum::http::HeaderValue;
use secrecy::SecretString;

use crate::identity::ProvisioningPolicy;
use crate::routes::ws::WsPolicy;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address.
    pub addr: SocketAddr,
    /// SQLite database URL.
    pub database_url: String,
    /// AI analysis server settings.
    pub analyzer: AnalyzerConfig,
    /// HS256 signing secret for bearer tokens.
    pub jwt_secret: SecretString,
    /// Lifetime of issued tokens.
    pub jwt_validity: Duration,
    /// Origins allowed by CORS. Empty disables the CORS layer.
    pub cors_allowed_origins: Vec<HeaderValue>,
    /// Where the browser lands after OAuth2 login (token appended as `?token=`).
    pub frontend_redirect_url: String,
    /// bcrypt cost factor.
    pub bcrypt_cost: u32,
    /// Accept WebSocket CONNECT frames that carry no token.
    pub ws_allow_anonymous: bool,
    /// What to do with a valid token whose email has no account.
    pub ws_provisioning: ProvisioningPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `CODEWISE_ADDR` | Server bind address | `127.0.0.1:8080` |
    /// | `DATABASE_URL` | SQLite database URL | `sqlite:codewise.db?mode=rwc` |
    /// | `AI_SERVER_URL` | AI server base URL | (required) |
    /// | `AI_SERVER_TIMEOUT_SECS` | AI request timeout | (none) |
    /// | `JWT_SECRET` | Token signing secret | (required) |
    /// | `JWT_VALIDITY_SECS` | Token lifetime | `86400` |
    /// | `CORS_ALLOWED_ORIGINS` | Comma-separated origins | (empty) |
    /// | `FRONTEND_REDIRECT_URL` | OAuth2 completion redirect | `http://localhost:3000/oauth2/redirect` |
    /// | `BCRYPT_COST` | Password hashing cost | `12` |
    /// | `WS_ALLOW_ANONYMOUS` | Accept token-less CONNECT | `false` |
    /// | `WS_PROVISION_UNKNOWN_USERS` | Create accounts for unknown token emails | `false` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = env::var("CODEWISE_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:codewise.db?mode=rwc".to_string());

        let analyzer =
            AnalyzerConfig::from_env().map_err(|e| ConfigError::Analyzer(e.to_string()))?;

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from)
            .ok_or(ConfigError::MissingJwtSecret)?;

        let jwt_validity = Duration::from_secs(parse_or("JWT_VALIDITY_SECS", 86_400)?);

        let cors_allowed_origins = match env::var("CORS_ALLOWED_ORIGINS") {
            Ok(raw) => parse_origins(&raw)?,
            Err(_) => Vec::new(),
        };

        let frontend_redirect_url = env::var("FRONTEND_REDIRECT_URL")
            .unwrap_or_else(|_| "http://localhost:3000/oauth2/redirect".to_string());
        url::Url::parse(&frontend_redirect_url)
            .map_err(|_| ConfigError::InvalidValue("FRONTEND_REDIRECT_URL"))?;

        let bcrypt_cost = parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?;

        let ws_allow_anonymous = parse_flag("WS_ALLOW_ANONYMOUS");
        let ws_provisioning = if parse_flag("WS_PROVISION_UNKNOWN_USERS") {
            ProvisioningPolicy::AutoProvision
        } else {
            ProvisioningPolicy::Reject
        };

        Ok(Self {
            addr,
            database_url,
            analyzer,
            jwt_secret,
            jwt_validity,
            cors_allowed_origins,
            frontend_redirect_url,
            bcrypt_cost,
            ws_allow_anonymous,
            ws_provisioning,
        })
    }

    /// WebSocket CONNECT policy derived from this configuration.
    pub fn ws_policy(&self) -> WsPolicy {
        WsPolicy {
            allow_anonymous: self.ws_allow_anonymous,
            provisioning: self.ws_provisioning,
        }
    }
}

fn parse_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(var)),
        Err(_) => Ok(default),
    }
}

fn parse_flag(var: &str) -> bool {
    env::var(var)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

/// Parse a comma-separated origin list.
pub fn parse_origins(raw: &str) -> Result<Vec<HeaderValue>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| ConfigError::InvalidOrigin(origin.to_string()))
        })
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid CODEWISE_ADDR format")]
    InvalidAddr,

    #[error("JWT_SECRET environment variable is required")]
    MissingJwtSecret,

    #[error("Analyzer configuration: {0}")]
    Analyzer(String),

    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),

    #[error("Invalid CORS origin: {0}")]
    InvalidOrigin(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        let origins =
            parse_origins("https://codewise.example, https://api.codewise.example ,").unwrap();
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[1], "https://api.codewise.example");
    }

    #[test]
    fn test_parse_origins_rejects_control_characters() {
        assert!(matches!(
            parse_origins("https://ok.example,bad\norigin"),
            Err(ConfigError::InvalidOrigin(_))
        ));
    }
}
