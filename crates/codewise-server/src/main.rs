//! CodeWise backend server.

use std::sync::Arc;

use analyzer_client::AnalyzerClient;
use codewise_server::identity::TokenService;
use codewise_server::password::PasswordHasher;
use codewise_server::{AppState, Config};
use database::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(addr = %config.addr, "Starting CodeWise server");

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    let analyzer = AnalyzerClient::new(config.analyzer.clone())?;
    info!(url = %config.analyzer.base_url, "Analyzer configured");

    let state = AppState::new(
        db,
        Arc::new(analyzer),
        TokenService::new(&config.jwt_secret, config.jwt_validity),
    )
    .with_passwords(PasswordHasher::new(config.bcrypt_cost))
    .with_ws_policy(config.ws_policy())
    .with_frontend_redirect(config.frontend_redirect_url.clone());

    let app = codewise_server::app(state, &config.cors_allowed_origins);

    info!(addr = %config.addr, "CodeWise server listening");
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
