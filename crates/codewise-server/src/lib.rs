//! CodeWise backend.
//!
//! REST endpoints for accounts, submissions, results and history, plus a
//! STOMP-over-WebSocket relay that forwards `/app/analyze` messages to the AI
//! analysis server and pushes results to `/user/queue/result`.

pub mod broker;
pub mod config;
pub mod error;
pub mod identity;
pub mod oauth;
pub mod password;
pub mod relay;
pub mod routes;
pub mod state;
pub mod stomp;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;

/// Build the full application: routes, state, CORS and request tracing.
pub fn app(state: AppState, cors_origins: &[HeaderValue]) -> Router {
    let router = routes::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_origins.is_empty() {
        return router;
    }

    router.layer(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(cors_origins.iter().cloned()))
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true),
    )
}
