//! REST API module using Axum
//!
//! Device uploads, map dashboard queries and admin actions. See
//! [`routes`] for the endpoint list.

pub mod auth;
pub mod error;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::http::{header, HeaderName, Method};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Env var listing extra CORS origins, comma-separated
pub const CORS_ENV_VAR: &str = "ROADPULSE_CORS_ORIGINS";

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `ROADPULSE_CORS_ORIGINS` to a comma-separated list of allowed origins
/// when the dashboard is served from elsewhere.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(auth::API_KEY_HEADER),
        ]);

    match std::env::var(CORS_ENV_VAR) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    let body_limit = state.max_body_bytes;

    Router::new()
        .nest("/api", routes::api_routes(state.clone()))
        .merge(routes::device_routes(state))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer())
}
