//! API route definitions
//!
//! - `/upload`, `/delete-all` - device-facing, API-key guarded
//! - `/health` - liveness and store reachability
//! - `/api/roadpoints`, `/api/stats` - map dashboard reads
//! - `/api/delete-point/:id` - admin removal of one cluster

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, ApiState};

/// Dashboard and admin routes, nested under `/api`
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/roadpoints", get(handlers::get_road_points))
        .route("/stats", get(handlers::get_stats))
        .route("/delete-point/:id", post(handlers::delete_point))
        .with_state(state)
}

/// Root-level device and health routes
pub fn device_routes(state: ApiState) -> Router {
    Router::new()
        .route("/upload", post(handlers::upload))
        .route("/delete-all", post(handlers::delete_all))
        .route("/health", get(handlers::health_check))
        .with_state(state)
}
