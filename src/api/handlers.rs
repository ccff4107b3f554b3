//! API handlers for device uploads, the map dashboard and admin actions

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::{AdminAuth, DeleteAuth, UploadAuth};
use super::error::DashboardError;
use crate::config::{AuthConfig, QueryConfig, RoadPulseConfig};
use crate::pipeline::{IngestError, IngestPipeline, IngestStatsSnapshot};
use crate::query::{self, ClusterStats, ClusterView};
use crate::sensors::parse_payload;
use crate::types::{ClusterId, ReadingError, SensorSample};

/// Shared state for all handlers
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<IngestPipeline>,
    pub auth: Arc<AuthConfig>,
    pub query: QueryConfig,
    pub max_body_bytes: usize,
}

impl ApiState {
    pub fn new(pipeline: Arc<IngestPipeline>, config: &RoadPulseConfig) -> Self {
        Self {
            pipeline,
            auth: Arc::new(config.auth.clone()),
            query: config.query.clone(),
            max_body_bytes: config.server.max_body_bytes,
        }
    }
}

// ============================================================================
// Device Upload
// ============================================================================

/// `application/x-www-form-urlencoded` body sent by the devices.
///
/// Fields are optional here so a missing field is reported as such rather
/// than as a generic form rejection.
#[derive(Debug, Deserialize)]
pub struct UploadForm {
    pub lat: Option<String>,
    pub long: Option<String>,
    /// `piezo,ax,ay,az`
    pub dati: Option<String>,
}

fn required(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// POST /upload
pub async fn upload(
    State(state): State<ApiState>,
    _auth: UploadAuth,
    Form(form): Form<UploadForm>,
) -> Response {
    let (Some(lat), Some(lon), Some(dati)) = (
        required(&form.lat),
        required(&form.long),
        required(&form.dati),
    ) else {
        return (StatusCode::BAD_REQUEST, "Incomplete data").into_response();
    };

    let (latitude, longitude) = match (lat.parse::<f64>(), lon.parse::<f64>()) {
        (Ok(lat), Ok(lon)) => (lat, lon),
        _ => return (StatusCode::BAD_REQUEST, "Data parsing error: coordinates").into_response(),
    };

    let (piezo_raw, motion) = match parse_payload(dati) {
        Ok(parsed) => parsed,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("Incorrect data format: {e}")).into_response()
        }
    };

    let sample = SensorSample {
        latitude,
        longitude,
        piezo_raw,
        motion,
    };

    match state.pipeline.ingest_sample(&sample).await {
        Ok(outcome) => (
            StatusCode::OK,
            format!("OK - State of the road {}", outcome.severity.color()),
        )
            .into_response(),
        Err(e) => ingest_error_response(e),
    }
}

fn ingest_error_response(err: IngestError) -> Response {
    match err {
        IngestError::InvalidInput(
            ReadingError::LatitudeOutOfRange(_) | ReadingError::LongitudeOutOfRange(_),
        ) => (StatusCode::BAD_REQUEST, "Invalid coordinates").into_response(),
        IngestError::InvalidInput(e) => {
            (StatusCode::BAD_REQUEST, format!("Incorrect data format: {e}")).into_response()
        }
        IngestError::MergeConflict { id, attempts } => {
            tracing::warn!(cluster_id = id, attempts, "Upload dropped after merge conflicts");
            (StatusCode::CONFLICT, "Cluster busy, retry later").into_response()
        }
        IngestError::Storage(e) => {
            tracing::error!(error = %e, "Upload failed: storage error");
            (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable").into_response()
        }
    }
}

// ============================================================================
// Dashboard Queries
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RoadPointsParams {
    pub days: Option<i64>,
}

/// GET /api/roadpoints?days=N
pub async fn get_road_points(
    State(state): State<ApiState>,
    Query(params): Query<RoadPointsParams>,
) -> Result<Json<Vec<ClusterView>>, DashboardError> {
    let days = params.days.unwrap_or(state.query.default_days);
    if days < 0 {
        return Err(DashboardError::InvalidParam {
            param: "days",
            reason: "must be >= 0",
        });
    }

    let points =
        query::list_clusters(state.pipeline.store().as_ref(), Utc::now(), Some(days)).await?;
    tracing::debug!(points = points.len(), days, "Road points served");
    Ok(Json(points))
}

/// GET /api/stats
pub async fn get_stats(State(state): State<ApiState>) -> Result<Json<ClusterStats>, DashboardError> {
    let stats = query::collect_stats(
        state.pipeline.store().as_ref(),
        state.query.meters_per_cluster,
    )
    .await?;
    Ok(Json(stats))
}

// ============================================================================
// Admin
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
    pub message: &'static str,
}

/// POST /api/delete-point/:id
pub async fn delete_point(
    State(state): State<ApiState>,
    _auth: AdminAuth,
    Path(id): Path<ClusterId>,
) -> Result<Response, DashboardError> {
    if !state.pipeline.store().delete(id).await? {
        let body = StatusMessage {
            status: "error",
            message: "Point not found",
        };
        return Ok((StatusCode::NOT_FOUND, Json(body)).into_response());
    }

    tracing::info!(cluster_id = id, "Cluster removed by admin");
    Ok(Json(StatusMessage {
        status: "success",
        message: "Point removed",
    })
    .into_response())
}

/// POST /delete-all
pub async fn delete_all(State(state): State<ApiState>, _auth: DeleteAuth) -> Response {
    match state.pipeline.store().clear().await {
        Ok(removed) => {
            tracing::warn!(removed, "All clusters deleted");
            (StatusCode::OK, "Deleted").into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Bulk delete failed");
            (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable").into_response()
        }
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
    pub clusters: Option<usize>,
    pub ingest: IngestStatsSnapshot,
}

/// GET /health
pub async fn health_check(State(state): State<ApiState>) -> Response {
    let store = state.pipeline.store();
    let (status, code, clusters) = match store.count().await {
        Ok(n) => ("ok", StatusCode::OK, Some(n)),
        Err(e) => {
            tracing::warn!(error = %e, "Health check: store unavailable");
            ("degraded", StatusCode::SERVICE_UNAVAILABLE, None)
        }
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            backend: store.backend_name(),
            clusters,
            ingest: state.pipeline.stats(),
        }),
    )
        .into_response()
}
