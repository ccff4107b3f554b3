//! JSON error body for the dashboard and admin endpoints.
//!
//! Device uploads answer in plain text; failures under `/api` are
//! `{ "error": { "code", "message" }, "version" }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// A query parameter is out of range.
    #[error("invalid `{param}`: {reason}")]
    InvalidParam {
        param: &'static str,
        reason: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DashboardError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidParam { .. } => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParam { .. } => "BAD_REQUEST",
            Self::Store(_) => "STORAGE_UNAVAILABLE",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
    version: &'static str,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        if let Self::Store(e) = &self {
            tracing::error!(error = %e, "Cluster store request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
            version: env!("CARGO_PKG_VERSION"),
        };
        (self.status(), Json(body)).into_response()
    }
}
