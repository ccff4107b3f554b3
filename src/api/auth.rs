//! API key extractors
//!
//! Each guarded endpoint names the key it needs by taking one of these
//! extractors. The key travels in the `X-API-KEY` header. A key left empty
//! in the config disables its endpoint.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::handlers::ApiState;
use crate::config::AuthConfig;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Device allowed to upload readings
pub struct UploadAuth;

/// Caller allowed to wipe every cluster
pub struct DeleteAuth;

/// Caller allowed to remove single clusters
pub struct AdminAuth;

type Rejection = (StatusCode, Json<ErrorResponse>);

fn forbidden() -> Rejection {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: "Unauthorized access".to_string(),
        }),
    )
}

fn check_key(parts: &Parts, expected: &str, scope: &'static str) -> Result<(), Rejection> {
    if expected.is_empty() {
        tracing::warn!(scope, "Request to endpoint with no key configured");
        return Err(forbidden());
    }

    let presented = parts
        .headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if presented == Some(expected) {
        Ok(())
    } else {
        tracing::warn!(
            scope,
            path = %parts.uri.path(),
            key_present = presented.is_some(),
            "Rejected request with invalid API key"
        );
        Err(forbidden())
    }
}

macro_rules! key_extractor {
    ($name:ident, $field:ident, $scope:literal) => {
        #[async_trait]
        impl FromRequestParts<ApiState> for $name {
            type Rejection = Rejection;

            async fn from_request_parts(
                parts: &mut Parts,
                state: &ApiState,
            ) -> Result<Self, Self::Rejection> {
                let auth: &AuthConfig = &state.auth;
                check_key(parts, &auth.$field, $scope).map(|()| $name)
            }
        }
    };
}

key_extractor!(UploadAuth, upload_key, "upload");
key_extractor!(DeleteAuth, delete_key, "delete");
key_extractor!(AdminAuth, admin_key, "admin");
