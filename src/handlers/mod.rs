//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the Social
//! Connect API.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod callback;
pub mod connect;
pub mod connections;
pub mod settings;
pub mod tokens;

/// Query parameters identifying the acting user
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    /// User whose connection is being operated on
    pub user_id: Option<Uuid>,
}

pub(crate) fn require_user_id(query: &UserQuery) -> Result<Uuid, ApiError> {
    query.user_id.ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "user_id query parameter is required",
        )
    })
}

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness and database reachability probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service healthy", body = ServiceInfo),
        (status = 503, description = "Database unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<ServiceInfo>, ApiError> {
    crate::db::health_check(&state.db).await.map_err(|err| {
        tracing::error!(error = ?err, "Health check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Database is unreachable",
        )
    })?;

    Ok(Json(ServiceInfo::default()))
}
