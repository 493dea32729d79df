//! # Token Endpoint Handlers
//!
//! Explicit token refresh and disconnect for a user's platform connection.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, not_found};
use crate::repositories::ConnectionRepository;
use crate::server::AppState;

use super::connect::{PlatformPath, parse_platform};
use super::{UserQuery, require_user_id};

/// Refresh token response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshTokenResponse {
    pub success: bool,
    /// Lifetime of the renewed token in seconds; null when the platform does
    /// not report one
    pub expires_in: Option<i64>,
}

/// Disconnect response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DisconnectResponse {
    pub success: bool,
}

/// Force a token refresh for a user's connection
///
/// Renews the stored token regardless of expiry. Unlike the lazy path this
/// surfaces the reason when the platform refuses, including the Threads
/// minimum-age rejection.
#[utoipa::path(
    post,
    path = "/auth/{platform}/refresh-token",
    params(
        ("platform" = String, Path, description = "Platform identifier (snake_case, e.g., 'tiktok')"),
        UserQuery
    ),
    responses(
        (status = 200, description = "Token refreshed", body = RefreshTokenResponse),
        (status = 400, description = "Missing user_id or refresh precondition failed", body = ApiError),
        (status = 404, description = "Platform not found or no active connection", body = ApiError),
        (status = 429, description = "Platform rate limited the refresh", body = ApiError),
        (status = 502, description = "Platform rejected the refresh", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Path(platform_path): Path<PlatformPath>,
    Query(query): Query<UserQuery>,
) -> Result<Json<RefreshTokenResponse>, ApiError> {
    let platform = parse_platform(&platform_path.platform)?;
    let user_id = require_user_id(&query)?;

    let outcome = state.token_manager.refresh_now(user_id, platform).await?;

    Ok(Json(RefreshTokenResponse {
        success: true,
        expires_in: outcome.expires_in,
    }))
}

/// Disconnect a user's platform connection
///
/// Soft-deactivates the row and clears the stored token ciphertexts. The row
/// itself is kept so the UI can still show the account was once connected.
#[utoipa::path(
    post,
    path = "/auth/{platform}/disconnect",
    params(
        ("platform" = String, Path, description = "Platform identifier (snake_case, e.g., 'tiktok')"),
        UserQuery
    ),
    responses(
        (status = 200, description = "Connection disconnected", body = DisconnectResponse),
        (status = 400, description = "Missing user_id query parameter", body = ApiError),
        (status = 404, description = "Platform not found or no connection for this user", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn disconnect(
    State(state): State<AppState>,
    Path(platform_path): Path<PlatformPath>,
    Query(query): Query<UserQuery>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    let platform = parse_platform(&platform_path.platform)?;
    let user_id = require_user_id(&query)?;

    let connection_repo =
        ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let removed = connection_repo.deactivate_and_clear(user_id, platform).await?;
    if !removed {
        return Err(not_found(&format!(
            "No {} connection for this user",
            platform
        )));
    }

    tracing::info!(user_id = %user_id, platform = %platform, "Connection disconnected");
    Ok(Json(DisconnectResponse { success: true }))
}
