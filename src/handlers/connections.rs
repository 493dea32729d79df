//! # Connections API Handlers
//!
//! Connection status listing for the app UI: one row per platform the user
//! has authorized, with token presence flags instead of token material.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::repositories::ConnectionRepository;
use crate::server::AppState;

use super::{UserQuery, require_user_id};

/// Connection information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionInfo {
    /// Unique identifier for the connection
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Platform slug (e.g., "tiktok", "youtube")
    pub platform: String,
    /// External account id on the platform
    pub platform_user_id: String,
    /// Whether the connection is currently usable
    pub is_active: bool,
    /// Set when a refresh failed permanently and the user must re-authorize
    pub needs_reconnect: bool,
    /// Access token expiry as RFC 3339, null for non-expiring tokens
    pub expires_at: Option<String>,
    /// Granted scope in the platform's delimited form
    pub scope: Option<String>,
    /// Profile snapshot captured at connect time
    pub profile_data: serde_json::Value,
    /// Indicates whether an encrypted access token is stored
    #[schema(default = false, example = true)]
    pub has_access_token: bool,
    /// Indicates whether an encrypted refresh token is stored
    #[schema(default = false, example = true)]
    pub has_refresh_token: bool,
    /// Version of encryption format used for stored tokens
    #[schema(default = 1, example = 1)]
    pub token_encryption_version: u8,
    /// When the connection was first established, as RFC 3339
    pub connected_at: String,
}

impl From<crate::models::connection::Model> for ConnectionInfo {
    fn from(model: crate::models::connection::Model) -> Self {
        Self {
            id: model.id,
            platform: model.platform,
            platform_user_id: model.platform_user_id,
            is_active: model.is_active,
            needs_reconnect: model.needs_reconnect,
            expires_at: model.expires_at.map(rfc3339),
            scope: model.scope,
            profile_data: model.profile_data.unwrap_or_default(),
            has_access_token: model.access_token_ciphertext.is_some(),
            has_refresh_token: model.refresh_token_ciphertext.is_some(),
            // Current encrypted format carries version byte 0x01
            token_encryption_version: 1,
            connected_at: rfc3339(model.created_at),
        }
    }
}

fn rfc3339(value: sea_orm::prelude::DateTimeWithTimeZone) -> String {
    let utc: DateTime<Utc> = value.with_timezone(&Utc);
    utc.to_rfc3339()
}

/// Response wrapper for connections listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionsResponse {
    /// One entry per platform the user has connected, ordered by platform
    pub connections: Vec<ConnectionInfo>,
}

/// Lists a user's platform connections
///
/// At most one row per platform, six platforms total; no pagination.
#[utoipa::path(
    get,
    path = "/connections",
    params(UserQuery),
    responses(
        (status = 200, description = "List of the user's connections", body = ConnectionsResponse, example = json!({
            "connections": [
                {
                    "id": "550e8400-e29b-41d4-a716-446655440000",
                    "platform": "tiktok",
                    "platform_user_id": "open-id-123",
                    "is_active": true,
                    "needs_reconnect": false,
                    "expires_at": "2026-01-31T23:59:59+00:00",
                    "scope": "user.info.basic,video.publish",
                    "profile_data": {"display_name": "creator"},
                    "has_access_token": true,
                    "has_refresh_token": true,
                    "token_encryption_version": 1,
                    "connected_at": "2025-12-01T10:00:00+00:00"
                }
            ]
        })),
        (status = 400, description = "Missing user_id query parameter", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn list_connections(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    let user_id = require_user_id(&query)?;

    let connection_repo =
        ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let connections = connection_repo.find_by_user(user_id).await?;

    Ok(Json(ConnectionsResponse {
        connections: connections.into_iter().map(ConnectionInfo::from).collect(),
    }))
}
