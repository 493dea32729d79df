//! # Integration Settings Handlers
//!
//! Admin CRUD for per-platform OAuth app credentials. Secrets are encrypted
//! at rest and only ever returned masked; clearing a stored secret means
//! deleting the row and re-creating it without one.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use url::Url;
use utoipa::ToSchema;

use crate::auth::AdminAuth;
use crate::crypto::mask_secret;
use crate::error::{ApiError, not_found};
use crate::models::integration_setting;
use crate::repositories::{IntegrationSettingRepository, SettingsUpdate};
use crate::server::AppState;

use super::connect::{PlatformPath, parse_platform};

const ENVIRONMENTS: &[&str] = &["production", "sandbox", "development"];

/// Request body for creating or updating a platform's integration settings
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertIntegrationSettingRequest {
    /// App id / client key issued by the platform
    pub client_id: String,
    /// Client secret; omit to keep the stored one unchanged
    pub client_secret: Option<String>,
    /// production, sandbox, or development
    pub environment: Option<String>,
    /// Overrides the default callback URL when set
    pub callback_url: Option<String>,
    /// Stored for platform app configuration; not used by this service
    pub webhook_url: Option<String>,
    /// Platform-specific extras (e.g. Graph API version)
    pub config_data: Option<JsonValue>,
    pub is_active: Option<bool>,
}

/// Integration settings with the secret masked
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IntegrationSettingResponse {
    pub platform: String,
    pub client_id: String,
    /// Masked client secret; null when none is stored
    pub client_secret_masked: Option<String>,
    pub environment: String,
    pub callback_url: Option<String>,
    pub webhook_url: Option<String>,
    pub config_data: Option<JsonValue>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Delete confirmation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteIntegrationSettingResponse {
    pub success: bool,
}

fn to_response(
    repo: &IntegrationSettingRepository,
    model: integration_setting::Model,
) -> IntegrationSettingResponse {
    let client_secret_masked = match repo.decrypt_client_secret(&model) {
        Ok(secret) => secret.map(|value| mask_secret(&value)),
        Err(err) => {
            tracing::warn!(
                platform = %model.platform,
                error = ?err,
                "Stored client secret could not be decrypted for masking"
            );
            Some("******".to_string())
        }
    };

    IntegrationSettingResponse {
        platform: model.platform,
        client_id: model.client_id,
        client_secret_masked,
        environment: model.environment,
        callback_url: model.callback_url,
        webhook_url: model.webhook_url,
        config_data: model.config_data,
        is_active: model.is_active,
        created_at: model.created_at.with_timezone(&Utc).to_rfc3339(),
        updated_at: model.updated_at.with_timezone(&Utc).to_rfc3339(),
    }
}

fn validate_settings_request(request: &UpsertIntegrationSettingRequest) -> Result<(), ApiError> {
    if request.client_id.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "client_id must not be empty",
        ));
    }

    if matches!(request.client_secret.as_deref(), Some("")) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "client_secret must not be empty when provided",
        ));
    }

    if let Some(environment) = request.environment.as_deref() {
        if !ENVIRONMENTS.contains(&environment) {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "environment must be one of production, sandbox, development",
            ));
        }
    }

    if let Some(callback_url) = request.callback_url.as_deref() {
        let valid = Url::parse(callback_url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !valid {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "callback_url must be a valid http(s) URL",
            ));
        }
    }

    Ok(())
}

/// List integration settings for all platforms
#[utoipa::path(
    get,
    path = "/admin/integrations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Stored integration settings, secrets masked", body = [IntegrationSettingResponse]),
        (status = 401, description = "Missing or invalid admin token", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn list_integration_settings(
    State(state): State<AppState>,
    _admin: AdminAuth,
) -> Result<Json<Vec<IntegrationSettingResponse>>, ApiError> {
    let repo =
        IntegrationSettingRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let rows = repo.list_all().await?;

    Ok(Json(
        rows.into_iter().map(|row| to_response(&repo, row)).collect(),
    ))
}

/// Fetch one platform's integration settings
#[utoipa::path(
    get,
    path = "/admin/integrations/{platform}",
    security(("bearer_auth" = [])),
    params(
        ("platform" = String, Path, description = "Platform identifier (snake_case, e.g., 'tiktok')")
    ),
    responses(
        (status = 200, description = "Integration settings, secret masked", body = IntegrationSettingResponse),
        (status = 401, description = "Missing or invalid admin token", body = ApiError),
        (status = 404, description = "Platform unknown or nothing stored for it", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn get_integration_setting(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(platform_path): Path<PlatformPath>,
) -> Result<Json<IntegrationSettingResponse>, ApiError> {
    let platform = parse_platform(&platform_path.platform)?;

    let repo =
        IntegrationSettingRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let row = repo
        .find_by_platform(platform)
        .await?
        .ok_or_else(|| not_found(&format!("No integration settings stored for {}", platform)))?;

    Ok(Json(to_response(&repo, row)))
}

/// Create or update a platform's integration settings
///
/// An omitted client_secret keeps the stored one; database settings take
/// precedence over environment fallback credentials immediately.
#[utoipa::path(
    put,
    path = "/admin/integrations/{platform}",
    security(("bearer_auth" = [])),
    params(
        ("platform" = String, Path, description = "Platform identifier (snake_case, e.g., 'tiktok')")
    ),
    request_body = UpsertIntegrationSettingRequest,
    responses(
        (status = 200, description = "Settings stored, secret masked in the response", body = IntegrationSettingResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Missing or invalid admin token", body = ApiError),
        (status = 404, description = "Platform not found", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn upsert_integration_setting(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(platform_path): Path<PlatformPath>,
    Json(request): Json<UpsertIntegrationSettingRequest>,
) -> Result<Json<IntegrationSettingResponse>, ApiError> {
    let platform = parse_platform(&platform_path.platform)?;
    validate_settings_request(&request)?;

    let repo =
        IntegrationSettingRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let row = repo
        .upsert(
            platform,
            SettingsUpdate {
                client_id: request.client_id.trim().to_string(),
                client_secret: request.client_secret,
                environment: request.environment,
                callback_url: request.callback_url,
                webhook_url: request.webhook_url,
                config_data: request.config_data,
                is_active: request.is_active,
            },
        )
        .await?;

    tracing::info!(platform = %platform, "Integration settings updated");
    Ok(Json(to_response(&repo, row)))
}

/// Delete a platform's integration settings
///
/// Environment fallback credentials take over once the row is gone.
#[utoipa::path(
    delete,
    path = "/admin/integrations/{platform}",
    security(("bearer_auth" = [])),
    params(
        ("platform" = String, Path, description = "Platform identifier (snake_case, e.g., 'tiktok')")
    ),
    responses(
        (status = 200, description = "Settings deleted", body = DeleteIntegrationSettingResponse),
        (status = 401, description = "Missing or invalid admin token", body = ApiError),
        (status = 404, description = "Platform unknown or nothing stored for it", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn delete_integration_setting(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(platform_path): Path<PlatformPath>,
) -> Result<Json<DeleteIntegrationSettingResponse>, ApiError> {
    let platform = parse_platform(&platform_path.platform)?;

    let repo =
        IntegrationSettingRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let removed = repo.delete_by_platform(platform).await?;
    if !removed {
        return Err(not_found(&format!(
            "No integration settings stored for {}",
            platform
        )));
    }

    tracing::info!(platform = %platform, "Integration settings deleted");
    Ok(Json(DeleteIntegrationSettingResponse { success: true }))
}
