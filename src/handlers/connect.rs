//! # Authorization Handlers
//!
//! Starts the OAuth flow for a platform: generates the CSRF state (and PKCE
//! pair where the platform uses one), persists it server-side, and returns
//! the provider consent URL.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::credentials::CredentialsError;
use crate::error::ApiError;
use crate::pkce::{generate_pkce_pair, generate_state_token};
use crate::platforms::Platform;
use crate::repositories::OAuthStateRepository;
use crate::server::AppState;

/// How long a persisted state stays valid before the callback must arrive
const STATE_TTL_MINUTES: i64 = 10;

/// Request path parameter for platform name
#[derive(Debug, Deserialize, ToSchema)]
pub struct PlatformPath {
    /// Platform identifier (snake_case, e.g., "tiktok")
    pub platform: String,
}

/// Query parameters for starting an authorization flow
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct AuthorizeQuery {
    /// Application user starting the flow
    pub user_id: Option<Uuid>,
}

/// OAuth authorization URL response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeResponse {
    /// Complete authorization URL for user redirection
    /// Must be HTTPS, valid per RFC 3986, max 2048 chars, no fragment
    pub authorization_url: String,
    /// State token embedded in the URL, returned for client-side bookkeeping
    pub state: String,
}

/// Parses the path segment into a supported platform, or a 404.
pub(crate) fn parse_platform(raw: &str) -> Result<Platform, ApiError> {
    Platform::from_str(raw).map_err(|_| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("platform '{}' not found", raw),
        )
    })
}

/// Start OAuth flow for a platform
///
/// Generates a single-use state token, persists it with a short TTL, and
/// returns the provider consent URL the client should redirect the user to.
#[utoipa::path(
    get,
    path = "/auth/{platform}",
    params(
        ("platform" = String, Path, description = "Platform identifier (snake_case, e.g., 'tiktok')"),
        AuthorizeQuery
    ),
    responses(
        (status = 200, description = "OAuth authorization URL generated successfully", body = AuthorizeResponse),
        (status = 400, description = "Missing user_id query parameter", body = ApiError),
        (status = 404, description = "Platform not found", body = ApiError),
        (status = 500, description = "Platform integration not configured or URL generation failed", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn start_oauth(
    State(state): State<AppState>,
    Path(platform_path): Path<PlatformPath>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    let platform = parse_platform(&platform_path.platform)?;

    let Some(user_id) = query.user_id else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "user_id query parameter is required",
        ));
    };

    // Resolve credentials up front so a missing integration fails before any
    // state row is written. The response stays generic; details go to the log.
    let credentials = match state.credentials_resolver().resolve(platform).await {
        Ok(credentials) => credentials,
        Err(CredentialsError::NotConfigured(_)) => {
            tracing::warn!(
                platform = %platform,
                "Authorization requested for unconfigured platform"
            );
            return Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Platform integration is not configured",
            ));
        }
        Err(CredentialsError::Storage(err)) => return Err(err.into()),
    };

    let adapter = state.registry.get(platform);
    let state_token = generate_state_token();
    let pkce = adapter.uses_pkce().then(generate_pkce_pair);

    let oauth_state_repo = OAuthStateRepository::new(Arc::new(state.db.clone()));

    // Best-effort sweep so abandoned flows do not accumulate
    match oauth_state_repo.cleanup_expired().await {
        Ok(removed) if removed > 0 => {
            tracing::debug!(removed, "Removed expired OAuth states");
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(error = ?err, "Expired OAuth state cleanup failed");
        }
    }

    let oauth_state = match oauth_state_repo
        .create(
            user_id,
            platform,
            &state_token,
            pkce.as_ref().map(|pair| pair.verifier.clone()),
            STATE_TTL_MINUTES,
        )
        .await
    {
        Ok(row) => row,
        Err(err) => {
            tracing::error!(platform = %platform, error = ?err, "Failed to persist OAuth state");
            return Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to create OAuth state",
            ));
        }
    };

    let authorization_url = match adapter.authorize_url(
        &credentials,
        &state_token,
        pkce.as_ref().map(|pair| pair.challenge.as_str()),
    ) {
        Ok(url) => url,
        Err(err) => {
            tracing::error!(
                platform = %platform,
                error = %err,
                "Failed to generate authorization URL"
            );

            // Clean up the created state since the flow failed
            let _ = oauth_state_repo.delete_by_id(oauth_state.id).await;

            return Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to generate authorization URL",
            ));
        }
    };

    validate_authorize_url(&authorization_url)?;

    counter!("oauth_authorize_total", &[("platform", platform.as_str())]).increment(1);
    tracing::info!(
        user_id = %user_id,
        platform = %platform,
        state_id = %oauth_state.id,
        "OAuth flow initiated"
    );

    Ok(Json(AuthorizeResponse {
        authorization_url: authorization_url.to_string(),
        state: state_token,
    }))
}

/// Validate authorization URL meets OAuth 2.0 and security requirements
fn validate_authorize_url(url: &Url) -> Result<(), ApiError> {
    // Must be HTTPS
    if url.scheme() != "https" {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Adapter bug: Generated authorization URL must use HTTPS",
        ));
    }

    // Must not include fragment component per OAuth 2.0 RFC 6749 section 3.1
    if url.fragment().is_some() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Adapter bug: Generated authorization URL must not include fragment component",
        ));
    }

    // Maximum length 2048 characters
    if url.as_str().len() > 2048 {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Adapter bug: Generated authorization URL exceeds maximum length of 2048 characters",
        ));
    }

    Ok(())
}
