//! # OAuth Callback Handler
//!
//! Receives the provider redirect, consumes the stored state, exchanges the
//! authorization code, captures the account profile, and persists the
//! connection. Every outcome ends in a redirect back to the app UI with
//! either `success=true` or a stable error code.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use metrics::counter;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::credentials::CredentialsError;
use crate::error::ApiError;
use crate::platforms::Platform;
use crate::repositories::{ConnectionRepository, ConnectionTokens, OAuthStateRepository};
use crate::server::AppState;

use super::connect::{PlatformPath, parse_platform};

/// Query parameters the provider sends back on its redirect
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct CallbackQuery {
    /// Authorization code to exchange for tokens
    pub code: Option<String>,
    /// State token from the matching authorize call
    pub state: Option<String>,
    /// Provider error code when the user denied or the request failed
    pub error: Option<String>,
    /// Human-readable error detail some providers add
    pub error_description: Option<String>,
}

/// Where a callback ended up; every variant maps to a redirect query value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackOutcome {
    Success,
    OauthDenied,
    MissingParameters,
    InvalidState,
    IntegrationNotConfigured,
    TokenExchangeFailed,
    ProfileFetchFailed,
    SaveFailed,
    InternalError,
}

impl CallbackOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            CallbackOutcome::Success => "success",
            CallbackOutcome::OauthDenied => "oauth_denied",
            CallbackOutcome::MissingParameters => "missing_parameters",
            CallbackOutcome::InvalidState => "invalid_state",
            CallbackOutcome::IntegrationNotConfigured => "integration_not_configured",
            CallbackOutcome::TokenExchangeFailed => "token_exchange_failed",
            CallbackOutcome::ProfileFetchFailed => "profile_fetch_failed",
            CallbackOutcome::SaveFailed => "save_failed",
            CallbackOutcome::InternalError => "internal_error",
        }
    }
}

/// OAuth callback endpoint
///
/// The provider redirects the user's browser here after the consent screen.
/// Responses are always 302 redirects to the app UI so the user never sees a
/// raw API error page mid-flow.
#[utoipa::path(
    get,
    path = "/auth/{platform}/callback",
    params(
        ("platform" = String, Path, description = "Platform identifier (snake_case, e.g., 'tiktok')"),
        CallbackQuery
    ),
    responses(
        (status = 302, description = "Redirect to the app UI with success=true or a stable error code"),
        (status = 404, description = "Platform not found", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(platform_path): Path<PlatformPath>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let platform = parse_platform(&platform_path.platform)?;
    let oauth_state_repo = OAuthStateRepository::new(Arc::new(state.db.clone()));

    // Provider-reported denial. Consume the state anyway so the token cannot
    // be replayed later.
    if let Some(provider_error) = query.error.as_deref() {
        if let Some(state_token) = query.state.as_deref() {
            if let Err(err) = oauth_state_repo
                .find_and_consume(platform, state_token)
                .await
            {
                tracing::error!(
                    platform = %platform,
                    error = ?err,
                    "Failed to consume state after provider denial"
                );
            }
        }
        tracing::warn!(
            platform = %platform,
            error = %provider_error,
            error_description = query.error_description.as_deref().unwrap_or_default(),
            "Provider reported an authorization error"
        );
        return Ok(finish(&state, platform, CallbackOutcome::OauthDenied));
    }

    let (Some(code), Some(state_token)) = (query.code.as_deref(), query.state.as_deref()) else {
        return Ok(finish(&state, platform, CallbackOutcome::MissingParameters));
    };

    // Single-use lookup: expired, replayed, and forged states all come back
    // as None and get the same uniform answer.
    let oauth_state = match oauth_state_repo.find_and_consume(platform, state_token).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            tracing::warn!(platform = %platform, "Callback with unknown or expired state");
            return Ok(finish(&state, platform, CallbackOutcome::InvalidState));
        }
        Err(err) => {
            tracing::error!(platform = %platform, error = ?err, "Failed to load OAuth state");
            return Ok(finish(&state, platform, CallbackOutcome::InternalError));
        }
    };

    let credentials = match state.credentials_resolver().resolve(platform).await {
        Ok(credentials) => credentials,
        Err(CredentialsError::NotConfigured(_)) => {
            tracing::warn!(platform = %platform, "Callback for unconfigured platform");
            return Ok(finish(
                &state,
                platform,
                CallbackOutcome::IntegrationNotConfigured,
            ));
        }
        Err(CredentialsError::Storage(err)) => {
            tracing::error!(platform = %platform, error = ?err, "Failed to resolve credentials");
            return Ok(finish(&state, platform, CallbackOutcome::InternalError));
        }
    };

    let adapter = state.registry.get(platform);
    let grant = match adapter
        .exchange_code(&credentials, code, oauth_state.code_verifier.as_deref())
        .await
    {
        Ok(grant) => grant,
        Err(err) => {
            tracing::error!(platform = %platform, error = %err, "Token exchange failed");
            return Ok(finish(&state, platform, CallbackOutcome::TokenExchangeFailed));
        }
    };

    // A failed profile fetch is tolerated when the token response already
    // identified the external account; the connection is saved without a
    // profile snapshot.
    let (platform_user_id, profile_data) = match adapter.fetch_profile(&grant.access_token).await {
        Ok(profile) => {
            let external_id = grant
                .platform_user_id
                .clone()
                .or_else(|| profile.platform_user_id.clone());
            match external_id {
                Some(id) => (id, Some(profile.data)),
                None => {
                    tracing::error!(
                        platform = %platform,
                        "Profile fetch returned no external account id"
                    );
                    return Ok(finish(&state, platform, CallbackOutcome::ProfileFetchFailed));
                }
            }
        }
        Err(err) => match grant.platform_user_id.clone() {
            Some(id) => {
                tracing::warn!(
                    platform = %platform,
                    error = %err,
                    "Profile fetch failed, saving connection without profile data"
                );
                (id, None)
            }
            None => {
                tracing::error!(
                    platform = %platform,
                    error = %err,
                    "Profile fetch failed and the token response carried no account id"
                );
                return Ok(finish(&state, platform, CallbackOutcome::ProfileFetchFailed));
            }
        },
    };

    let expires_at = grant
        .expires_in
        .map(|seconds| (Utc::now() + Duration::seconds(seconds)).into());

    let connection_repo =
        ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let saved = connection_repo
        .upsert_with_tokens(
            oauth_state.user_id,
            platform,
            ConnectionTokens {
                platform_user_id: &platform_user_id,
                access_token: &grant.access_token,
                refresh_token: grant.refresh_token.as_deref(),
                expires_at,
                scope: grant.scope.clone(),
                profile_data,
            },
        )
        .await;

    match saved {
        Ok(connection) => {
            tracing::info!(
                user_id = %oauth_state.user_id,
                platform = %platform,
                connection_id = %connection.id,
                "Connection established"
            );
            Ok(finish(&state, platform, CallbackOutcome::Success))
        }
        Err(err) => {
            tracing::error!(platform = %platform, error = ?err, "Failed to save connection");
            Ok(finish(&state, platform, CallbackOutcome::SaveFailed))
        }
    }
}

/// Counts the outcome and builds the 302 back to the app UI.
fn finish(state: &AppState, platform: Platform, outcome: CallbackOutcome) -> Response {
    counter!(
        "oauth_callback_total",
        &[
            ("platform", platform.as_str()),
            ("result", outcome.as_str()),
        ]
    )
    .increment(1);

    let base = state.config.app_redirect_base.trim_end_matches('/');
    let location = if outcome == CallbackOutcome::Success {
        format!(
            "{}/settings/connections?platform={}&success=true",
            base, platform
        )
    } else {
        format!(
            "{}/settings/connections?platform={}&error={}",
            base,
            platform,
            outcome.as_str()
        )
    };

    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}
