//! # Token Lifecycle Manager
//!
//! Lazy, request-path token renewal. [`TokenManager::get_valid_access_token`]
//! hands out the stored access token while it is still fresh and refreshes it
//! in place once expired; [`TokenManager::refresh_now`] forces a renewal for
//! the explicit refresh endpoint. All refresh work for one `(user, platform)`
//! pair runs single-flight.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use metrics::{counter, histogram};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::credentials::{CredentialsError, CredentialsResolver};
use crate::error::{ApiError, ErrorType, not_found, provider_error};
use crate::models::connection;
use crate::platforms::{AdapterError, Platform, PlatformRegistry, RefreshRequest, TokenGrant};
use crate::repositories::ConnectionRepository;

/// Classification of token refresh errors for appropriate handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshErrorClassification {
    /// Permanent failures that require user re-authorization (e.g. invalid_grant)
    Permanent,
    /// Temporary failures that can be retried (e.g. network issues)
    Transient,
    /// Rate limiting by the platform; retry later without touching the row
    RateLimited,
}

/// Outcome of a forced refresh, for the refresh-token endpoint
#[derive(Debug)]
pub struct RefreshOutcome {
    /// Lifetime of the renewed token in seconds, when the platform reports one
    pub expires_in: Option<i64>,
}

/// Why a refresh attempt produced no new token
enum RefreshFailure {
    /// The platform rejected or could not complete the refresh
    Adapter(AdapterError),
    /// No client credentials in settings or the environment
    NotConfigured,
    /// Database or crypto failure on our side
    Internal(anyhow::Error),
}

/// Lazy token lifecycle manager.
///
/// There is no background scanner: tokens are renewed inline when a caller
/// asks for one and the stored token has lapsed. A per-`(user, platform)`
/// lock provides single-flight protection so concurrent callers trigger at
/// most one upstream refresh.
pub struct TokenManager {
    config: Arc<AppConfig>,
    connections: ConnectionRepository,
    credentials: CredentialsResolver,
    registry: Arc<PlatformRegistry>,
    /// Tracks ongoing refresh operations to provide single-flight protection
    refresh_locks: Mutex<HashMap<(Uuid, Platform), Arc<Mutex<()>>>>,
}

impl TokenManager {
    pub fn new(
        config: Arc<AppConfig>,
        connections: ConnectionRepository,
        credentials: CredentialsResolver,
        registry: Arc<PlatformRegistry>,
    ) -> Self {
        Self {
            config,
            connections,
            credentials,
            registry,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a usable access token for the pair, refreshing inline when the
    /// stored one has expired.
    ///
    /// Absent, disconnected, and reconnect-flagged connections all yield
    /// `Ok(None)`, as does a refresh the platform refuses. Errors are
    /// reserved for infrastructure failures (database, crypto).
    #[instrument(skip_all, fields(user_id = %user_id, platform = %platform))]
    pub async fn get_valid_access_token(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<String>, ApiError> {
        let Some(existing) = self
            .connections
            .find_by_user_and_platform(user_id, platform)
            .await?
        else {
            return Ok(None);
        };

        if !existing.is_active {
            return Ok(None);
        }
        if existing.needs_reconnect {
            debug!(
                connection_id = %existing.id,
                "Connection needs reconnect, not returning a token"
            );
            return Ok(None);
        }

        if self.is_fresh(&existing) {
            let (access_token, _) = self.connections.decrypt_tokens(&existing)?;
            return Ok(access_token);
        }

        let lock = self.refresh_lock(user_id, platform).await;
        let result = {
            let _guard = lock.lock().await;
            self.refresh_expired_locked(user_id, platform).await
        };
        self.release_refresh_lock(user_id, platform, lock).await;
        result
    }

    /// Forces a refresh regardless of expiry, under the same single-flight
    /// lock as the lazy path.
    ///
    /// Unlike [`Self::get_valid_access_token`], failures surface as typed
    /// API errors so the caller learns exactly why the renewal was refused.
    #[instrument(skip_all, fields(user_id = %user_id, platform = %platform))]
    pub async fn refresh_now(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<RefreshOutcome, ApiError> {
        let lock = self.refresh_lock(user_id, platform).await;
        let result = {
            let _guard = lock.lock().await;
            self.refresh_now_locked(user_id, platform).await
        };
        self.release_refresh_lock(user_id, platform, lock).await;
        result
    }

    /// The under-lock half of the lazy path. Re-reads the row because another
    /// flight may have finished the refresh while this one waited on the lock.
    async fn refresh_expired_locked(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<String>, ApiError> {
        let Some(current) = self
            .connections
            .find_by_user_and_platform(user_id, platform)
            .await?
        else {
            return Ok(None);
        };

        if !current.is_active || current.needs_reconnect {
            return Ok(None);
        }
        if self.is_fresh(&current) {
            debug!(
                connection_id = %current.id,
                "Token already refreshed by a concurrent request"
            );
            let (access_token, _) = self.connections.decrypt_tokens(&current)?;
            return Ok(access_token);
        }

        match self.execute_refresh(&current, platform).await {
            Ok(grant) => Ok(Some(grant.access_token)),
            Err(RefreshFailure::Adapter(err)) => {
                self.handle_refresh_failure(&current, platform, &err).await;
                Ok(None)
            }
            Err(RefreshFailure::NotConfigured) => {
                warn!("No client credentials available, cannot refresh");
                Ok(None)
            }
            Err(RefreshFailure::Internal(err)) => Err(err.into()),
        }
    }

    async fn refresh_now_locked(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<RefreshOutcome, ApiError> {
        let current = self
            .connections
            .find_by_user_and_platform(user_id, platform)
            .await?
            .filter(|connection| connection.is_active)
            .ok_or_else(|| not_found(&format!("No active {} connection for this user", platform)))?;

        match self.execute_refresh(&current, platform).await {
            Ok(grant) => Ok(RefreshOutcome {
                expires_in: grant.expires_in,
            }),
            Err(RefreshFailure::Adapter(err)) => {
                self.handle_refresh_failure(&current, platform, &err).await;
                Err(refresh_error_response(platform, err))
            }
            Err(RefreshFailure::NotConfigured) => {
                warn!("No client credentials available for forced refresh");
                Err(ErrorType::InternalServerError.into())
            }
            Err(RefreshFailure::Internal(err)) => Err(err.into()),
        }
    }

    /// Resolves credentials, calls the platform's refresh dialect, and
    /// persists the outcome. Returns the grant so callers can hand out the
    /// new access token without a second decrypt.
    async fn execute_refresh(
        &self,
        current: &connection::Model,
        platform: Platform,
    ) -> Result<TokenGrant, RefreshFailure> {
        let refresh_start = std::time::Instant::now();
        let metric_labels = [("platform", platform.as_str())];
        counter!("token_refresh_attempts_total", &metric_labels).increment(1);

        let credentials = match self.credentials.resolve(platform).await {
            Ok(credentials) => credentials,
            Err(CredentialsError::NotConfigured(_)) => return Err(RefreshFailure::NotConfigured),
            Err(CredentialsError::Storage(err)) => return Err(RefreshFailure::Internal(err)),
        };

        let (access_token, refresh_token) = self
            .connections
            .decrypt_tokens(current)
            .map_err(RefreshFailure::Internal)?;

        let adapter = self.registry.get(platform);
        let grant = adapter
            .refresh(RefreshRequest {
                credentials: &credentials,
                access_token: access_token.as_deref(),
                refresh_token: refresh_token.as_deref(),
                token_issued_at: current.updated_at.with_timezone(&Utc),
            })
            .await
            .map_err(RefreshFailure::Adapter)?;

        let expires_at = grant
            .expires_in
            .map(|seconds| (Utc::now() + Duration::seconds(seconds)).into());

        self.connections
            .apply_refresh(
                current.clone(),
                &grant.access_token,
                grant.refresh_token.as_deref(),
                expires_at,
                grant.scope.clone(),
            )
            .await
            .map_err(RefreshFailure::Internal)?;

        histogram!("token_refresh_latency_ms", &metric_labels)
            .record(refresh_start.elapsed().as_secs_f64() * 1_000.0);
        counter!("token_refresh_success_total", &metric_labels).increment(1);

        info!(
            connection_id = %current.id,
            expires_in = ?grant.expires_in,
            rotated_refresh_token = grant.refresh_token.is_some(),
            "Successfully refreshed access token"
        );

        Ok(grant)
    }

    /// Applies the failure policy: permanent failures flag the row for
    /// reconnection, everything else leaves it untouched so a later request
    /// can try again.
    async fn handle_refresh_failure(
        &self,
        current: &connection::Model,
        platform: Platform,
        refresh_error: &AdapterError,
    ) {
        let metric_labels = [("platform", platform.as_str())];
        counter!("token_refresh_failure_total", &metric_labels).increment(1);

        match classify_refresh_error(refresh_error) {
            RefreshErrorClassification::Permanent => {
                error!(
                    connection_id = %current.id,
                    error = %refresh_error,
                    "Permanent token refresh failure, marking connection for reconnect"
                );
                counter!("token_refresh_permanent_failure_total", &metric_labels).increment(1);

                if let Err(err) = self.connections.mark_needs_reconnect(current.id).await {
                    error!(
                        connection_id = %current.id,
                        error = ?err,
                        "Failed to flag connection for reconnect"
                    );
                }
            }
            RefreshErrorClassification::Transient => {
                warn!(
                    connection_id = %current.id,
                    error = %refresh_error,
                    "Transient token refresh failure, will retry on a later request"
                );
                counter!("token_refresh_transient_failure_total", &metric_labels).increment(1);
            }
            RefreshErrorClassification::RateLimited => {
                warn!(
                    connection_id = %current.id,
                    error = %refresh_error,
                    "Rate limited during token refresh"
                );
                counter!("token_refresh_rate_limited_total", &metric_labels).increment(1);
            }
        }
    }

    /// Whether the stored access token is still usable without a refresh.
    ///
    /// A NULL expiry means the platform issued a non-expiring token. The
    /// configured skew widens the refresh window so tokens are renewed a
    /// little before they lapse; the default of zero keeps exact expiry
    /// semantics.
    fn is_fresh(&self, connection: &connection::Model) -> bool {
        match connection.expires_at {
            None => true,
            Some(expires_at) => {
                let skew = Duration::seconds(self.config.token_refresh_skew_seconds as i64);
                expires_at.with_timezone(&Utc) > Utc::now() + skew
            }
        }
    }

    /// Hands out the refresh lock for a `(user, platform)` pair, creating it
    /// on first use.
    async fn refresh_lock(&self, user_id: Uuid, platform: Platform) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks.entry((user_id, platform)).or_default().clone()
    }

    /// Drops the map entry once no other task holds the lock, so the map does
    /// not accumulate one entry per pair ever refreshed.
    async fn release_refresh_lock(&self, user_id: Uuid, platform: Platform, lock: Arc<Mutex<()>>) {
        let mut locks = self.refresh_locks.lock().await;
        // Two handles left means the map's own plus ours: nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&(user_id, platform));
        }
    }
}

/// Classify token refresh errors for appropriate handling strategy
pub fn classify_refresh_error(refresh_error: &AdapterError) -> RefreshErrorClassification {
    match refresh_error {
        AdapterError::Upstream { status, body } => {
            if *status == 429 {
                return RefreshErrorClassification::RateLimited;
            }

            let body_lower = body.to_lowercase();

            // Check for permanent failures first
            if body_lower.contains("invalid_grant")
                || body_lower.contains("invalid_client")
                || body_lower.contains("unauthorized_client")
                || body_lower.contains("revoked")
                || body_lower.contains("forbidden")
                || body_lower.contains("access_denied")
                || body_lower.contains("unsupported_grant_type")
            {
                return RefreshErrorClassification::Permanent;
            }

            // Check for rate limiting
            if body_lower.contains("rate_limit")
                || body_lower.contains("too_many_requests")
                || body_lower.contains("temporarily_unavailable")
                || body_lower.contains("quota_exceeded")
            {
                return RefreshErrorClassification::RateLimited;
            }

            RefreshErrorClassification::Transient
        }
        // Nothing stored can ever satisfy the refresh without re-authorization
        AdapterError::RefreshUnavailable(_) => RefreshErrorClassification::Permanent,
        AdapterError::RefreshTooEarly
        | AdapterError::Network(_)
        | AdapterError::MalformedResponse(_)
        | AdapterError::Configuration(_)
        | AdapterError::UrlBuild(_) => RefreshErrorClassification::Transient,
    }
}

/// Maps adapter failures from a forced refresh onto the API error taxonomy.
fn refresh_error_response(platform: Platform, refresh_error: AdapterError) -> ApiError {
    let classification = classify_refresh_error(&refresh_error);
    match refresh_error {
        AdapterError::RefreshTooEarly | AdapterError::RefreshUnavailable(_) => ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &refresh_error.to_string(),
        ),
        AdapterError::Upstream { status, body } => {
            if classification == RefreshErrorClassification::RateLimited {
                ErrorType::TooManyRequests.into()
            } else {
                provider_error(platform.to_string(), status, Some(body))
            }
        }
        AdapterError::Network(_) => ErrorType::ServiceUnavailable.into(),
        AdapterError::MalformedResponse(_) => ApiError::new(
            StatusCode::BAD_GATEWAY,
            "PROVIDER_ERROR",
            &format!("{} returned an unexpected response", platform),
        ),
        AdapterError::Configuration(_) | AdapterError::UrlBuild(_) => {
            ErrorType::InternalServerError.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(status: u16, body: &str) -> AdapterError {
        AdapterError::Upstream {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_classify_permanent_markers() {
        for marker in [
            "invalid_grant",
            "invalid_client",
            "unauthorized_client",
            "revoked",
            "forbidden",
            "access_denied",
            "unsupported_grant_type",
        ] {
            let error = upstream(400, &format!("{{\"error\":\"{marker}\"}}"));
            assert_eq!(
                classify_refresh_error(&error),
                RefreshErrorClassification::Permanent,
                "{marker}"
            );
        }
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        let error = upstream(400, "{\"error\":\"Invalid_Grant\"}");
        assert_eq!(
            classify_refresh_error(&error),
            RefreshErrorClassification::Permanent
        );
    }

    #[test]
    fn test_classify_rate_limited() {
        let by_status = upstream(429, "slow down");
        assert_eq!(
            classify_refresh_error(&by_status),
            RefreshErrorClassification::RateLimited
        );

        for marker in [
            "rate_limit",
            "too_many_requests",
            "temporarily_unavailable",
            "quota_exceeded",
        ] {
            let error = upstream(400, &format!("{{\"error\":\"{marker}\"}}"));
            assert_eq!(
                classify_refresh_error(&error),
                RefreshErrorClassification::RateLimited,
                "{marker}"
            );
        }
    }

    #[test]
    fn test_classify_transient_default() {
        let server_error = upstream(500, "internal error");
        assert_eq!(
            classify_refresh_error(&server_error),
            RefreshErrorClassification::Transient
        );

        let unknown_client_error = upstream(400, "{\"error\":\"something_else\"}");
        assert_eq!(
            classify_refresh_error(&unknown_client_error),
            RefreshErrorClassification::Transient
        );

        let malformed = AdapterError::MalformedResponse("missing access_token".to_string());
        assert_eq!(
            classify_refresh_error(&malformed),
            RefreshErrorClassification::Transient
        );

        assert_eq!(
            classify_refresh_error(&AdapterError::RefreshTooEarly),
            RefreshErrorClassification::Transient
        );
    }

    #[test]
    fn test_classify_refresh_unavailable_is_permanent() {
        let error = AdapterError::RefreshUnavailable("No refresh token stored".to_string());
        assert_eq!(
            classify_refresh_error(&error),
            RefreshErrorClassification::Permanent
        );
    }

    #[test]
    fn test_refresh_too_early_maps_to_400_with_exact_message() {
        let response = refresh_error_response(Platform::Threads, AdapterError::RefreshTooEarly);
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            &*response.message,
            "Token must be at least 24 hours old to refresh"
        );
    }

    #[test]
    fn test_upstream_rejection_maps_to_502() {
        let response = refresh_error_response(
            Platform::Tiktok,
            upstream(400, "{\"error\":\"invalid_grant\"}"),
        );
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_eq!(&*response.code, "PROVIDER_ERROR");
    }

    #[test]
    fn test_upstream_rate_limit_maps_to_429() {
        let response = refresh_error_response(Platform::Youtube, upstream(429, "slow down"));
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(&*response.code, "RATE_LIMITED");
    }

    #[test]
    fn test_configuration_error_stays_generic() {
        let response = refresh_error_response(
            Platform::X,
            AdapterError::Configuration("client secret is not configured".to_string()),
        );
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.message.contains("secret"));
    }
}
