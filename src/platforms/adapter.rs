//! Platform adapter trait definition
//!
//! Defines the standard interface every platform integration implements:
//! build the consent URL, exchange the authorization code, refresh tokens in
//! the platform's dialect, and fetch the account profile.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

use super::Platform;

/// OAuth client credentials resolved for one request.
///
/// Resolved fresh from integration settings (or the environment fallback) on
/// every call so admin edits take effect without a restart.
#[derive(Debug, Clone)]
pub struct PlatformCredentials {
    /// App id / client key, depending on the platform's naming.
    pub client_id: String,
    /// Client secret; absent for public PKCE-only clients.
    pub client_secret: Option<String>,
    /// Redirect URI registered with the platform app.
    pub redirect_uri: String,
    /// `production`, `sandbox`, or `development`.
    pub environment: String,
    /// Platform-specific extras from the settings row (e.g. Graph API version).
    pub config: Option<JsonValue>,
}

impl PlatformCredentials {
    /// The client secret, or a typed error naming nothing sensitive.
    pub fn require_secret(&self) -> Result<&str, AdapterError> {
        self.client_secret
            .as_deref()
            .ok_or_else(|| AdapterError::Configuration("client secret is not configured".into()))
    }
}

/// Tokens returned by an exchange or refresh call.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// New refresh token when the platform issues or rotates one. `None`
    /// means the caller keeps whatever it already has stored.
    pub refresh_token: Option<String>,
    /// Lifetime in seconds; `None` when the platform does not report one.
    pub expires_in: Option<i64>,
    /// Granted scope as the platform's delimited string.
    pub scope: Option<String>,
    /// External account id when the token response itself includes one
    /// (TikTok `open_id`, Threads `user_id`).
    pub platform_user_id: Option<String>,
}

/// Account profile snapshot from the platform's API.
#[derive(Debug, Clone)]
pub struct Profile {
    /// External account id extracted from the profile payload.
    pub platform_user_id: Option<String>,
    pub display_name: Option<String>,
    /// Raw profile payload, stored denormalized for the UI.
    pub data: JsonValue,
}

/// Inputs to a refresh call. Which token the adapter actually uses depends on
/// the platform's dialect.
#[derive(Debug)]
pub struct RefreshRequest<'a> {
    pub credentials: &'a PlatformCredentials,
    /// Currently stored access token (Meta and Threads re-exchange this).
    pub access_token: Option<&'a str>,
    /// Currently stored refresh token (standard refresh grant platforms).
    pub refresh_token: Option<&'a str>,
    /// When the stored token was issued; Threads enforces a minimum age.
    pub token_issued_at: DateTime<Utc>,
}

/// Adapter error types for structured upstream error handling
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Non-2xx response from the platform; body kept for classification.
    #[error("upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
    /// 2xx response that did not parse into the expected shape.
    #[error("malformed response from platform: {0}")]
    MalformedResponse(String),
    /// Transport-level failure (DNS, TLS, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Refresh cannot be attempted with what is stored (e.g. no refresh
    /// token was ever granted).
    #[error("{0}")]
    RefreshUnavailable(String),
    /// Threads tokens may only be renewed once they are a day old.
    #[error("Token must be at least 24 hours old to refresh")]
    RefreshTooEarly,
    /// The resolved credentials cannot support this call.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Authorization URL construction failed.
    #[error("failed to build authorization URL: {0}")]
    UrlBuild(#[from] url::ParseError),
}

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Which platform this adapter serves.
    fn platform(&self) -> Platform;

    /// Whether authorization requests carry a PKCE challenge.
    fn uses_pkce(&self) -> bool {
        false
    }

    /// Build the provider consent URL for the authorization redirect.
    fn authorize_url(
        &self,
        credentials: &PlatformCredentials,
        state: &str,
        code_challenge: Option<&str>,
    ) -> Result<Url, AdapterError>;

    /// Exchange an authorization code for tokens. Platforms with a short-to
    /// long-lived upgrade step (Meta, Threads) perform it here so the stored
    /// token is always the long-lived one.
    async fn exchange_code(
        &self,
        credentials: &PlatformCredentials,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenGrant, AdapterError>;

    /// Renew the stored token in the platform's dialect.
    async fn refresh(&self, request: RefreshRequest<'_>) -> Result<TokenGrant, AdapterError>;

    /// Fetch the account profile for a valid access token.
    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, AdapterError>;
}

/// Pass 2xx responses through; turn anything else into `Upstream` with the
/// body preserved for error classification.
pub(crate) async fn require_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AdapterError::Upstream {
        status: status.as_u16(),
        body,
    })
}
