//! Threads platform adapter
//!
//! Threads never issues refresh tokens. The code exchange yields a short
//! lived token that is immediately upgraded via `th_exchange_token`; renewal
//! is the `th_refresh_token` grant against the token itself, and Threads
//! rejects renewal until the token is at least 24 hours old.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use url::Url;

use super::Platform;
use super::adapter::{
    AdapterError, PlatformAdapter, PlatformCredentials, Profile, RefreshRequest, TokenGrant,
    require_success,
};

const AUTHORIZE_URL: &str = "https://threads.net/oauth/authorize";
const GRAPH_BASE: &str = "https://graph.threads.net";

pub const DEFAULT_SCOPES: &[&str] = &[
    "threads_basic",
    "threads_content_publish",
    "threads_manage_insights",
    "threads_manage_replies",
];

const PROFILE_FIELDS: &str = "id,username,name,threads_profile_picture_url,threads_biography";

/// Minimum token age before Threads accepts a refresh.
const MIN_REFRESH_AGE_HOURS: i64 = 24;

#[derive(Clone)]
pub struct ThreadsAdapter {
    http: reqwest::Client,
    graph_base: String,
}

impl ThreadsAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            graph_base: GRAPH_BASE.to_string(),
        }
    }

    /// Route Graph calls to an explicit base URL (mock servers in tests).
    pub fn with_api_base(http: reqwest::Client, graph_base: impl Into<String>) -> Self {
        Self {
            http,
            graph_base: graph_base.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShortLivedTokenResponse {
    access_token: String,
    user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LongLivedTokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: Option<String>,
    expires_in: Option<i64>,
}

#[async_trait]
impl PlatformAdapter for ThreadsAdapter {
    fn platform(&self) -> Platform {
        Platform::Threads
    }

    fn authorize_url(
        &self,
        credentials: &PlatformCredentials,
        state: &str,
        _code_challenge: Option<&str>,
    ) -> Result<Url, AdapterError> {
        let mut url = Url::parse(AUTHORIZE_URL)?;
        url.query_pairs_mut()
            .append_pair("client_id", &credentials.client_id)
            .append_pair("redirect_uri", &credentials.redirect_uri)
            .append_pair("scope", &DEFAULT_SCOPES.join(","))
            .append_pair("response_type", "code")
            .append_pair("state", state);
        Ok(url)
    }

    async fn exchange_code(
        &self,
        credentials: &PlatformCredentials,
        code: &str,
        _code_verifier: Option<&str>,
    ) -> Result<TokenGrant, AdapterError> {
        let secret = credentials.require_secret()?;

        // Step one: code to short-lived token (about an hour)
        let response = self
            .http
            .post(format!("{}/oauth/access_token", self.graph_base))
            .header("Accept", "application/json")
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", secret),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", credentials.redirect_uri.as_str()),
            ])
            .send()
            .await?;
        let short_lived: ShortLivedTokenResponse = require_success(response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        // Step two: upgrade to the ~60-day long-lived token
        let response = self
            .http
            .get(format!("{}/access_token", self.graph_base))
            .query(&[
                ("grant_type", "th_exchange_token"),
                ("client_secret", secret),
                ("access_token", short_lived.access_token.as_str()),
            ])
            .header("Accept", "application/json")
            .send()
            .await?;
        let long_lived: LongLivedTokenResponse = require_success(response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        Ok(TokenGrant {
            access_token: long_lived.access_token,
            refresh_token: None,
            expires_in: long_lived.expires_in,
            scope: Some(DEFAULT_SCOPES.join(",")),
            platform_user_id: short_lived.user_id.map(|id| id.to_string()),
        })
    }

    async fn refresh(&self, request: RefreshRequest<'_>) -> Result<TokenGrant, AdapterError> {
        let access_token = request.access_token.ok_or_else(|| {
            AdapterError::RefreshUnavailable("no stored access token to refresh".into())
        })?;

        // Threads rejects refreshes of young tokens; check locally so we
        // never burn an upstream call on a request that cannot succeed
        let age = Utc::now() - request.token_issued_at;
        if age < Duration::hours(MIN_REFRESH_AGE_HOURS) {
            return Err(AdapterError::RefreshTooEarly);
        }

        let response = self
            .http
            .get(format!("{}/refresh_access_token", self.graph_base))
            .query(&[
                ("grant_type", "th_refresh_token"),
                ("access_token", access_token),
            ])
            .header("Accept", "application/json")
            .send()
            .await?;
        let renewed: LongLivedTokenResponse = require_success(response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        Ok(TokenGrant {
            access_token: renewed.access_token,
            refresh_token: None,
            expires_in: renewed.expires_in,
            scope: None,
            platform_user_id: None,
        })
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, AdapterError> {
        let response = self
            .http
            .get(format!("{}/v1.0/me", self.graph_base))
            .query(&[("fields", PROFILE_FIELDS)])
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;
        let body: serde_json::Value = require_success(response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        let platform_user_id = body
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let display_name = body
            .get("username")
            .or_else(|| body.get("name"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Profile {
            platform_user_id,
            display_name,
            data: body,
        })
    }
}
