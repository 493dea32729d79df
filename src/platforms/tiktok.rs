//! TikTok platform adapter
//!
//! TikTok's v2 OAuth endpoints. The client id parameter is named
//! `client_key`, scopes are comma-delimited, and a refresh rotates both the
//! access and the refresh token.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::Platform;
use super::adapter::{
    AdapterError, PlatformAdapter, PlatformCredentials, Profile, RefreshRequest, TokenGrant,
    require_success,
};

const AUTHORIZE_URL: &str = "https://www.tiktok.com/v2/auth/authorize/";
const API_BASE: &str = "https://open.tiktokapis.com";
const SANDBOX_API_BASE: &str = "https://open-sandbox.tiktokapis.com";

pub const DEFAULT_SCOPES: &[&str] = &[
    "user.info.basic",
    "user.info.profile",
    "user.info.stats",
    "video.list",
    "video.publish",
];

const PROFILE_FIELDS: &str = "open_id,union_id,username,display_name,avatar_url,follower_count,following_count,likes_count,video_count";

#[derive(Clone)]
pub struct TikTokAdapter {
    http: reqwest::Client,
    api_base_override: Option<String>,
}

impl TikTokAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            api_base_override: None,
        }
    }

    /// Route API calls to an explicit base URL (mock servers in tests).
    pub fn with_api_base(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base_override: Some(api_base.into()),
        }
    }

    fn api_base(&self, credentials: &PlatformCredentials) -> &str {
        if let Some(base) = self.api_base_override.as_deref() {
            return base;
        }
        if credentials.environment == "sandbox" {
            SANDBOX_API_BASE
        } else {
            API_BASE
        }
    }

    async fn post_token_request(
        &self,
        credentials: &PlatformCredentials,
        params: &[(&str, &str)],
    ) -> Result<TokenGrant, AdapterError> {
        let response = self
            .http
            .post(format!("{}/v2/oauth/token/", self.api_base(credentials)))
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await?;
        let status = response.status().as_u16();
        let token_response: TikTokTokenResponse = require_success(response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;
        token_response.into_grant(status)
    }
}

#[derive(Debug, Deserialize)]
struct TikTokTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    open_id: Option<String>,
    scope: Option<String>,
    // TikTok reports some grant failures inside a 200 body
    error: Option<String>,
    error_description: Option<String>,
}

impl TikTokTokenResponse {
    fn into_grant(self, status: u16) -> Result<TokenGrant, AdapterError> {
        if let Some(error) = self.error {
            let description = self.error_description.unwrap_or_default();
            return Err(AdapterError::Upstream {
                status,
                body: format!("{}: {}", error, description),
            });
        }
        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AdapterError::MalformedResponse("token response missing access_token".into())
            })?;
        Ok(TokenGrant {
            access_token,
            refresh_token: self.refresh_token,
            expires_in: self.expires_in,
            scope: self.scope,
            platform_user_id: self.open_id,
        })
    }
}

#[async_trait]
impl PlatformAdapter for TikTokAdapter {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    fn authorize_url(
        &self,
        credentials: &PlatformCredentials,
        state: &str,
        _code_challenge: Option<&str>,
    ) -> Result<Url, AdapterError> {
        let mut url = Url::parse(AUTHORIZE_URL)?;
        url.query_pairs_mut()
            .append_pair("client_key", &credentials.client_id)
            .append_pair("scope", &DEFAULT_SCOPES.join(","))
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &credentials.redirect_uri)
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
        let mut grant = self
            .post_token_request(
                credentials,
                &[
                    ("client_key", credentials.client_id.as_str()),
                    ("client_secret", secret),
                    ("code", code),
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", credentials.redirect_uri.as_str()),
                ],
            )
            .await?;
        if grant.scope.is_none() {
            grant.scope = Some(DEFAULT_SCOPES.join(","));
        }
        Ok(grant)
    }

    async fn refresh(&self, request: RefreshRequest<'_>) -> Result<TokenGrant, AdapterError> {
        let refresh_token = request.refresh_token.ok_or_else(|| {
            AdapterError::RefreshUnavailable("no refresh token stored; reconnect the account".into())
        })?;
        let secret = request.credentials.require_secret()?;
        self.post_token_request(
            request.credentials,
            &[
                ("client_key", request.credentials.client_id.as_str()),
                ("client_secret", secret),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, AdapterError> {
        // Profile calls are environment-independent apart from the host
        let base = self.api_base_override.as_deref().unwrap_or(API_BASE);
        let response = self
            .http
            .get(format!("{}/v2/user/info/", base))
            .query(&[("fields", PROFILE_FIELDS)])
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;
        let status = response.status().as_u16();
        let body: serde_json::Value = require_success(response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        // Envelope: { "data": { "user": {...} }, "error": { "code": "ok", ... } }
        if let Some(code) = body.pointer("/error/code").and_then(|c| c.as_str()) {
            if code != "ok" {
                let message = body
                    .pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default();
                return Err(AdapterError::Upstream {
                    status,
                    body: format!("{}: {}", code, message),
                });
            }
        }

        let user = body
            .pointer("/data/user")
            .cloned()
            .ok_or_else(|| AdapterError::MalformedResponse("profile response missing data.user".into()))?;
        let platform_user_id = user
            .get("open_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let display_name = user
            .get("display_name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Profile {
            platform_user_id,
            display_name,
            data: user,
        })
    }
}
