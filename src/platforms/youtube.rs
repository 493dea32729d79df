//! YouTube platform adapter
//!
//! Standard Google OAuth: offline access with a consent prompt so a refresh
//! token is issued, space-delimited scopes, and a refresh grant that returns
//! a new access token while the refresh token itself never rotates.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::Platform;
use super::adapter::{
    AdapterError, PlatformAdapter, PlatformCredentials, Profile, RefreshRequest, TokenGrant,
    require_success,
};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_BASE: &str = "https://oauth2.googleapis.com";
const API_BASE: &str = "https://www.googleapis.com";

pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube.readonly",
];

#[derive(Clone)]
pub struct YoutubeAdapter {
    http: reqwest::Client,
    token_base: String,
    api_base: String,
}

impl YoutubeAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            token_base: TOKEN_BASE.to_string(),
            api_base: API_BASE.to_string(),
        }
    }

    /// Route token and API calls to an explicit base URL (mock servers in
    /// tests). Google splits these across two hosts in production, but the
    /// paths never collide so one mock base serves both.
    pub fn with_api_base(http: reqwest::Client, base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            http,
            token_base: base.clone(),
            api_base: base,
        }
    }

    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
    ) -> Result<GoogleTokenResponse, AdapterError> {
        let response = self
            .http
            .post(format!("{}/token", self.token_base))
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await?;
        require_success(response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
    #[allow(dead_code)]
    token_type: Option<String>,
}

#[async_trait]
impl PlatformAdapter for YoutubeAdapter {
    fn platform(&self) -> Platform {
        Platform::Youtube
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
            .append_pair("response_type", "code")
            .append_pair("scope", &DEFAULT_SCOPES.join(" "))
            // Offline access plus forced consent, otherwise Google only
            // issues a refresh token on the very first authorization
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
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
        let token_response = self
            .post_token_request(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", secret),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", credentials.redirect_uri.as_str()),
            ])
            .await?;

        Ok(TokenGrant {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            expires_in: token_response.expires_in,
            scope: token_response
                .scope
                .or_else(|| Some(DEFAULT_SCOPES.join(" "))),
            platform_user_id: None,
        })
    }

    async fn refresh(&self, request: RefreshRequest<'_>) -> Result<TokenGrant, AdapterError> {
        let refresh_token = request.refresh_token.ok_or_else(|| {
            AdapterError::RefreshUnavailable("no refresh token stored; reconnect the account".into())
        })?;
        let secret = request.credentials.require_secret()?;
        let token_response = self
            .post_token_request(&[
                ("client_id", request.credentials.client_id.as_str()),
                ("client_secret", secret),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;

        // Google does not return the refresh token here; the stored one stays
        Ok(TokenGrant {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            expires_in: token_response.expires_in,
            scope: token_response.scope,
            platform_user_id: None,
        })
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, AdapterError> {
        let response = self
            .http
            .get(format!("{}/youtube/v3/channels", self.api_base))
            .query(&[("part", "snippet,statistics"), ("mine", "true")])
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;
        let body: serde_json::Value = require_success(response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        let channel = body
            .pointer("/items/0")
            .cloned()
            .ok_or_else(|| AdapterError::MalformedResponse("no channel in profile response".into()))?;
        let platform_user_id = channel
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let display_name = channel
            .pointer("/snippet/title")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Profile {
            platform_user_id,
            display_name,
            data: channel,
        })
    }
}
