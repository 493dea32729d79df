//! Facebook platform adapter
//!
//! Page publishing via the Graph API. Same dialog and token plumbing as
//! Instagram, different scopes and profile shape.

use async_trait::async_trait;
use url::Url;

use super::Platform;
use super::adapter::{
    AdapterError, PlatformAdapter, PlatformCredentials, Profile, RefreshRequest, TokenGrant,
    require_success,
};
use super::meta;

pub const DEFAULT_SCOPES: &[&str] = &[
    "pages_show_list",
    "pages_read_engagement",
    "pages_manage_posts",
    "pages_manage_engagement",
    "read_insights",
];

const PROFILE_FIELDS: &str = "id,name,accounts{id,name,category,fan_count}";

#[derive(Clone)]
pub struct FacebookAdapter {
    http: reqwest::Client,
    graph_base: String,
}

impl FacebookAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            graph_base: meta::GRAPH_BASE.to_string(),
        }
    }

    /// Route Graph API calls to an explicit base URL (mock servers in tests).
    pub fn with_api_base(http: reqwest::Client, graph_base: impl Into<String>) -> Self {
        Self {
            http,
            graph_base: graph_base.into(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn authorize_url(
        &self,
        credentials: &PlatformCredentials,
        state: &str,
        _code_challenge: Option<&str>,
    ) -> Result<Url, AdapterError> {
        meta::dialog_authorize_url(credentials, DEFAULT_SCOPES, state)
    }

    async fn exchange_code(
        &self,
        credentials: &PlatformCredentials,
        code: &str,
        _code_verifier: Option<&str>,
    ) -> Result<TokenGrant, AdapterError> {
        let mut grant =
            meta::exchange_code_for_long_lived_token(&self.http, &self.graph_base, credentials, code)
                .await?;
        grant.scope = Some(DEFAULT_SCOPES.join(","));
        Ok(grant)
    }

    async fn refresh(&self, request: RefreshRequest<'_>) -> Result<TokenGrant, AdapterError> {
        meta::refresh_via_reexchange(
            &self.http,
            &self.graph_base,
            request.credentials,
            request.access_token,
        )
        .await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, AdapterError> {
        let response = self
            .http
            .get(format!("{}/me", self.graph_base))
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
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Profile {
            platform_user_id,
            display_name,
            data: body,
        })
    }
}
