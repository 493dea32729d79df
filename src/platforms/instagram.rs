//! Instagram platform adapter
//!
//! Instagram business accounts authorize through the Facebook login dialog
//! and live behind the Graph API. Renewal is the shared Meta re-exchange; the
//! profile fetch digs the Instagram business account out of the user's pages.

use async_trait::async_trait;
use url::Url;

use super::Platform;
use super::adapter::{
    AdapterError, PlatformAdapter, PlatformCredentials, Profile, RefreshRequest, TokenGrant,
    require_success,
};
use super::meta;

pub const DEFAULT_SCOPES: &[&str] = &[
    "instagram_basic",
    "instagram_content_publish",
    "instagram_manage_comments",
    "instagram_manage_insights",
    "pages_show_list",
];

const PROFILE_FIELDS: &str =
    "id,name,accounts{id,name,instagram_business_account{id,username,profile_picture_url,followers_count,media_count}}";

#[derive(Clone)]
pub struct InstagramAdapter {
    http: reqwest::Client,
    graph_base: String,
}

impl InstagramAdapter {
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
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
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

        // Prefer the Instagram business account id over the Facebook user id
        let ig_account = body
            .pointer("/accounts/data")
            .and_then(|pages| pages.as_array())
            .and_then(|pages| {
                pages
                    .iter()
                    .find_map(|page| page.get("instagram_business_account").cloned())
            });

        let platform_user_id = ig_account
            .as_ref()
            .and_then(|account| account.get("id"))
            .or_else(|| body.get("id"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let display_name = ig_account
            .as_ref()
            .and_then(|account| account.get("username"))
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
