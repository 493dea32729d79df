//! X (Twitter) platform adapter
//!
//! OAuth 2.0 with mandatory PKCE. Confidential clients authenticate token
//! calls with HTTP Basic; public clients send their client_id in the body.
//! A refresh token is only granted alongside the `offline.access` scope and
//! rotates on every refresh.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::Platform;
use super::adapter::{
    AdapterError, PlatformAdapter, PlatformCredentials, Profile, RefreshRequest, TokenGrant,
    require_success,
};

const AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
const API_BASE: &str = "https://api.twitter.com";

pub const DEFAULT_SCOPES: &[&str] = &["tweet.read", "tweet.write", "users.read", "offline.access"];

const PROFILE_FIELDS: &str = "id,name,username,profile_image_url,public_metrics";

#[derive(Clone)]
pub struct XAdapter {
    http: reqwest::Client,
    api_base: String,
}

impl XAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            api_base: API_BASE.to_string(),
        }
    }

    /// Route API calls to an explicit base URL (mock servers in tests).
    pub fn with_api_base(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
        }
    }

    async fn post_token_request(
        &self,
        credentials: &PlatformCredentials,
        mut params: Vec<(&str, &str)>,
    ) -> Result<XTokenResponse, AdapterError> {
        let mut request = self
            .http
            .post(format!("{}/2/oauth2/token", self.api_base))
            .header("Accept", "application/json");

        // Confidential clients authenticate with Basic; public clients
        // identify themselves in the body
        if let Some(secret) = credentials.client_secret.as_deref() {
            request = request.basic_auth(&credentials.client_id, Some(secret));
        } else {
            params.push(("client_id", credentials.client_id.as_str()));
        }

        let response = request.form(&params).send().await?;
        require_success(response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct XTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
    #[allow(dead_code)]
    token_type: Option<String>,
}

#[async_trait]
impl PlatformAdapter for XAdapter {
    fn platform(&self) -> Platform {
        Platform::X
    }

    fn uses_pkce(&self) -> bool {
        true
    }

    fn authorize_url(
        &self,
        credentials: &PlatformCredentials,
        state: &str,
        code_challenge: Option<&str>,
    ) -> Result<Url, AdapterError> {
        let challenge = code_challenge.ok_or_else(|| {
            AdapterError::Configuration("X authorization requires a PKCE code challenge".into())
        })?;
        let mut url = Url::parse(AUTHORIZE_URL)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &credentials.client_id)
            .append_pair("redirect_uri", &credentials.redirect_uri)
            .append_pair("scope", &DEFAULT_SCOPES.join(" "))
            .append_pair("state", state)
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url)
    }

    async fn exchange_code(
        &self,
        credentials: &PlatformCredentials,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenGrant, AdapterError> {
        let verifier = code_verifier.ok_or_else(|| {
            AdapterError::Configuration("X token exchange requires the PKCE code verifier".into())
        })?;
        let token_response = self
            .post_token_request(
                credentials,
                vec![
                    ("code", code),
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", credentials.redirect_uri.as_str()),
                    ("code_verifier", verifier),
                ],
            )
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
            AdapterError::RefreshUnavailable(
                "no refresh token was granted; the offline.access scope is required".into(),
            )
        })?;
        let token_response = self
            .post_token_request(
                request.credentials,
                vec![
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ],
            )
            .await?;

        // X rotates the refresh token on every use
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
            .get(format!("{}/2/users/me", self.api_base))
            .query(&[("user.fields", PROFILE_FIELDS)])
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;
        let body: serde_json::Value = require_success(response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        let user = body
            .get("data")
            .cloned()
            .ok_or_else(|| AdapterError::MalformedResponse("profile response missing data".into()))?;
        let platform_user_id = user
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let display_name = user
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Profile {
            platform_user_id,
            display_name,
            data: user,
        })
    }
}
