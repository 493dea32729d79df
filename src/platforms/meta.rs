//! Shared Meta Graph API plumbing for the Facebook and Instagram adapters.
//!
//! Both platforms authorize through the Facebook dialog and exchange codes at
//! graph.facebook.com. Neither issues a refresh token: renewal re-exchanges
//! the current access token with the `fb_exchange_token` grant, yielding a
//! fresh ~60-day long-lived token.

use serde::Deserialize;
use url::Url;

use super::adapter::{AdapterError, PlatformCredentials, TokenGrant, require_success};

pub(super) const GRAPH_BASE: &str = "https://graph.facebook.com";
pub(super) const DIALOG_BASE: &str = "https://www.facebook.com";
const DEFAULT_API_VERSION: &str = "v21.0";

/// Graph API version, overridable per integration via `config_data.api_version`.
pub(super) fn api_version(credentials: &PlatformCredentials) -> String {
    credentials
        .config
        .as_ref()
        .and_then(|config| config.get("api_version"))
        .and_then(|version| version.as_str())
        .unwrap_or(DEFAULT_API_VERSION)
        .to_string()
}

#[derive(Debug, Deserialize)]
struct GraphTokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: Option<String>,
    expires_in: Option<i64>,
}

/// Build the Facebook login dialog URL shared by both Meta platforms.
pub(super) fn dialog_authorize_url(
    credentials: &PlatformCredentials,
    scopes: &[&str],
    state: &str,
) -> Result<Url, AdapterError> {
    let version = api_version(credentials);
    let mut url = Url::parse(&format!("{}/{}/dialog/oauth", DIALOG_BASE, version))?;
    url.query_pairs_mut()
        .append_pair("client_id", &credentials.client_id)
        .append_pair("redirect_uri", &credentials.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &scopes.join(","))
        .append_pair("state", state);
    Ok(url)
}

/// Exchange an authorization code, then immediately upgrade the short-lived
/// token to a long-lived one so the stored token is always the 60-day form.
pub(super) async fn exchange_code_for_long_lived_token(
    http: &reqwest::Client,
    graph_base: &str,
    credentials: &PlatformCredentials,
    code: &str,
) -> Result<TokenGrant, AdapterError> {
    let secret = credentials.require_secret()?;
    let version = api_version(credentials);

    let response = http
        .get(format!("{}/{}/oauth/access_token", graph_base, version))
        .query(&[
            ("client_id", credentials.client_id.as_str()),
            ("redirect_uri", credentials.redirect_uri.as_str()),
            ("client_secret", secret),
            ("code", code),
        ])
        .header("Accept", "application/json")
        .send()
        .await?;
    let short_lived: GraphTokenResponse = require_success(response)
        .await?
        .json()
        .await
        .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

    exchange_long_lived_token(http, graph_base, credentials, &short_lived.access_token).await
}

/// The `fb_exchange_token` grant: trade the current access token for a fresh
/// long-lived one. Used both after code exchange and for renewal.
pub(super) async fn exchange_long_lived_token(
    http: &reqwest::Client,
    graph_base: &str,
    credentials: &PlatformCredentials,
    access_token: &str,
) -> Result<TokenGrant, AdapterError> {
    let secret = credentials.require_secret()?;
    let version = api_version(credentials);

    let response = http
        .get(format!("{}/{}/oauth/access_token", graph_base, version))
        .query(&[
            ("grant_type", "fb_exchange_token"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", secret),
            ("fb_exchange_token", access_token),
        ])
        .header("Accept", "application/json")
        .send()
        .await?;
    let long_lived: GraphTokenResponse = require_success(response)
        .await?
        .json()
        .await
        .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

    Ok(TokenGrant {
        access_token: long_lived.access_token,
        refresh_token: None,
        expires_in: long_lived.expires_in,
        scope: None,
        platform_user_id: None,
    })
}

/// Renewal entry point shared by both adapters: re-exchange the stored access
/// token. There is no refresh token on Meta platforms.
pub(super) async fn refresh_via_reexchange(
    http: &reqwest::Client,
    graph_base: &str,
    credentials: &PlatformCredentials,
    access_token: Option<&str>,
) -> Result<TokenGrant, AdapterError> {
    let current = access_token.ok_or_else(|| {
        AdapterError::RefreshUnavailable("no stored access token to re-exchange".into())
    })?;
    exchange_long_lived_token(http, graph_base, credentials, current).await
}
