//! Integration tests for the token lifecycle manager
//!
//! These tests verify refresh behavior end-to-end against a mock upstream:
//! - Per-platform refresh dialects (rotation, re-exchange, age gating)
//! - Single-flight protection for concurrent refreshes of one connection
//! - Failure classification: permanent failures flag the row, transient and
//!   rate-limited failures leave it untouched
//! - Disconnect clearing stored token material

use chrono::Utc;
use reqwest::StatusCode;
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path, query_param},
};

use social_connect::credentials::CredentialsResolver;
use social_connect::models::connection;
use social_connect::platforms::{Platform, PlatformRegistry};
use social_connect::repositories::{ConnectionRepository, IntegrationSettingRepository};
use social_connect::token_manager::TokenManager;

#[path = "test_utils/mod.rs"]
mod test_utils;

async fn spawn_lifecycle_app(
    mock_base: &str,
) -> (String, DatabaseConnection, test_utils::TestServerHandle) {
    let db = test_utils::setup_test_db().await.unwrap();
    let registry = Arc::new(PlatformRegistry::with_api_base(
        reqwest::Client::new(),
        mock_base,
    ));
    let state = test_utils::test_app_state(test_utils::test_config(), db.clone(), registry);
    let (server_url, handle) = test_utils::spawn_app(state).await;
    (server_url, db, handle)
}

/// Builds a token manager over the same wiring the server uses, for tests
/// that exercise the lazy path directly.
fn build_token_manager(db: &DatabaseConnection, mock_base: &str) -> TokenManager {
    let config = Arc::new(test_utils::test_config());
    let crypto_key = test_utils::test_crypto_key();
    let connections = ConnectionRepository::new(Arc::new(db.clone()), crypto_key.clone());
    let settings = IntegrationSettingRepository::new(Arc::new(db.clone()), crypto_key);
    let credentials = CredentialsResolver::new(settings, Arc::clone(&config));
    let registry = Arc::new(PlatformRegistry::with_api_base(
        reqwest::Client::new(),
        mock_base,
    ));
    TokenManager::new(config, connections, credentials, registry)
}

fn decrypt(
    db: &DatabaseConnection,
    connection: &connection::Model,
) -> (Option<String>, Option<String>) {
    let repo = ConnectionRepository::new(Arc::new(db.clone()), test_utils::test_crypto_key());
    repo.decrypt_tokens(connection).expect("tokens decrypt")
}

#[tokio::test]
async fn test_forced_refresh_rotates_and_persists_tokens()
-> Result<(), Box<dyn std::error::Error>> {
    let mock_server = MockServer::start().await;

    // TikTok rotates both tokens on refresh
    Mock::given(method("POST"))
        .and(path("/v2/oauth/token/"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "refresh_token": "new-refresh",
            "expires_in": 86400,
            "open_id": "open-id-123",
            "scope": "user.info.basic,video.publish",
            "token_type": "Bearer"
        })))
        .mount(&mock_server)
        .await;

    let (server_url, db, handle) = spawn_lifecycle_app(&mock_server.uri()).await;
    let client = reqwest::Client::new();
    let user_id = Uuid::new_v4();

    test_utils::insert_test_connection(
        &db,
        user_id,
        Platform::Tiktok,
        "old-access",
        Some("old-refresh"),
        Some(Utc::now() - chrono::Duration::hours(1)),
    )
    .await?;

    let response = client
        .post(format!(
            "{}/auth/tiktok/refresh-token?user_id={}",
            server_url, user_id
        ))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["expires_in"], 86400);

    let connection = test_utils::find_connection(&db, user_id, Platform::Tiktok).await?;
    let (access, refresh) = decrypt(&db, &connection);
    assert_eq!(access.as_deref(), Some("new-access"));
    assert_eq!(refresh.as_deref(), Some("new-refresh"));
    assert!(!connection.needs_reconnect);
    assert!(connection.expires_at.unwrap().with_timezone(&Utc) > Utc::now());

    handle.shutdown().await?;
    println!("✓ Forced refresh rotation integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_youtube_refresh_keeps_stored_refresh_token()
-> Result<(), Box<dyn std::error::Error>> {
    let mock_server = MockServer::start().await;

    // Google never returns a refresh token on a standard refresh; the stored
    // one must survive
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=yt-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "yt-new-access",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/youtube.upload",
            "token_type": "Bearer"
        })))
        .mount(&mock_server)
        .await;

    let (server_url, db, handle) = spawn_lifecycle_app(&mock_server.uri()).await;
    let client = reqwest::Client::new();
    let user_id = Uuid::new_v4();

    test_utils::insert_test_connection(
        &db,
        user_id,
        Platform::Youtube,
        "yt-old-access",
        Some("yt-refresh"),
        Some(Utc::now() - chrono::Duration::minutes(5)),
    )
    .await?;

    let response = client
        .post(format!(
            "{}/auth/youtube/refresh-token?user_id={}",
            server_url, user_id
        ))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let connection = test_utils::find_connection(&db, user_id, Platform::Youtube).await?;
    let (access, refresh) = decrypt(&db, &connection);
    assert_eq!(access.as_deref(), Some("yt-new-access"));
    assert_eq!(refresh.as_deref(), Some("yt-refresh"));

    handle.shutdown().await?;
    println!("✓ YouTube refresh retention integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_facebook_refresh_reexchanges_access_token() -> Result<(), Box<dyn std::error::Error>>
{
    let mock_server = MockServer::start().await;

    // Meta has no refresh tokens: renewal trades the current access token
    // for a fresh long-lived one via fb_exchange_token
    Mock::given(method("GET"))
        .and(path("/v21.0/oauth/access_token"))
        .and(query_param("grant_type", "fb_exchange_token"))
        .and(query_param("fb_exchange_token", "fb-long-lived"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fb-renewed",
            "token_type": "bearer",
            "expires_in": 5183944
        })))
        .mount(&mock_server)
        .await;

    let db = test_utils::setup_test_db().await?;
    let registry = Arc::new(PlatformRegistry::with_api_base(
        reqwest::Client::new(),
        &mock_server.uri(),
    ));
    let config = social_connect::config::AppConfig {
        facebook_app_id: Some("facebook-app-id".to_string()),
        facebook_app_secret: Some("facebook-app-secret".to_string()),
        ..test_utils::test_config()
    };
    let state = test_utils::test_app_state(config, db.clone(), registry);
    let (server_url, handle) = test_utils::spawn_app(state).await;
    let client = reqwest::Client::new();
    let user_id = Uuid::new_v4();

    test_utils::insert_test_connection(
        &db,
        user_id,
        Platform::Facebook,
        "fb-long-lived",
        None,
        Some(Utc::now() - chrono::Duration::hours(1)),
    )
    .await?;

    let response = client
        .post(format!(
            "{}/auth/facebook/refresh-token?user_id={}",
            server_url, user_id
        ))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let connection = test_utils::find_connection(&db, user_id, Platform::Facebook).await?;
    let (access, refresh) = decrypt(&db, &connection);
    assert_eq!(access.as_deref(), Some("fb-renewed"));
    assert_eq!(refresh, None);

    handle.shutdown().await?;
    println!("✓ Facebook re-exchange integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_threads_refresh_minimum_age_gate() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = MockServer::start().await;
    let (server_url, db, handle) = spawn_lifecycle_app(&mock_server.uri()).await;
    let client = reqwest::Client::new();
    let user_id = Uuid::new_v4();

    // Freshly stored token: updated_at is now, so the token is under the
    // 24 hour minimum and the refresh must be refused locally
    let connection = test_utils::insert_test_connection(
        &db,
        user_id,
        Platform::Threads,
        "threads-long-lived",
        None,
        Some(Utc::now() + chrono::Duration::days(60)),
    )
    .await?;

    let response = client
        .post(format!(
            "{}/auth/threads/refresh-token?user_id={}",
            server_url, user_id
        ))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = response.json().await?;
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert_eq!(
        body["message"],
        "Token must be at least 24 hours old to refresh"
    );
    assert!(
        mock_server.received_requests().await.unwrap().is_empty(),
        "the age gate must reject before any upstream call"
    );

    // Once the token is old enough the refresh goes through, sending the
    // decrypted access token as the th_refresh_token grant
    test_utils::backdate_connection_updated_at(&db, connection.id, 25).await?;

    Mock::given(method("GET"))
        .and(path("/refresh_access_token"))
        .and(query_param("grant_type", "th_refresh_token"))
        .and(query_param("access_token", "threads-long-lived"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "threads-renewed",
            "token_type": "bearer",
            "expires_in": 5184000
        })))
        .mount(&mock_server)
        .await;

    let response = client
        .post(format!(
            "{}/auth/threads/refresh-token?user_id={}",
            server_url, user_id
        ))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["expires_in"], 5184000);

    let connection = test_utils::find_connection(&db, user_id, Platform::Threads).await?;
    let (access, _) = decrypt(&db, &connection);
    assert_eq!(access.as_deref(), Some("threads-renewed"));

    handle.shutdown().await?;
    println!("✓ Threads age gate integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_refresh_without_connection_is_404() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = MockServer::start().await;
    let (server_url, _db, handle) = spawn_lifecycle_app(&mock_server.uri()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!(
            "{}/auth/tiktok/refresh-token?user_id={}",
            server_url,
            Uuid::new_v4()
        ))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: Value = response.json().await?;
    assert_eq!(body["code"], "NOT_FOUND");

    handle.shutdown().await?;
    println!("✓ Refresh without connection integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_concurrent_token_requests_share_one_refresh()
-> Result<(), Box<dyn std::error::Error>> {
    let mock_server = MockServer::start().await;

    // The delay widens the race window; the expectation pins the upstream
    // call count to exactly one
    Mock::given(method("POST"))
        .and(path("/v2/oauth/token/"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "coalesced-access",
                    "refresh_token": "coalesced-refresh",
                    "expires_in": 86400,
                    "open_id": "open-id-123",
                    "scope": "user.info.basic",
                    "token_type": "Bearer"
                }))
                .set_delay(std::time::Duration::from_millis(250)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let db = test_utils::setup_test_db().await?;
    let manager = Arc::new(build_token_manager(&db, &mock_server.uri()));
    let user_id = Uuid::new_v4();

    test_utils::insert_test_connection(
        &db,
        user_id,
        Platform::Tiktok,
        "stale-access",
        Some("stale-refresh"),
        Some(Utc::now() - chrono::Duration::hours(1)),
    )
    .await?;

    let (first, second, third, fourth) = tokio::join!(
        manager.get_valid_access_token(user_id, Platform::Tiktok),
        manager.get_valid_access_token(user_id, Platform::Tiktok),
        manager.get_valid_access_token(user_id, Platform::Tiktok),
        manager.get_valid_access_token(user_id, Platform::Tiktok),
    );

    for result in [first, second, third, fourth] {
        assert_eq!(result.unwrap().as_deref(), Some("coalesced-access"));
    }

    mock_server.verify().await;

    println!("✓ Single-flight refresh integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_fresh_token_is_served_without_upstream_call()
-> Result<(), Box<dyn std::error::Error>> {
    let mock_server = MockServer::start().await;
    let db = test_utils::setup_test_db().await?;
    let manager = build_token_manager(&db, &mock_server.uri());
    let user_id = Uuid::new_v4();

    test_utils::insert_test_connection(
        &db,
        user_id,
        Platform::Tiktok,
        "still-fresh-access",
        Some("still-fresh-refresh"),
        Some(Utc::now() + chrono::Duration::hours(2)),
    )
    .await?;

    let token = manager
        .get_valid_access_token(user_id, Platform::Tiktok)
        .await
        .unwrap();
    assert_eq!(token.as_deref(), Some("still-fresh-access"));

    // Absent connections yield None rather than an error
    let missing = manager
        .get_valid_access_token(Uuid::new_v4(), Platform::Tiktok)
        .await
        .unwrap();
    assert_eq!(missing, None);

    assert!(mock_server.received_requests().await.unwrap().is_empty());

    println!("✓ Fresh token fast path integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_permanent_refresh_failure_flags_reconnect() -> Result<(), Box<dyn std::error::Error>>
{
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/oauth/token/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Refresh token has been revoked"
        })))
        .mount(&mock_server)
        .await;

    let (server_url, db, handle) = spawn_lifecycle_app(&mock_server.uri()).await;
    let client = reqwest::Client::new();
    let user_id = Uuid::new_v4();

    test_utils::insert_test_connection(
        &db,
        user_id,
        Platform::Tiktok,
        "revoked-access",
        Some("revoked-refresh"),
        Some(Utc::now() - chrono::Duration::hours(1)),
    )
    .await?;

    let response = client
        .post(format!(
            "{}/auth/tiktok/refresh-token?user_id={}",
            server_url, user_id
        ))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body: Value = response.json().await?;
    assert_eq!(body["code"], "PROVIDER_ERROR");
    assert_eq!(body["details"]["provider"], "tiktok");

    // The row is flagged so the UI can prompt for re-authorization
    let connection = test_utils::find_connection(&db, user_id, Platform::Tiktok).await?;
    assert!(connection.needs_reconnect);

    let listing: Value = client
        .get(format!("{}/connections?user_id={}", server_url, user_id))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(listing["connections"][0]["needs_reconnect"], true);

    handle.shutdown().await?;
    println!("✓ Permanent refresh failure integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_rate_limited_refresh_leaves_row_untouched() -> Result<(), Box<dyn std::error::Error>>
{
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/oauth/token/"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&mock_server)
        .await;

    let (server_url, db, handle) = spawn_lifecycle_app(&mock_server.uri()).await;
    let client = reqwest::Client::new();
    let user_id = Uuid::new_v4();

    test_utils::insert_test_connection(
        &db,
        user_id,
        Platform::Tiktok,
        "limited-access",
        Some("limited-refresh"),
        Some(Utc::now() - chrono::Duration::minutes(10)),
    )
    .await?;

    let response = client
        .post(format!(
            "{}/auth/tiktok/refresh-token?user_id={}",
            server_url, user_id
        ))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let body: Value = response.json().await?;
    assert_eq!(body["code"], "RATE_LIMITED");

    // Not a permanent failure: stored tokens survive for the next attempt
    let connection = test_utils::find_connection(&db, user_id, Platform::Tiktok).await?;
    assert!(!connection.needs_reconnect);
    let (access, refresh) = decrypt(&db, &connection);
    assert_eq!(access.as_deref(), Some("limited-access"));
    assert_eq!(refresh.as_deref(), Some("limited-refresh"));

    handle.shutdown().await?;
    println!("✓ Rate limited refresh integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_disconnect_clears_token_material() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = MockServer::start().await;
    let (server_url, db, handle) = spawn_lifecycle_app(&mock_server.uri()).await;
    let client = reqwest::Client::new();
    let user_id = Uuid::new_v4();

    test_utils::insert_test_connection(
        &db,
        user_id,
        Platform::Tiktok,
        "soon-gone-access",
        Some("soon-gone-refresh"),
        Some(Utc::now() + chrono::Duration::hours(2)),
    )
    .await?;

    let response = client
        .post(format!(
            "{}/auth/tiktok/disconnect?user_id={}",
            server_url, user_id
        ))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["success"], true);

    // The row survives for the UI but holds no token material
    let connection = test_utils::find_connection(&db, user_id, Platform::Tiktok).await?;
    assert!(!connection.is_active);
    assert!(connection.access_token_ciphertext.is_none());
    assert!(connection.refresh_token_ciphertext.is_none());
    assert!(connection.expires_at.is_none());

    let listing: Value = client
        .get(format!("{}/connections?user_id={}", server_url, user_id))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(listing["connections"][0]["is_active"], false);
    assert_eq!(listing["connections"][0]["has_access_token"], false);

    // A second disconnect has nothing to remove
    let repeat = client
        .post(format!(
            "{}/auth/tiktok/disconnect?user_id={}",
            server_url, user_id
        ))
        .send()
        .await?;
    assert_eq!(repeat.status(), StatusCode::OK);

    handle.shutdown().await?;
    println!("✓ Disconnect integration test passed");
    Ok(())
}
