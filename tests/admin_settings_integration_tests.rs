//! Integration tests for admin authentication and integration settings
//!
//! These tests verify:
//! - Public endpoints stay open while /admin requires a bearer token
//! - Settings CRUD with secret masking and encryption at rest
//! - Request validation for malformed settings payloads
//! - Database-stored credentials overriding environment fallbacks

use reqwest::StatusCode;
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

use social_connect::crypto::is_encrypted_payload;
use social_connect::platforms::{Platform, PlatformRegistry};
use social_connect::repositories::IntegrationSettingRepository;

#[path = "test_utils/mod.rs"]
mod test_utils;

const ADMIN_TOKEN: &str = "test-admin-token";

async fn spawn_admin_app() -> (String, DatabaseConnection, test_utils::TestServerHandle) {
    let db = test_utils::setup_test_db().await.unwrap();
    let registry = Arc::new(PlatformRegistry::new(reqwest::Client::new()));
    let state = test_utils::test_app_state(test_utils::test_config(), db.clone(), registry);
    let (server_url, handle) = test_utils::spawn_app(state).await;
    (server_url, db, handle)
}

fn tiktok_settings_body() -> Value {
    json!({
        "client_id": "db-client-id",
        "client_secret": "super-secret-value",
        "environment": "sandbox",
        "callback_url": "https://cb.example.com/auth/tiktok/callback"
    })
}

#[tokio::test]
async fn test_public_endpoints_need_no_auth() -> Result<(), Box<dyn std::error::Error>> {
    let (server_url, _db, handle) = spawn_admin_app().await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{}/", server_url)).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["service"], "postbridge-social-connect");
    assert!(body["version"].is_string());

    let response = client.get(format!("{}/healthz", server_url)).send().await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(format!("{}/openapi.json", server_url))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let spec: Value = response.json().await?;
    assert_eq!(spec["info"]["title"], "Postbridge Social Connect API");

    handle.shutdown().await?;
    println!("✓ Public endpoints integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_admin_endpoints_require_bearer_token() -> Result<(), Box<dyn std::error::Error>> {
    let (server_url, _db, handle) = spawn_admin_app().await;
    let client = reqwest::Client::new();
    let url = format!("{}/admin/integrations", server_url);

    // No Authorization header
    let response = client.get(&url).send().await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await?;
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["message"], "Missing Authorization header");

    // Wrong scheme
    let response = client
        .get(&url)
        .header("Authorization", "Basic dGVzdDoxMjM=")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong token
    let response = client
        .get(&url)
        .header("Authorization", "Bearer wrong-token")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await?;
    assert_eq!(body["message"], "Invalid bearer token");

    // Valid token sees the (empty) listing
    let response = client
        .get(&url)
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body, json!([]));

    handle.shutdown().await?;
    println!("✓ Admin bearer auth integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_settings_upsert_masks_and_encrypts_secret() -> Result<(), Box<dyn std::error::Error>>
{
    let (server_url, db, handle) = spawn_admin_app().await;
    let client = reqwest::Client::new();

    let response = client
        .put(format!("{}/admin/integrations/tiktok", server_url))
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .json(&tiktok_settings_body())
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // The secret never appears in a response, only its mask
    let text = response.text().await?;
    assert!(!text.contains("super-secret-value"));
    let body: Value = serde_json::from_str(&text)?;
    assert_eq!(body["platform"], "tiktok");
    assert_eq!(body["client_id"], "db-client-id");
    assert_eq!(body["client_secret_masked"], "super-...");
    assert_eq!(body["environment"], "sandbox");
    assert_eq!(body["is_active"], true);

    // At rest the secret is versioned ciphertext, not plaintext
    let repo = IntegrationSettingRepository::new(Arc::new(db.clone()), test_utils::test_crypto_key());
    let row = repo.find_by_platform(Platform::Tiktok).await?.unwrap();
    let ciphertext = row.client_secret_ciphertext.as_deref().unwrap();
    assert!(is_encrypted_payload(ciphertext));
    assert!(
        !ciphertext
            .windows(b"super-secret-value".len())
            .any(|window| window == b"super-secret-value")
    );
    assert_eq!(
        repo.decrypt_client_secret(&row)?.as_deref(),
        Some("super-secret-value")
    );

    // Single fetch and listing both return the mask
    let single: Value = client
        .get(format!("{}/admin/integrations/tiktok", server_url))
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(single["client_secret_masked"], "super-...");

    let listing: Value = client
        .get(format!("{}/admin/integrations", server_url))
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(listing.as_array().map(Vec::len), Some(1));
    assert_eq!(listing[0]["platform"], "tiktok");

    handle.shutdown().await?;
    println!("✓ Settings upsert masking integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_settings_validation_rejects_bad_input() -> Result<(), Box<dyn std::error::Error>> {
    let (server_url, _db, handle) = spawn_admin_app().await;
    let client = reqwest::Client::new();
    let url = format!("{}/admin/integrations/tiktok", server_url);

    let cases = [
        (
            json!({"client_id": "   "}),
            "client_id must not be empty",
        ),
        (
            json!({"client_id": "id", "client_secret": ""}),
            "client_secret must not be empty when provided",
        ),
        (
            json!({"client_id": "id", "environment": "staging"}),
            "environment must be one of production, sandbox, development",
        ),
        (
            json!({"client_id": "id", "callback_url": "not a url"}),
            "callback_url must be a valid http(s) URL",
        ),
    ];

    for (payload, expected_message) in cases {
        let response = client
            .put(&url)
            .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
            .json(&payload)
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = response.json().await?;
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert_eq!(body["message"], expected_message);
    }

    handle.shutdown().await?;
    println!("✓ Settings validation integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_settings_unknown_platform_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
    let (server_url, _db, handle) = spawn_admin_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/admin/integrations/myspace", server_url))
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await?;
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(body["message"].as_str().unwrap().contains("myspace"));

    // Known platform with nothing stored is also a 404
    let response = client
        .get(format!("{}/admin/integrations/tiktok", server_url))
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await?;
    assert_eq!(body["message"], "No integration settings stored for tiktok");

    handle.shutdown().await?;
    println!("✓ Settings unknown platform integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_delete_settings_then_fetch_is_404() -> Result<(), Box<dyn std::error::Error>> {
    let (server_url, _db, handle) = spawn_admin_app().await;
    let client = reqwest::Client::new();
    let url = format!("{}/admin/integrations/tiktok", server_url);

    let response = client
        .put(&url)
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .json(&tiktok_settings_body())
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .delete(&url)
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["success"], true);

    let response = client
        .delete(&url)
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .get(&url)
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    handle.shutdown().await?;
    println!("✓ Settings delete integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_database_settings_override_env_credentials()
-> Result<(), Box<dyn std::error::Error>> {
    let (server_url, _db, handle) = spawn_admin_app().await;
    let client = reqwest::Client::new();
    let user_id = Uuid::new_v4();
    let authorize_url = format!("{}/auth/tiktok?user_id={}", server_url, user_id);

    // Stored, active settings win over the environment fallback
    let response = client
        .put(format!("{}/admin/integrations/tiktok", server_url))
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .json(&tiktok_settings_body())
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = client.get(&authorize_url).send().await?.json().await?;
    let url = body["authorization_url"].as_str().unwrap();
    assert!(url.contains("client_key=db-client-id"));
    assert!(url.contains("cb.example.com"));

    // Deactivating the row restores the environment credentials
    let response = client
        .put(format!("{}/admin/integrations/tiktok", server_url))
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .json(&json!({"client_id": "db-client-id", "is_active": false}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = client.get(&authorize_url).send().await?.json().await?;
    let url = body["authorization_url"].as_str().unwrap();
    assert!(url.contains("client_key=tiktok-client-key"));
    assert!(!url.contains("cb.example.com"));

    // So does deleting it
    let response = client
        .delete(format!("{}/admin/integrations/tiktok", server_url))
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = client.get(&authorize_url).send().await?.json().await?;
    let url = body["authorization_url"].as_str().unwrap();
    assert!(url.contains("client_key=tiktok-client-key"));

    handle.shutdown().await?;
    println!("✓ Settings precedence integration test passed");
    Ok(())
}

#[tokio::test]
async fn test_upsert_preserves_secret_when_omitted() -> Result<(), Box<dyn std::error::Error>> {
    let (server_url, db, handle) = spawn_admin_app().await;
    let client = reqwest::Client::new();
    let url = format!("{}/admin/integrations/tiktok", server_url);

    let response = client
        .put(&url)
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .json(&tiktok_settings_body())
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Rotating the client id without sending a secret keeps the stored one
    let response = client
        .put(&url)
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .json(&json!({"client_id": "rotated-client-id", "environment": "production"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["client_id"], "rotated-client-id");
    assert_eq!(body["environment"], "production");
    assert_eq!(body["client_secret_masked"], "super-...");

    let repo = IntegrationSettingRepository::new(Arc::new(db.clone()), test_utils::test_crypto_key());
    let row = repo.find_by_platform(Platform::Tiktok).await?.unwrap();
    assert_eq!(
        repo.decrypt_client_secret(&row)?.as_deref(),
        Some("super-secret-value")
    );

    handle.shutdown().await?;
    println!("✓ Secret retention integration test passed");
    Ok(())
}
