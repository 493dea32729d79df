//! Test utilities for database and server testing.
//!
//! This module provides utilities for setting up SQLite databases with
//! migrations, assembling application state, and spawning test servers.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use uuid::Uuid;

use social_connect::config::AppConfig;
use social_connect::credentials::CredentialsResolver;
use social_connect::crypto::CryptoKey;
use social_connect::models::connection;
use social_connect::platforms::{Platform, PlatformRegistry};
use social_connect::repositories::{
    ConnectionRepository, ConnectionTokens, IntegrationSettingRepository,
};
use social_connect::server::{AppState, create_app};
use social_connect::token_manager::TokenManager;

static TEST_DB_DIR: OnceLock<TempDir> = OnceLock::new();

/// Sets up a file-backed SQLite database with all migrations applied.
///
/// Each call gets its own database file. A shared `sqlite::memory:` pool
/// cannot be used here: every pooled connection opens a brand-new empty
/// in-memory database, so any test that runs concurrent queries would see
/// missing tables.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let dir = TEST_DB_DIR.get_or_init(|| TempDir::new().expect("create test database directory"));
    let path = dir.path().join(format!("{}.sqlite", Uuid::new_v4()));

    let db = Database::connect(format!("sqlite://{}?mode=rwc", path.display())).await?;

    // Run all migrations
    Migrator::up(&db, None).await?;

    Ok(db)
}

/// The 32-byte all-zero key every test suite encrypts with.
pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new(vec![0u8; 32]).expect("Failed to create test crypto key")
}

/// Baseline configuration for test servers: an admin token, the test crypto
/// key, and environment credentials for most platforms. Facebook and
/// Instagram are left unconfigured so tests can exercise the unconfigured
/// path.
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    AppConfig {
        admin_tokens: vec!["test-admin-token".to_string()],
        crypto_key: Some(vec![0u8; 32]),
        tiktok_client_key: Some("tiktok-client-key".to_string()),
        tiktok_client_secret: Some("tiktok-client-secret".to_string()),
        youtube_client_id: Some("youtube-client-id".to_string()),
        youtube_client_secret: Some("youtube-client-secret".to_string()),
        threads_app_id: Some("threads-app-id".to_string()),
        threads_app_secret: Some("threads-app-secret".to_string()),
        x_client_id: Some("x-client-id".to_string()),
        ..AppConfig::default()
    }
}

/// Assembles application state around an injectable platform registry so
/// suites can route adapter calls at a mock server via
/// [`PlatformRegistry::with_api_base`].
#[allow(dead_code)]
pub fn test_app_state(
    config: AppConfig,
    db: DatabaseConnection,
    registry: Arc<PlatformRegistry>,
) -> AppState {
    let config = Arc::new(config);
    let crypto_key = test_crypto_key();

    let connections = ConnectionRepository::new(Arc::new(db.clone()), crypto_key.clone());
    let settings = IntegrationSettingRepository::new(Arc::new(db.clone()), crypto_key.clone());
    let credentials = CredentialsResolver::new(settings, Arc::clone(&config));
    let token_manager = Arc::new(TokenManager::new(
        Arc::clone(&config),
        connections,
        credentials,
        Arc::clone(&registry),
    ));

    AppState {
        config,
        db,
        crypto_key,
        registry,
        token_manager,
    }
}

pub struct TestServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl TestServerHandle {
    fn new(shutdown_tx: oneshot::Sender<()>, join_handle: JoinHandle<Result<()>>) -> Self {
        Self {
            shutdown_tx: Some(shutdown_tx),
            join_handle: Some(join_handle),
        }
    }

    #[allow(dead_code)]
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.join_handle.take() {
            let result = handle.await.context("server task join failed")?;
            result?;
        }

        Ok(())
    }
}

impl Drop for TestServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Spawns the app on a random local port and waits for it to be ready.
#[allow(dead_code)]
pub async fn spawn_app(state: AppState) -> (String, TestServerHandle) {
    let app = create_app(state);

    // Bind to a random port
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_url = format!("http://{}", addr);

    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // Spawn server in background
    let server_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let _ = ready_tx.send(());

        server.await.context("axum server error")
    });

    // Wait for server readiness signal
    ready_rx.await.expect("server task to signal readiness");

    (server_url, TestServerHandle::new(shutdown_tx, server_task))
}

/// Stores a connection through the repository so the token fields go through
/// the real encryption path.
#[allow(dead_code)]
pub async fn insert_test_connection(
    db: &DatabaseConnection,
    user_id: Uuid,
    platform: Platform,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<connection::Model> {
    let repo = ConnectionRepository::new(Arc::new(db.clone()), test_crypto_key());
    repo.upsert_with_tokens(
        user_id,
        platform,
        ConnectionTokens {
            platform_user_id: "platform-user-1",
            access_token,
            refresh_token,
            expires_at: expires_at.map(Into::into),
            scope: Some("user.info.basic".to_string()),
            profile_data: Some(serde_json::json!({ "display_name": "Fixture Account" })),
        },
    )
    .await
}

/// Inserts a connection row directly, bypassing the encryption layer, so
/// tests can stage legacy or corrupted ciphertext bytes.
#[allow(dead_code)]
pub async fn insert_raw_connection(
    db: &DatabaseConnection,
    user_id: Uuid,
    platform: Platform,
    access_token_ciphertext: Option<Vec<u8>>,
    refresh_token_ciphertext: Option<Vec<u8>>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now: DateTimeWithTimeZone = Utc::now().into();
    let stmt = Statement::from_sql_and_values(
        db.get_database_backend(),
        "INSERT INTO connections (
            id, user_id, platform, platform_user_id,
            access_token_ciphertext, refresh_token_ciphertext, expires_at, scope, profile_data,
            is_active, needs_reconnect, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, NULL, NULL, NULL, ?, ?, ?, ?)",
        vec![
            id.into(),
            user_id.into(),
            platform.as_str().into(),
            "platform-user-1".into(),
            access_token_ciphertext.into(),
            refresh_token_ciphertext.into(),
            true.into(),
            false.into(),
            now.into(),
            now.into(),
        ],
    );
    db.execute(stmt).await?;
    Ok(id)
}

/// Rewinds a connection's `updated_at`, which doubles as the token issue
/// time, so age-gated refresh paths can be exercised without waiting.
#[allow(dead_code)]
pub async fn backdate_connection_updated_at(
    db: &DatabaseConnection,
    connection_id: Uuid,
    hours: i64,
) -> Result<()> {
    let stamped: DateTimeWithTimeZone = (Utc::now() - chrono::Duration::hours(hours)).into();
    let stmt = Statement::from_sql_and_values(
        db.get_database_backend(),
        "UPDATE connections SET updated_at = ? WHERE id = ?",
        vec![stamped.into(), connection_id.into()],
    );
    db.execute(stmt).await?;
    Ok(())
}

/// Fetches the stored connection for a `(user, platform)` pair, failing the
/// test when none exists.
#[allow(dead_code)]
pub async fn find_connection(
    db: &DatabaseConnection,
    user_id: Uuid,
    platform: Platform,
) -> Result<connection::Model> {
    let repo = ConnectionRepository::new(Arc::new(db.clone()), test_crypto_key());
    repo.find_by_user_and_platform(user_id, platform)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no {} connection stored for user {}", platform, user_id))
}
