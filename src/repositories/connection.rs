//! Connection repository for database operations
//!
//! This module provides the ConnectionRepository struct which encapsulates
//! SeaORM operations for the connections table, including transparent
//! encryption and decryption of the token fields.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{
    CryptoKey, connection_aad, decrypt_token_pair, encrypt_token, encrypt_token_pair,
    is_encrypted_payload,
};
use crate::models::connection::{self, Entity as Connection};
use crate::platforms::Platform;

/// Token material and profile snapshot saved after an OAuth code exchange.
#[derive(Debug)]
pub struct ConnectionTokens<'a> {
    pub platform_user_id: &'a str,
    pub access_token: &'a str,
    pub refresh_token: Option<&'a str>,
    pub expires_at: Option<DateTimeWithTimeZone>,
    pub scope: Option<String>,
    pub profile_data: Option<JsonValue>,
}

/// Repository for connection database operations
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Crypto key for token encryption
    pub crypto_key: CryptoKey,
}

impl ConnectionRepository {
    /// Creates a new ConnectionRepository instance
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Finds the connection for a `(user, platform)` pair, active or not
    pub async fn find_by_user_and_platform(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<connection::Model>> {
        Ok(Connection::find()
            .filter(connection::Column::UserId.eq(user_id))
            .filter(connection::Column::Platform.eq(platform.as_str()))
            .one(&*self.db)
            .await?)
    }

    /// Retrieves a connection by its ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<connection::Model>> {
        Ok(Connection::find_by_id(id).one(&*self.db).await?)
    }

    /// Lists all connections for a user ordered by platform name
    pub async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<connection::Model>> {
        Ok(Connection::find()
            .filter(connection::Column::UserId.eq(user_id))
            .order_by_asc(connection::Column::Platform)
            .all(&*self.db)
            .await?)
    }

    /// Creates or updates the connection for a `(user, platform)` pair with
    /// freshly encrypted tokens, reactivating the row and clearing the
    /// reconnect flag.
    ///
    /// A `None` profile snapshot leaves any previously stored snapshot in
    /// place, so a failed profile fetch does not erase older data.
    pub async fn upsert_with_tokens(
        &self,
        user_id: Uuid,
        platform: Platform,
        tokens: ConnectionTokens<'_>,
    ) -> Result<connection::Model> {
        let aad = connection_aad(user_id, platform);
        let (access_cipher, refresh_cipher) = encrypt_token_pair(
            &self.crypto_key,
            &aad,
            Some(tokens.access_token),
            tokens.refresh_token,
        )
        .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let now: DateTimeWithTimeZone = Utc::now().into();

        if let Some(existing) = self.find_by_user_and_platform(user_id, platform).await? {
            let mut model: connection::ActiveModel = existing.into();
            model.platform_user_id = Set(tokens.platform_user_id.to_string());
            model.access_token_ciphertext = Set(access_cipher);
            model.refresh_token_ciphertext = Set(refresh_cipher);
            model.expires_at = Set(tokens.expires_at);
            model.scope = Set(tokens.scope);
            if tokens.profile_data.is_some() {
                model.profile_data = Set(tokens.profile_data);
            }
            model.is_active = Set(true);
            model.needs_reconnect = Set(false);
            model.updated_at = Set(now);

            return Ok(model.update(&*self.db).await?);
        }

        let id = Uuid::new_v4();
        let active = connection::ActiveModel {
            id: Set(id),
            user_id: Set(user_id),
            platform: Set(platform.as_str().to_string()),
            platform_user_id: Set(tokens.platform_user_id.to_string()),
            access_token_ciphertext: Set(access_cipher),
            refresh_token_ciphertext: Set(refresh_cipher),
            expires_at: Set(tokens.expires_at),
            scope: Set(tokens.scope),
            profile_data: Set(tokens.profile_data),
            is_active: Set(true),
            needs_reconnect: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Connection::insert(active)
            .exec_without_returning(&*self.db)
            .await?;

        // For SQLite, query the record directly since we already know the ID
        let fetched = Connection::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("connection not persisted"))
    }

    /// Persists the outcome of a token refresh.
    ///
    /// A missing refresh token in the grant keeps the stored ciphertext, since
    /// several platforms never rotate (or never issue) refresh tokens.
    pub async fn apply_refresh(
        &self,
        existing: connection::Model,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTimeWithTimeZone>,
        scope: Option<String>,
    ) -> Result<connection::Model> {
        let platform: Platform = existing.platform.parse()?;
        let aad = connection_aad(existing.user_id, platform);

        let access_cipher = encrypt_token(&self.crypto_key, &aad, access_token)
            .map_err(|e| anyhow!("Token encryption failed: {}", e))?;
        let refresh_cipher = refresh_token
            .map(|token| encrypt_token(&self.crypto_key, &aad, token))
            .transpose()
            .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let mut model: connection::ActiveModel = existing.into();
        model.access_token_ciphertext = Set(Some(access_cipher));
        if let Some(cipher) = refresh_cipher {
            model.refresh_token_ciphertext = Set(Some(cipher));
        }
        model.expires_at = Set(expires_at);
        if scope.is_some() {
            model.scope = Set(scope);
        }
        model.needs_reconnect = Set(false);
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    /// Flags a connection as needing user re-authorization
    pub async fn mark_needs_reconnect(&self, id: Uuid) -> Result<connection::Model> {
        let existing = Connection::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Connection '{}' not found", id))?;

        let mut model: connection::ActiveModel = existing.into();
        model.needs_reconnect = Set(true);
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    /// Soft-disconnects a `(user, platform)` pair, clearing stored token
    /// material. Returns `false` when no connection exists.
    pub async fn deactivate_and_clear(&self, user_id: Uuid, platform: Platform) -> Result<bool> {
        let Some(existing) = self.find_by_user_and_platform(user_id, platform).await? else {
            return Ok(false);
        };

        let mut model: connection::ActiveModel = existing.into();
        model.access_token_ciphertext = Set(None);
        model.refresh_token_ciphertext = Set(None);
        model.expires_at = Set(None);
        model.is_active = Set(false);
        model.needs_reconnect = Set(false);
        model.updated_at = Set(Utc::now().into());
        model.update(&*self.db).await?;

        Ok(true)
    }

    /// Decrypts a connection's token fields, tolerating legacy plaintext rows
    pub fn decrypt_tokens(
        &self,
        connection: &connection::Model,
    ) -> Result<(Option<String>, Option<String>)> {
        let legacy_access = connection
            .access_token_ciphertext
            .as_ref()
            .is_some_and(|ct| !is_encrypted_payload(ct));
        let legacy_refresh = connection
            .refresh_token_ciphertext
            .as_ref()
            .is_some_and(|ct| !is_encrypted_payload(ct));

        if legacy_access || legacy_refresh {
            tracing::warn!(
                user_id = %connection.user_id,
                platform = %connection.platform,
                legacy_access_token = legacy_access,
                legacy_refresh_token = legacy_refresh,
                "Legacy plaintext tokens detected, they will be re-encrypted on the next refresh"
            );
        }

        let platform: Platform = connection.platform.parse()?;
        let aad = connection_aad(connection.user_id, platform);

        decrypt_token_pair(
            &self.crypto_key,
            &aad,
            connection.access_token_ciphertext.as_deref(),
            connection.refresh_token_ciphertext.as_deref(),
        )
        .map_err(|e| {
            // Log decryption failures without token details
            tracing::error!(
                user_id = %connection.user_id,
                platform = %connection.platform,
                "Token decryption failed"
            );
            anyhow!("Token decryption failed: {}", e)
        })
    }
}
