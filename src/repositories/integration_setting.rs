//! Integration settings repository
//!
//! This module provides the IntegrationSettingRepository struct which
//! encapsulates SeaORM operations for the per-platform OAuth client
//! credentials, with the client secret encrypted at rest.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{CryptoKey, decrypt_token, encrypt_token, settings_aad};
use crate::models::integration_setting::{self, Entity as IntegrationSetting};
use crate::platforms::Platform;

/// Fields accepted by `upsert`.
///
/// `client_secret: None` keeps an existing secret in place on update (and
/// stores none on first insert, which is how public clients are configured).
#[derive(Debug, Default)]
pub struct SettingsUpdate {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub environment: Option<String>,
    pub callback_url: Option<String>,
    pub webhook_url: Option<String>,
    pub config_data: Option<JsonValue>,
    pub is_active: Option<bool>,
}

/// Repository for integration settings database operations
#[derive(Debug, Clone)]
pub struct IntegrationSettingRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Crypto key for client secret encryption
    pub crypto_key: CryptoKey,
}

impl IntegrationSettingRepository {
    /// Creates a new IntegrationSettingRepository instance
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Finds the settings row for a platform, active or not
    pub async fn find_by_platform(
        &self,
        platform: Platform,
    ) -> Result<Option<integration_setting::Model>> {
        Ok(IntegrationSetting::find()
            .filter(integration_setting::Column::Platform.eq(platform.as_str()))
            .one(&*self.db)
            .await?)
    }

    /// Finds the active settings row for a platform
    pub async fn find_active_by_platform(
        &self,
        platform: Platform,
    ) -> Result<Option<integration_setting::Model>> {
        Ok(IntegrationSetting::find()
            .filter(integration_setting::Column::Platform.eq(platform.as_str()))
            .filter(integration_setting::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?)
    }

    /// Lists all settings rows ordered by platform name
    pub async fn list_all(&self) -> Result<Vec<integration_setting::Model>> {
        Ok(IntegrationSetting::find()
            .order_by_asc(integration_setting::Column::Platform)
            .all(&*self.db)
            .await?)
    }

    /// Creates or updates the settings row for a platform, encrypting the
    /// client secret when one is supplied
    pub async fn upsert(
        &self,
        platform: Platform,
        update: SettingsUpdate,
    ) -> Result<integration_setting::Model> {
        let secret_cipher = update
            .client_secret
            .as_deref()
            .map(|secret| encrypt_token(&self.crypto_key, &settings_aad(platform), secret))
            .transpose()
            .map_err(|e| anyhow!("Client secret encryption failed: {}", e))?;

        let now: DateTimeWithTimeZone = Utc::now().into();

        if let Some(existing) = self.find_by_platform(platform).await? {
            let mut model: integration_setting::ActiveModel = existing.into();
            model.client_id = Set(update.client_id);
            if let Some(cipher) = secret_cipher {
                model.client_secret_ciphertext = Set(Some(cipher));
            }
            if let Some(environment) = update.environment {
                model.environment = Set(environment);
            }
            if update.callback_url.is_some() {
                model.callback_url = Set(update.callback_url);
            }
            if update.webhook_url.is_some() {
                model.webhook_url = Set(update.webhook_url);
            }
            if update.config_data.is_some() {
                model.config_data = Set(update.config_data);
            }
            if let Some(active) = update.is_active {
                model.is_active = Set(active);
            }
            model.updated_at = Set(now);

            return Ok(model.update(&*self.db).await?);
        }

        let id = Uuid::new_v4();
        let active = integration_setting::ActiveModel {
            id: Set(id),
            platform: Set(platform.as_str().to_string()),
            client_id: Set(update.client_id),
            client_secret_ciphertext: Set(secret_cipher),
            environment: Set(update
                .environment
                .unwrap_or_else(|| "production".to_string())),
            callback_url: Set(update.callback_url),
            webhook_url: Set(update.webhook_url),
            config_data: Set(update.config_data),
            is_active: Set(update.is_active.unwrap_or(true)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        IntegrationSetting::insert(active)
            .exec_without_returning(&*self.db)
            .await?;

        // For SQLite, query the record directly since we already know the ID
        let fetched = IntegrationSetting::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("integration settings for '{}' not persisted", platform))
    }

    /// Deletes the settings row for a platform. Returns `false` when no row
    /// exists.
    pub async fn delete_by_platform(&self, platform: Platform) -> Result<bool> {
        let result = IntegrationSetting::delete_many()
            .filter(integration_setting::Column::Platform.eq(platform.as_str()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Decrypts the stored client secret, tolerating legacy plaintext rows
    pub fn decrypt_client_secret(
        &self,
        setting: &integration_setting::Model,
    ) -> Result<Option<String>> {
        let Some(cipher) = setting.client_secret_ciphertext.as_deref() else {
            return Ok(None);
        };

        let platform: Platform = setting.platform.parse()?;
        decrypt_token(&self.crypto_key, &settings_aad(platform), cipher)
            .map(Some)
            .map_err(|e| {
                tracing::error!(
                    platform = %setting.platform,
                    "Client secret decryption failed"
                );
                anyhow!("Client secret decryption failed: {}", e)
            })
    }
}
