//! Resolution of per-platform OAuth client credentials.
//!
//! Database-stored integration settings are the primary source so operators
//! can rotate credentials at runtime; environment configuration is the
//! fallback so a fresh deployment works before the admin surface has been
//! touched.

use std::sync::Arc;

use thiserror::Error;

use crate::config::AppConfig;
use crate::models::integration_setting;
use crate::platforms::{Platform, PlatformCredentials};
use crate::repositories::IntegrationSettingRepository;

/// Errors from credential resolution.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("no client credentials configured for {0}")]
    NotConfigured(Platform),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Resolves client credentials for a platform, database first.
#[derive(Clone)]
pub struct CredentialsResolver {
    settings: IntegrationSettingRepository,
    config: Arc<AppConfig>,
}

impl CredentialsResolver {
    /// Creates a resolver over the settings repository and env config.
    pub fn new(settings: IntegrationSettingRepository, config: Arc<AppConfig>) -> Self {
        Self { settings, config }
    }

    /// Resolve credentials for a platform: active database settings win,
    /// environment variables fill in when no row exists.
    pub async fn resolve(
        &self,
        platform: Platform,
    ) -> Result<PlatformCredentials, CredentialsError> {
        if let Some(setting) = self.settings.find_active_by_platform(platform).await? {
            return Ok(self.from_setting(platform, &setting));
        }

        self.from_env(platform)
            .ok_or(CredentialsError::NotConfigured(platform))
    }

    fn from_setting(
        &self,
        platform: Platform,
        setting: &integration_setting::Model,
    ) -> PlatformCredentials {
        // An undecryptable secret (key rotation gone wrong) falls back to the
        // environment secret rather than taking the whole platform down
        let client_secret = match self.settings.decrypt_client_secret(setting) {
            Ok(secret) => secret,
            Err(error) => {
                tracing::warn!(
                    platform = %platform,
                    error = %error,
                    "Stored client secret unusable, trying environment secret"
                );
                self.env_pair(platform).and_then(|(_, secret)| secret)
            }
        };

        let redirect_uri = setting
            .callback_url
            .clone()
            .unwrap_or_else(|| self.default_callback_url(platform));

        PlatformCredentials {
            client_id: setting.client_id.clone(),
            client_secret,
            redirect_uri,
            environment: setting.environment.clone(),
            config: setting.config_data.clone(),
        }
    }

    fn from_env(&self, platform: Platform) -> Option<PlatformCredentials> {
        let (client_id, client_secret) = self.env_pair(platform)?;

        Some(PlatformCredentials {
            client_id,
            client_secret,
            redirect_uri: self.default_callback_url(platform),
            environment: "production".to_string(),
            config: None,
        })
    }

    fn env_pair(&self, platform: Platform) -> Option<(String, Option<String>)> {
        let cfg = &self.config;
        let (id, secret) = match platform {
            Platform::Tiktok => (&cfg.tiktok_client_key, &cfg.tiktok_client_secret),
            Platform::Instagram => (&cfg.instagram_app_id, &cfg.instagram_app_secret),
            Platform::Facebook => (&cfg.facebook_app_id, &cfg.facebook_app_secret),
            Platform::Youtube => (&cfg.youtube_client_id, &cfg.youtube_client_secret),
            Platform::Threads => (&cfg.threads_app_id, &cfg.threads_app_secret),
            Platform::X => (&cfg.x_client_id, &cfg.x_client_secret),
        };

        id.clone().map(|id| (id, secret.clone()))
    }

    fn default_callback_url(&self, platform: Platform) -> String {
        format!(
            "{}/auth/{}/callback",
            self.config.public_base_url.trim_end_matches('/'),
            platform
        )
    }
}
