//! # Data Models
//!
//! This module contains all the data models used throughout the Social
//! Connect API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod connection;
pub mod integration_setting;
pub mod oauth_state;

pub use connection::Entity as Connection;
pub use integration_setting::Entity as IntegrationSetting;
pub use oauth_state::Entity as OAuthState;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "postbridge-social-connect".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
