//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities, providing a clean API for data access.

pub mod connection;
pub mod integration_setting;
pub mod oauth_state;

pub use connection::{ConnectionRepository, ConnectionTokens};
pub use integration_setting::{IntegrationSettingRepository, SettingsUpdate};
pub use oauth_state::OAuthStateRepository;
