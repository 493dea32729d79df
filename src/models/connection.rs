//! Connection entity model
//!
//! One row per (user, platform) pair holding the encrypted token material,
//! expiry, granted scope, and a denormalized profile snapshot for the UI.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A user's authorization against one social platform
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    /// Unique identifier for the connection (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Owning application user
    pub user_id: Uuid,

    /// Platform this connection belongs to (stable snake_case string form)
    pub platform: String,

    /// External account id on the platform
    pub platform_user_id: String,

    /// Encrypted access token
    pub access_token_ciphertext: Option<Vec<u8>>,

    /// Encrypted refresh token; absent for platforms that never issue one
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// Access token expiry; NULL means treat the token as non-expiring
    pub expires_at: Option<DateTimeWithTimeZone>,

    /// Granted scope as the platform's raw delimited string
    pub scope: Option<String>,

    /// Profile snapshot captured at connect time
    #[sea_orm(column_type = "JsonBinary")]
    pub profile_data: Option<JsonValue>,

    /// Cleared on disconnect; inactive rows never yield tokens
    pub is_active: bool,

    /// Set when a refresh failed permanently; the UI prompts re-authorization
    pub needs_reconnect: bool,

    pub created_at: DateTimeWithTimeZone,

    /// Doubles as the token issue time: tokens are only written on
    /// exchange or refresh
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
