//! Integration settings entity model
//!
//! Admin-managed OAuth client credentials, one row per platform. The client
//! secret is encrypted at rest; everything else is plain configuration.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "integration_settings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Platform this row configures (unique)
    pub platform: String,

    /// App id / client key, depending on the platform's naming
    pub client_id: String,

    /// Encrypted client secret; NULL for public PKCE-only clients
    pub client_secret_ciphertext: Option<Vec<u8>>,

    /// `production`, `sandbox`, or `development`
    pub environment: String,

    /// Overrides the default callback URL when set
    pub callback_url: Option<String>,

    /// Stored for platform app configuration; not used by this service
    pub webhook_url: Option<String>,

    /// Platform-specific extras (e.g. Graph API version)
    #[sea_orm(column_type = "JsonBinary")]
    pub config_data: Option<JsonValue>,

    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
