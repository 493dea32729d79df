//! # OAuth State Model
//!
//! Server-stored CSRF state for in-flight authorization rounds. Rows are
//! single-use: the callback consumes them, and expired leftovers are swept.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use uuid::Uuid;

/// One in-flight authorization round trip
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_states")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// User who started the authorization
    pub user_id: Uuid,

    /// Platform being authorized
    pub platform: String,

    /// State token generated for CSRF protection
    pub state: String,

    /// PKCE code verifier, held until the token exchange
    pub code_verifier: Option<String>,

    /// Expiration timestamp
    pub expires_at: chrono::DateTime<chrono::Utc>,

    /// When the state was created
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// When the state was last updated
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
