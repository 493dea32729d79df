//! # OAuth State Repository
//!
//! This module provides database operations for the short-lived state rows
//! that tie an authorization redirect back to the callback that follows it.

use chrono::{Duration, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, QueryFilter,
    Set, Statement,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::oauth_state::{self, ActiveModel, Entity, Model};
use crate::platforms::Platform;

/// Repository for OAuth state database operations
pub struct OAuthStateRepository {
    db: Arc<DatabaseConnection>,
}

impl OAuthStateRepository {
    /// Create a new OAuth state repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new OAuth state record
    pub async fn create(
        &self,
        user_id: Uuid,
        platform: Platform,
        state: &str,
        code_verifier: Option<String>,
        expires_in_minutes: i64,
    ) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now();
        let expires_at = now + Duration::minutes(expires_in_minutes);

        let oauth_state = Model {
            id: Uuid::new_v4(),
            user_id,
            platform: platform.as_str().to_string(),
            state: state.to_string(),
            code_verifier,
            expires_at,
            created_at: now,
            updated_at: now,
        };

        match self.db.get_database_backend() {
            // Insert using raw SQL on SQLite to avoid SeaORM's UnpackInsertId
            // error with text-stored uuid keys
            DatabaseBackend::Sqlite => {
                let insert_query = Statement::from_sql_and_values(
                    DatabaseBackend::Sqlite,
                    r#"
                    INSERT INTO oauth_states (
                        id, user_id, platform, state, code_verifier,
                        expires_at, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                    vec![
                        oauth_state.id.into(),
                        oauth_state.user_id.into(),
                        oauth_state.platform.clone().into(),
                        oauth_state.state.clone().into(),
                        oauth_state.code_verifier.clone().into(),
                        oauth_state.expires_at.into(),
                        oauth_state.created_at.into(),
                        oauth_state.updated_at.into(),
                    ],
                );

                self.db.execute(insert_query).await?;
            }
            _ => {
                let active = ActiveModel {
                    id: Set(oauth_state.id),
                    user_id: Set(oauth_state.user_id),
                    platform: Set(oauth_state.platform.clone()),
                    state: Set(oauth_state.state.clone()),
                    code_verifier: Set(oauth_state.code_verifier.clone()),
                    expires_at: Set(oauth_state.expires_at),
                    created_at: Set(oauth_state.created_at),
                    updated_at: Set(oauth_state.updated_at),
                };
                Entity::insert(active).exec(&*self.db).await?;
            }
        }

        Ok(oauth_state)
    }

    /// Look up an unexpired state for a platform and delete it so it cannot
    /// be replayed.
    ///
    /// Expired, unknown, and already-consumed states are indistinguishable to
    /// the caller; all come back as `None`.
    pub async fn find_and_consume(
        &self,
        platform: Platform,
        state: &str,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        let found = Entity::find()
            .filter(oauth_state::Column::Platform.eq(platform.as_str()))
            .filter(oauth_state::Column::State.eq(state))
            .filter(oauth_state::Column::ExpiresAt.gt(Utc::now()))
            .one(&*self.db)
            .await?;

        if let Some(ref model) = found {
            // Delete the state to prevent reuse
            let _ = Entity::delete_by_id(model.id).exec(&*self.db).await?;
        }

        Ok(found)
    }

    /// Delete a specific OAuth state by ID
    pub async fn delete_by_id(&self, id: Uuid) -> Result<bool, sea_orm::DbErr> {
        let result = Entity::delete_by_id(id).exec(&*self.db).await?;
        Ok(result.rows_affected > 0)
    }

    /// Clean up expired OAuth states
    pub async fn cleanup_expired(&self) -> Result<u64, sea_orm::DbErr> {
        let result = Entity::delete_many()
            .filter(oauth_state::Column::ExpiresAt.lt(Utc::now()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
