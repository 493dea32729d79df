//! Database migrations for the Social Connect API.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_05_12_102000_create_connections;
mod m2026_05_12_102100_create_integration_settings;
mod m2026_05_20_090000_create_oauth_states;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_05_12_102000_create_connections::Migration),
            Box::new(m2026_05_12_102100_create_integration_settings::Migration),
            Box::new(m2026_05_20_090000_create_oauth_states::Migration),
        ]
    }
}
