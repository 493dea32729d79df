//! Migration to create the integration_settings table.
//!
//! Admin-managed OAuth client credentials, one row per platform. When no row
//! exists the service falls back to environment-variable credentials.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IntegrationSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IntegrationSettings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IntegrationSettings::Platform)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationSettings::ClientId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationSettings::ClientSecretCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationSettings::Environment)
                            .text()
                            .not_null()
                            .default("production"),
                    )
                    .col(
                        ColumnDef::new(IntegrationSettings::CallbackUrl)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(IntegrationSettings::WebhookUrl).text().null())
                    .col(
                        ColumnDef::new(IntegrationSettings::ConfigData)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationSettings::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(IntegrationSettings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(IntegrationSettings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_integration_settings_platform")
                    .table(IntegrationSettings::Table)
                    .col(IntegrationSettings::Platform)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_integration_settings_platform")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(IntegrationSettings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum IntegrationSettings {
    Table,
    Id,
    Platform,
    ClientId,
    ClientSecretCiphertext,
    Environment,
    CallbackUrl,
    WebhookUrl,
    ConfigData,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
