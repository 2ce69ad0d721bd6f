use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202601120006_create_webauthn_challenges"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("webauthn_challenges"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("challenge_ref")).string().not_null().primary_key())
                    .col(ColumnDef::new(Alias::new("user_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("ceremony")).string().not_null())
                    .col(ColumnDef::new(Alias::new("state_json")).text().not_null())
                    .col(ColumnDef::new(Alias::new("created_at")).timestamp().not_null())
                    .col(ColumnDef::new(Alias::new("expires_at")).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Lazy-expiry scans filter on expires_at.
        manager
            .create_index(
                Index::create()
                    .name("ix_webauthn_challenges_expires_at")
                    .table(Alias::new("webauthn_challenges"))
                    .col(Alias::new("expires_at"))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("webauthn_challenges")).to_owned())
            .await
    }
}
