//! Create push token table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PushToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PushToken::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PushToken::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(PushToken::Token).string_len(512).not_null())
                    .col(ColumnDef::new(PushToken::Platform).string_len(16).not_null())
                    .col(
                        ColumnDef::new(PushToken::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(PushToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(PushToken::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_push_token_user")
                            .from(PushToken::Table, PushToken::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (user_id, token) - one registration per device per user
        manager
            .create_index(
                Index::create()
                    .name("idx_push_token_user_token")
                    .table(PushToken::Table)
                    .col(PushToken::UserId)
                    .col(PushToken::Token)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PushToken::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum PushToken {
    Table,
    Id,
    UserId,
    Token,
    Platform,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
