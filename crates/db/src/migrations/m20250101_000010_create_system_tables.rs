//! Create system log, system setting and password reset tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SystemLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SystemLog::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SystemLog::LogType).string_len(16).not_null())
                    .col(ColumnDef::new(SystemLog::Action).string_len(64).not_null())
                    .col(ColumnDef::new(SystemLog::UserId).string_len(32))
                    .col(ColumnDef::new(SystemLog::TargetUserId).string_len(32))
                    .col(ColumnDef::new(SystemLog::Metadata).json())
                    .col(
                        ColumnDef::new(SystemLog::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: created_at (for retention purges)
        manager
            .create_index(
                Index::create()
                    .name("idx_system_log_created_at")
                    .table(SystemLog::Table)
                    .col(SystemLog::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SystemSetting::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SystemSetting::Key)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SystemSetting::Value).json().not_null())
                    .col(ColumnDef::new(SystemSetting::UpdatedBy).string_len(32))
                    .col(
                        ColumnDef::new(SystemSetting::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PasswordReset::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PasswordReset::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PasswordReset::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(PasswordReset::Token).string_len(64).not_null())
                    .col(
                        ColumnDef::new(PasswordReset::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PasswordReset::Used)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PasswordReset::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_password_reset_user")
                            .from(PasswordReset::Table, PasswordReset::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_password_reset_token")
                    .table(PasswordReset::Table)
                    .col(PasswordReset::Token)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PasswordReset::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SystemSetting::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SystemLog::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SystemLog {
    Table,
    Id,
    LogType,
    Action,
    UserId,
    TargetUserId,
    Metadata,
    CreatedAt,
}

#[derive(Iden)]
enum SystemSetting {
    Table,
    Key,
    Value,
    UpdatedBy,
    UpdatedAt,
}

#[derive(Iden)]
enum PasswordReset {
    Table,
    Id,
    UserId,
    Token,
    ExpiresAt,
    Used,
    CreatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
