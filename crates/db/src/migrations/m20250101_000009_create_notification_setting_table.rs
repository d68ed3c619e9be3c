//! Create notification setting table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let mut table = Table::create();
        table
            .table(NotificationSetting::Table)
            .if_not_exists()
            .col(
                ColumnDef::new(NotificationSetting::UserId)
                    .string_len(32)
                    .not_null()
                    .primary_key(),
            );

        for flag in [
            NotificationSetting::PushEnabled,
            NotificationSetting::EmailEnabled,
            NotificationSetting::NewFollower,
            NotificationSetting::NewPost,
            NotificationSetting::PostLiked,
            NotificationSetting::PostCommented,
            NotificationSetting::AdminMessage,
        ] {
            table.col(ColumnDef::new(flag).boolean().not_null().default(true));
        }

        table
            .col(
                ColumnDef::new(NotificationSetting::UpdatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_notification_setting_user")
                    .from(NotificationSetting::Table, NotificationSetting::UserId)
                    .to(User::Table, User::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            );

        manager.create_table(table.to_owned()).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NotificationSetting::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum NotificationSetting {
    Table,
    UserId,
    PushEnabled,
    EmailEnabled,
    NewFollower,
    NewPost,
    PostLiked,
    PostCommented,
    AdminMessage,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
