//! Notification entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Notification types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    #[sea_orm(string_value = "NEW_POST")]
    NewPost,
    #[sea_orm(string_value = "POST_LIKED")]
    PostLiked,
    #[sea_orm(string_value = "POST_COMMENTED")]
    PostCommented,
    #[sea_orm(string_value = "NEW_FOLLOWER")]
    NewFollower,
    #[sea_orm(string_value = "USER_BLOCKED")]
    UserBlocked,
    #[sea_orm(string_value = "POST_DELETED")]
    PostDeleted,
    #[sea_orm(string_value = "ADMIN_MESSAGE")]
    AdminMessage,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Recipient
    pub user_id: String,

    pub notification_type: NotificationType,

    /// Actor, if the notification was caused by another user
    #[sea_orm(nullable)]
    pub from_user_id: Option<String>,

    #[sea_orm(nullable)]
    pub post_id: Option<String>,

    #[sea_orm(nullable)]
    pub comment_id: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    #[sea_orm(column_type = "Json", nullable)]
    pub metadata: Option<Json>,

    #[sea_orm(default_value = false)]
    pub is_read: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Recipient,
}

impl ActiveModelBehavior for ActiveModel {}
