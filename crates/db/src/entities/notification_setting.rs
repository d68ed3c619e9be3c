//! Per-user notification preferences.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_setting")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,

    #[sea_orm(default_value = true)]
    pub push_enabled: bool,

    #[sea_orm(default_value = true)]
    pub email_enabled: bool,

    #[sea_orm(default_value = true)]
    pub new_follower: bool,

    #[sea_orm(default_value = true)]
    pub new_post: bool,

    #[sea_orm(default_value = true)]
    pub post_liked: bool,

    #[sea_orm(default_value = true)]
    pub post_commented: bool,

    #[sea_orm(default_value = true)]
    pub admin_message: bool,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl ActiveModelBehavior for ActiveModel {}
