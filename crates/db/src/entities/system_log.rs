//! System log entity (audit trail of privileged actions).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Category of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogType {
    #[sea_orm(string_value = "ADMIN_ACTION")]
    AdminAction,
    #[sea_orm(string_value = "GOD_ACTION")]
    GodAction,
    #[sea_orm(string_value = "SYSTEM")]
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_log")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub log_type: LogType,

    /// Machine-readable action name, e.g. `BLOCK_USER`
    pub action: String,

    /// Acting user
    #[sea_orm(nullable)]
    pub user_id: Option<String>,

    #[sea_orm(nullable)]
    pub target_user_id: Option<String>,

    #[sea_orm(column_type = "Json", nullable)]
    pub metadata: Option<Json>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
