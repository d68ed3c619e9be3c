//! User entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Privilege tier of an account.
///
/// The variants are listed from least to most privileged, but access checks
/// never compare them; every gate names the exact roles it admits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[derive(Default)]
pub enum Role {
    #[sea_orm(string_value = "USER")]
    #[default]
    User,
    #[sea_orm(string_value = "ADMIN")]
    Admin,
    #[sea_orm(string_value = "SUPER_ADMIN")]
    SuperAdmin,
    #[sea_orm(string_value = "GOD")]
    God,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
            Self::SuperAdmin => "SUPER_ADMIN",
            Self::God => "GOD",
        }
    }
}

/// Lifecycle status of an account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[derive(Default)]
pub enum UserStatus {
    #[sea_orm(string_value = "ACTIVE")]
    #[default]
    Active,
    #[sea_orm(string_value = "BLOCKED")]
    Blocked,
    #[sea_orm(string_value = "DELETED")]
    Deleted,
    #[sea_orm(string_value = "PENDING")]
    Pending,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Lower-cased at write time
    #[sea_orm(unique, nullable)]
    pub email: Option<String>,

    /// Lower-cased at write time
    #[sea_orm(unique)]
    pub username: String,

    /// Argon2 PHC string; NULL for social-only accounts
    #[sea_orm(nullable)]
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    #[sea_orm(nullable)]
    pub display_name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub bio: Option<String>,

    #[sea_orm(nullable)]
    pub avatar_url: Option<String>,

    pub role: Role,

    pub status: UserStatus,

    #[sea_orm(default_value = false)]
    pub email_verified: bool,

    /// Google account subject
    #[sea_orm(unique, nullable)]
    #[serde(skip_serializing)]
    pub google_id: Option<String>,

    /// Apple account subject
    #[sea_orm(unique, nullable)]
    #[serde(skip_serializing)]
    pub apple_id: Option<String>,

    #[sea_orm(nullable)]
    pub blocked_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "Text", nullable)]
    pub blocked_reason: Option<String>,

    /// Moderator who applied the block
    #[sea_orm(nullable)]
    pub blocked_by: Option<String>,

    /// End of a temporary block; NULL means indefinite
    #[sea_orm(nullable)]
    pub blocked_until: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub last_active_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::post::Entity")]
    Posts,
}

impl Related<super::post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Posts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the account is currently blocked by a moderator.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.status == UserStatus::Blocked
    }
}
