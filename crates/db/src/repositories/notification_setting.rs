//! Notification setting repository.

use std::sync::Arc;

use super::map_write_err;
use crate::entities::{NotificationSetting, notification_setting};
use chorus_common::{AppError, AppResult};
use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, NotSet, Set, sea_query::OnConflict,
};
use serde::Deserialize;

/// Partial update of notification preferences; `None` leaves a flag as is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettingUpdate {
    pub push_enabled: Option<bool>,
    pub email_enabled: Option<bool>,
    pub new_follower: Option<bool>,
    pub new_post: Option<bool>,
    pub post_liked: Option<bool>,
    pub post_commented: Option<bool>,
    pub admin_message: Option<bool>,
}

/// Notification setting repository for database operations.
#[derive(Clone)]
pub struct NotificationSettingRepository {
    db: Arc<DatabaseConnection>,
}

impl NotificationSettingRepository {
    /// Create a new notification setting repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the settings of a user.
    pub async fn find(&self, user_id: &str) -> AppResult<Option<notification_setting::Model>> {
        NotificationSetting::find_by_id(user_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get the settings of a user, creating the all-enabled defaults on first access.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<notification_setting::Model> {
        self.upsert(user_id, &NotificationSettingUpdate::default(), now)
            .await
    }

    /// Apply a partial update, creating the row when absent.
    pub async fn upsert(
        &self,
        user_id: &str,
        update: &NotificationSettingUpdate,
        now: DateTime<FixedOffset>,
    ) -> AppResult<notification_setting::Model> {
        let defaults = notification_setting::ActiveModel {
            user_id: Set(user_id.to_string()),
            push_enabled: Set(update.push_enabled.unwrap_or(true)),
            email_enabled: Set(update.email_enabled.unwrap_or(true)),
            new_follower: Set(update.new_follower.unwrap_or(true)),
            new_post: Set(update.new_post.unwrap_or(true)),
            post_liked: Set(update.post_liked.unwrap_or(true)),
            post_commented: Set(update.post_commented.unwrap_or(true)),
            admin_message: Set(update.admin_message.unwrap_or(true)),
            updated_at: Set(now),
        };

        // Insert-if-absent, then apply the explicit fields
        NotificationSetting::insert(defaults)
            .on_conflict(
                OnConflict::column(notification_setting::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(map_write_err)?;

        let changes = notification_setting::ActiveModel {
            user_id: Set(user_id.to_string()),
            push_enabled: update.push_enabled.map_or(NotSet, Set),
            email_enabled: update.email_enabled.map_or(NotSet, Set),
            new_follower: update.new_follower.map_or(NotSet, Set),
            new_post: update.new_post.map_or(NotSet, Set),
            post_liked: update.post_liked.map_or(NotSet, Set),
            post_commented: update.post_commented.map_or(NotSet, Set),
            admin_message: update.admin_message.map_or(NotSet, Set),
            updated_at: Set(now),
        };

        changes
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
