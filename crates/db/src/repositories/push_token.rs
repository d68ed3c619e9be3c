//! Push token repository.

use std::sync::Arc;

use super::map_write_err;
use crate::entities::{PushToken, push_token};
use chorus_common::{AppError, AppResult};
use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set,
    sea_query::OnConflict,
};

/// Push token repository for database operations.
#[derive(Clone)]
pub struct PushTokenRepository {
    db: Arc<DatabaseConnection>,
}

impl PushTokenRepository {
    /// Create a new push token repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a registration by (user, token).
    pub async fn find_by_pair(
        &self,
        user_id: &str,
        token: &str,
    ) -> AppResult<Option<push_token::Model>> {
        PushToken::find()
            .filter(push_token::Column::UserId.eq(user_id))
            .filter(push_token::Column::Token.eq(token))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Register a device token, reactivating an existing (user, token) pair.
    ///
    /// The insert resolves conflicts on the unique pair inside the store, so
    /// concurrent registrations of the same device converge on one row.
    pub async fn upsert(
        &self,
        id: String,
        user_id: &str,
        token: &str,
        platform: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<push_token::Model> {
        let model = push_token::ActiveModel {
            id: Set(id),
            user_id: Set(user_id.to_string()),
            token: Set(token.to_string()),
            platform: Set(platform.to_string()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        PushToken::insert(model)
            .on_conflict(
                OnConflict::columns([push_token::Column::UserId, push_token::Column::Token])
                    .update_columns([
                        push_token::Column::Platform,
                        push_token::Column::IsActive,
                        push_token::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(map_write_err)?;

        self.find_by_pair(user_id, token)
            .await?
            .ok_or_else(|| AppError::Internal("Push token vanished after upsert".to_string()))
    }

    /// Active registrations of the given users.
    pub async fn find_active_by_users(&self, user_ids: &[String]) -> AppResult<Vec<push_token::Model>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }

        PushToken::find()
            .filter(push_token::Column::UserId.is_in(user_ids.to_vec()))
            .filter(push_token::Column::IsActive.eq(true))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count all registrations.
    pub async fn count(&self) -> AppResult<u64> {
        PushToken::find()
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
