//! User repository.

use std::sync::Arc;

use super::map_write_err;
use crate::entities::{
    User,
    user::{self, Role, UserStatus},
};
use chorus_common::{AppError, AppResult};
use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
    sea_query::{Expr, Func},
};

/// Filters for user listings.
#[derive(Debug, Clone, Default)]
pub struct UserSearch {
    /// Matched against username and display name, case-insensitively.
    pub query: Option<String>,
    pub status: Option<UserStatus>,
    pub role: Option<Role>,
}

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<user::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {id}")))
    }

    /// Find users by IDs. Missing ids are skipped.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        User::find()
            .filter(user::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by (lower-cased) email.
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Email.eq(email.to_lowercase()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by (lower-cased) username.
    pub async fn find_by_username(&self, username: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Username.eq(username.to_lowercase()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user linked to a Google account subject.
    pub async fn find_by_google_id(&self, subject: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::GoogleId.eq(subject))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user linked to an Apple account subject.
    pub async fn find_by_apple_id(&self, subject: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::AppleId.eq(subject))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new user.
    pub async fn create(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model.insert(self.db.as_ref()).await.map_err(map_write_err)
    }

    /// Update a user.
    pub async fn update(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model.update(self.db.as_ref()).await.map_err(map_write_err)
    }

    /// Search users, newest first.
    pub async fn search(
        &self,
        filter: &UserSearch,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<user::Model>> {
        let mut query = User::find();

        if let Some(q) = filter.query.as_deref().map(str::trim)
            && !q.is_empty()
        {
            let pattern = format!("%{}%", q.to_lowercase());
            query = query.filter(
                Condition::any()
                    .add(user::Column::Username.like(pattern.clone()))
                    .add(
                        Expr::expr(Func::lower(Expr::col(user::Column::DisplayName)))
                            .like(pattern),
                    ),
            );
        }
        if let Some(status) = filter.status {
            query = query.filter(user::Column::Status.eq(status));
        }
        if let Some(role) = filter.role {
            query = query.filter(user::Column::Role.eq(role));
        }

        query
            .order_by_desc(user::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find every user holding one of the given roles.
    pub async fn find_by_roles(&self, roles: &[Role]) -> AppResult<Vec<user::Model>> {
        User::find()
            .filter(user::Column::Role.is_in(roles.iter().copied()))
            .order_by_asc(user::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count all users.
    pub async fn count(&self) -> AppResult<u64> {
        User::find()
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count users holding one of the given roles.
    pub async fn count_by_roles(&self, roles: &[Role]) -> AppResult<u64> {
        User::find()
            .filter(user::Column::Role.is_in(roles.iter().copied()))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count users seen since the given instant.
    pub async fn count_active_since(&self, since: DateTime<FixedOffset>) -> AppResult<u64> {
        User::find()
            .filter(user::Column::LastActiveAt.gte(since))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Return users whose temporary block ended before `now` to ACTIVE.
    pub async fn lift_expired_blocks(&self, now: DateTime<FixedOffset>) -> AppResult<u64> {
        let result = User::update_many()
            .col_expr(user::Column::Status, Expr::value(UserStatus::Active))
            .col_expr(user::Column::BlockedAt, Expr::value(Option::<DateTime<FixedOffset>>::None))
            .col_expr(user::Column::BlockedReason, Expr::value(Option::<String>::None))
            .col_expr(user::Column::BlockedBy, Expr::value(Option::<String>::None))
            .col_expr(
                user::Column::BlockedUntil,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(user::Column::Status.eq(UserStatus::Blocked))
            .filter(user::Column::BlockedUntil.lt(now))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}
