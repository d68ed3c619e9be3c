//! Password reset repository.

use std::sync::Arc;

use super::map_write_err;
use crate::entities::{PasswordReset, password_reset};
use chorus_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, sea_query::Expr,
};

/// Password reset repository for database operations.
#[derive(Clone)]
pub struct PasswordResetRepository {
    db: Arc<DatabaseConnection>,
}

impl PasswordResetRepository {
    /// Create a new password reset repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Store a reset token.
    pub async fn create(
        &self,
        model: password_reset::ActiveModel,
    ) -> AppResult<password_reset::Model> {
        model.insert(self.db.as_ref()).await.map_err(map_write_err)
    }

    /// Find a reset record by its token.
    pub async fn find_by_token(&self, token: &str) -> AppResult<Option<password_reset::Model>> {
        PasswordReset::find()
            .filter(password_reset::Column::Token.eq(token))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark a reset record used. Returns `false` when it was already consumed,
    /// so two concurrent resets with one token cannot both succeed.
    pub async fn claim(&self, id: &str) -> AppResult<bool> {
        let result = PasswordReset::update_many()
            .col_expr(password_reset::Column::Used, Expr::value(true))
            .filter(password_reset::Column::Id.eq(id))
            .filter(password_reset::Column::Used.eq(false))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }
}
