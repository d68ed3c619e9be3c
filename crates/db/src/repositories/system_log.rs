//! System log repository.

use std::sync::Arc;

use super::map_write_err;
use crate::entities::{
    SystemLog,
    system_log::{self, LogType},
};
use chorus_common::{AppError, AppResult};
use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};

/// System log repository for database operations.
#[derive(Clone)]
pub struct SystemLogRepository {
    db: Arc<DatabaseConnection>,
}

impl SystemLogRepository {
    /// Create a new system log repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Append a log entry.
    pub async fn create(&self, model: system_log::ActiveModel) -> AppResult<system_log::Model> {
        model.insert(self.db.as_ref()).await.map_err(map_write_err)
    }

    /// Log entries, optionally of one type, newest first.
    pub async fn find_recent(
        &self,
        log_type: Option<LogType>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<system_log::Model>> {
        let mut query = SystemLog::find().order_by_desc(system_log::Column::Id);

        if let Some(log_type) = log_type {
            query = query.filter(system_log::Column::LogType.eq(log_type));
        }

        query
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete entries older than the cutoff.
    pub async fn purge_before(&self, cutoff: DateTime<FixedOffset>) -> AppResult<u64> {
        let result = SystemLog::delete_many()
            .filter(system_log::Column::CreatedAt.lt(cutoff))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Count all entries.
    pub async fn count(&self) -> AppResult<u64> {
        SystemLog::find()
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
