//! System setting repository.

use std::sync::Arc;

use super::map_write_err;
use crate::entities::{SystemSetting, system_setting};
use chorus_common::{AppError, AppResult};
use chrono::{DateTime, FixedOffset};
use sea_orm::{DatabaseConnection, EntityTrait, Set, sea_query::OnConflict};
use serde_json::Value;

/// System setting repository for database operations.
#[derive(Clone)]
pub struct SystemSettingRepository {
    db: Arc<DatabaseConnection>,
}

impl SystemSettingRepository {
    /// Create a new system setting repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Read a setting.
    pub async fn get(&self, key: &str) -> AppResult<Option<system_setting::Model>> {
        SystemSetting::find_by_id(key)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Write a setting, replacing any previous value.
    pub async fn upsert(
        &self,
        key: &str,
        value: Value,
        updated_by: Option<String>,
        now: DateTime<FixedOffset>,
    ) -> AppResult<system_setting::Model> {
        let model = system_setting::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value),
            updated_by: Set(updated_by),
            updated_at: Set(now),
        };

        SystemSetting::insert(model)
            .on_conflict(
                OnConflict::column(system_setting::Column::Key)
                    .update_columns([
                        system_setting::Column::Value,
                        system_setting::Column::UpdatedBy,
                        system_setting::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(map_write_err)?;

        self.get(key)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Setting {key} vanished after upsert")))
    }
}
