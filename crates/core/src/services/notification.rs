//! Notification service.
//!
//! Notifications are written by the fan-out engine; this service only reads
//! and acknowledges them on behalf of their recipient.

use chorus_common::AppResult;
use chorus_db::{entities::notification, repositories::NotificationRepository};

use super::guard::{gates, guarded};
use super::identity::Caller;

const MAX_PAGE: u64 = 100;

/// Notification service for business logic.
#[derive(Clone)]
pub struct NotificationService {
    notification_repo: NotificationRepository,
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub const fn new(notification_repo: NotificationRepository) -> Self {
        Self { notification_repo }
    }

    /// The caller's notifications, newest first.
    pub async fn list(
        &self,
        caller: &Caller,
        unread_only: bool,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<notification::Model>> {
        guarded(gates::NOTIFICATIONS, caller, |me| async move {
            self.notification_repo
                .find_by_user(me.id(), unread_only, limit.clamp(1, MAX_PAGE), offset)
                .await
        })
        .await
    }

    pub async fn unread_count(&self, caller: &Caller) -> AppResult<u64> {
        guarded(gates::NOTIFICATIONS, caller, |me| async move {
            self.notification_repo.count_unread(me.id()).await
        })
        .await
    }

    /// Mark one of the caller's notifications read. Anyone else's is `NotFound`.
    pub async fn mark_read(
        &self,
        caller: &Caller,
        notification_id: &str,
    ) -> AppResult<notification::Model> {
        guarded(gates::NOTIFICATIONS, caller, |me| async move {
            self.notification_repo
                .mark_as_read(notification_id, me.id())
                .await
        })
        .await
    }

    /// Mark all of the caller's notifications read, returning how many changed.
    pub async fn mark_all_read(&self, caller: &Caller) -> AppResult<u64> {
        guarded(gates::NOTIFICATIONS, caller, |me| async move {
            self.notification_repo.mark_all_as_read(me.id()).await
        })
        .await
    }
}
