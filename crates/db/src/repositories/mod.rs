//! Repositories wrapping entity access behind typed operations.

mod comment;
mod following;
mod notification;
mod notification_setting;
mod password_reset;
mod post;
mod post_like;
mod push_token;
mod report;
mod system_log;
mod system_setting;
mod user;

pub use comment::CommentRepository;
pub use following::FollowingRepository;
pub use notification::NotificationRepository;
pub use notification_setting::{NotificationSettingRepository, NotificationSettingUpdate};
pub use password_reset::PasswordResetRepository;
pub use post::PostRepository;
pub use post_like::PostLikeRepository;
pub use push_token::PushTokenRepository;
pub use report::ReportRepository;
pub use system_log::SystemLogRepository;
pub use system_setting::SystemSettingRepository;
pub use user::{UserRepository, UserSearch};

use chorus_common::AppError;
use sea_orm::{DbErr, SqlErr};

/// Translate a write failure, keeping unique-index violations distinguishable.
///
/// Callers that guard a uniqueness rule match on
/// [`AppError::ConstraintViolation`] and convert it into their domain error.
pub(crate) fn map_write_err(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => AppError::ConstraintViolation(detail),
        _ => AppError::Database(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_constraint_errors_stay_database_errors() {
        let err = map_write_err(DbErr::Custom("connection reset".to_string()));
        assert!(matches!(err, AppError::Database(msg) if msg.contains("connection reset")));
    }
}
