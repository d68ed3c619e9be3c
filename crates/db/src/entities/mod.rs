//! Database entities.

#![allow(missing_docs)]

pub mod comment;
pub mod following;
pub mod notification;
pub mod notification_setting;
pub mod password_reset;
pub mod post;
pub mod post_like;
pub mod push_token;
pub mod report;
pub mod system_log;
pub mod system_setting;
pub mod user;

pub use comment::Entity as Comment;
pub use following::Entity as Following;
pub use notification::Entity as Notification;
pub use notification_setting::Entity as NotificationSetting;
pub use password_reset::Entity as PasswordReset;
pub use post::Entity as Post;
pub use post_like::Entity as PostLike;
pub use push_token::Entity as PushToken;
pub use report::Entity as Report;
pub use system_log::Entity as SystemLog;
pub use system_setting::Entity as SystemSetting;
pub use user::Entity as User;
