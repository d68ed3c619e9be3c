//! Client-visible streaming channels.
//!
//! Each channel names the gate a subscriber must pass, the bus topics it
//! listens on and the filter applied at delivery time.

use std::fmt;
use std::sync::Arc;

use chorus_common::AppResult;
use chorus_db::repositories::FollowingRepository;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::event_bus::{
    AcceptAll, Delivery, EventBus, EventFilter, FollowsAuthor, PostIs, RecipientIs,
    SubscriberContext, SubscriptionHandle, Topic,
};
use super::guard::{Gate, gates};
use super::identity::Caller;
use super::post::PostService;

/// A streaming channel as requested by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "channel",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum StreamChannel {
    NewNotification,
    NewPostFromFollowing,
    NewComment { post_id: String },
    PostLiked { post_id: String },
    PushNotificationStatus,
    SystemMaintenance,
    NewReport,
    UserStatusChanged,
    SystemAlert,
    SystemActivity,
    AdminActivity,
    CriticalAlert,
}

impl StreamChannel {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NewNotification => "newNotification",
            Self::NewPostFromFollowing => "newPostFromFollowing",
            Self::NewComment { .. } => "newComment",
            Self::PostLiked { .. } => "postLiked",
            Self::PushNotificationStatus => "pushNotificationStatus",
            Self::SystemMaintenance => "systemMaintenance",
            Self::NewReport => "newReport",
            Self::UserStatusChanged => "userStatusChanged",
            Self::SystemAlert => "systemAlert",
            Self::SystemActivity => "systemActivity",
            Self::AdminActivity => "adminActivity",
            Self::CriticalAlert => "criticalAlert",
        }
    }

    #[must_use]
    pub const fn gate(&self) -> Gate {
        match self {
            Self::NewNotification => gates::STREAM_NOTIFICATIONS,
            Self::NewPostFromFollowing => gates::STREAM_FOLLOWING_POSTS,
            Self::NewComment { .. } | Self::PostLiked { .. } => gates::STREAM_POST_ACTIVITY,
            Self::PushNotificationStatus => gates::STREAM_PUSH_STATUS,
            Self::SystemMaintenance => gates::STREAM_MAINTENANCE,
            Self::NewReport | Self::UserStatusChanged | Self::SystemAlert => gates::STREAM_ADMIN,
            Self::SystemActivity | Self::AdminActivity | Self::CriticalAlert => {
                gates::STREAM_OWNER
            }
        }
    }

    /// The post a post-scoped channel watches.
    #[must_use]
    pub fn post_id(&self) -> Option<&str> {
        match self {
            Self::NewComment { post_id } | Self::PostLiked { post_id } => Some(post_id.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        match self {
            Self::NewNotification => Topic::NOTIFYING.to_vec(),
            Self::NewPostFromFollowing => vec![Topic::NewPost],
            Self::NewComment { .. } => vec![Topic::NewComment],
            Self::PostLiked { .. } => vec![Topic::PostLiked],
            Self::PushNotificationStatus => vec![Topic::PushStatus],
            Self::SystemMaintenance => vec![Topic::SystemMaintenance],
            Self::NewReport => vec![Topic::NewReport],
            Self::UserStatusChanged => vec![Topic::UserStatusChanged],
            Self::SystemAlert => vec![Topic::SystemAlert],
            Self::SystemActivity => vec![Topic::SystemActivity],
            Self::AdminActivity => vec![Topic::AdminActivity],
            Self::CriticalAlert => vec![Topic::CriticalAlert],
        }
    }
}

impl fmt::Display for StreamChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewComment { post_id } | Self::PostLiked { post_id } => {
                write!(f, "{}({post_id})", self.name())
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Opens gated subscriptions on the bus.
#[derive(Clone)]
pub struct SubscriptionService {
    bus: EventBus,
    following_repo: FollowingRepository,
    post_service: PostService,
}

impl SubscriptionService {
    #[must_use]
    pub const fn new(
        bus: EventBus,
        following_repo: FollowingRepository,
        post_service: PostService,
    ) -> Self {
        Self {
            bus,
            following_repo,
            post_service,
        }
    }

    /// Subscribe `sink` to a channel, one handle per topic.
    ///
    /// The gate is checked before anything is registered; a refused caller
    /// leaves the bus untouched. Post-scoped channels additionally require
    /// the subscriber to be able to read the post, and a post they cannot
    /// read is `NotFound`.
    pub async fn open(
        &self,
        caller: &Caller,
        channel: &StreamChannel,
        sink: &mpsc::Sender<Delivery>,
    ) -> AppResult<Vec<SubscriptionHandle>> {
        let principal = channel.gate().check(caller)?;
        if let Some(post_id) = channel.post_id() {
            self.post_service
                .visible_post(principal.as_ref(), post_id)
                .await?;
        }
        let context = principal.as_ref().map_or_else(SubscriberContext::anonymous, |p| {
            SubscriberContext::for_principal(p.id())
        });

        let filter = self.filter(channel);
        let handles = channel
            .topics()
            .into_iter()
            .map(|topic| {
                self.bus
                    .subscribe(topic, Arc::clone(&filter), context.clone(), sink.clone())
            })
            .collect();

        tracing::debug!(channel = %channel, principal = ?context.principal_id, "Channel opened");
        Ok(handles)
    }

    fn filter(&self, channel: &StreamChannel) -> Arc<dyn EventFilter> {
        match channel {
            StreamChannel::NewNotification | StreamChannel::PushNotificationStatus => {
                Arc::new(RecipientIs)
            }
            StreamChannel::NewPostFromFollowing => {
                Arc::new(FollowsAuthor::new(self.following_repo.clone()))
            }
            StreamChannel::NewComment { post_id } | StreamChannel::PostLiked { post_id } => {
                Arc::new(PostIs(post_id.clone()))
            }
            _ => Arc::new(AcceptAll),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::event_bus::{AlertLevel, Event, EventPayload};
    use crate::services::fanout::FanoutService;
    use crate::services::identity::Principal;
    use chorus_common::AppError;
    use chorus_db::entities::{
        post::{self, PostStatus, Visibility},
        user::{self, Role, UserStatus},
    };
    use chorus_db::repositories::{
        CommentRepository, NotificationRepository, PostLikeRepository, PostRepository,
    };
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
    use std::time::Duration;

    fn create_test_user(id: &str, role: Role, status: UserStatus) -> user::Model {
        user::Model {
            id: id.to_string(),
            email: None,
            username: id.to_string(),
            password_hash: None,
            display_name: None,
            bio: None,
            avatar_url: None,
            role,
            status,
            email_verified: false,
            google_id: None,
            apple_id: None,
            blocked_at: None,
            blocked_reason: None,
            blocked_by: None,
            blocked_until: None,
            last_active_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn create_test_post(id: &str, author_id: &str, visibility: Visibility) -> post::Model {
        post::Model {
            id: id.to_string(),
            author_id: author_id.to_string(),
            title: None,
            content: "hello".to_string(),
            image_url: None,
            visibility,
            status: PostStatus::Published,
            published_at: None,
            deleted_at: None,
            deleted_by: None,
            deleted_reason: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn service_with(bus: &EventBus, db: DatabaseConnection) -> SubscriptionService {
        let db = Arc::new(db);
        let following_repo = FollowingRepository::new(Arc::clone(&db));
        let fanout = FanoutService::new(
            bus.clone(),
            NotificationRepository::new(Arc::clone(&db)),
            following_repo.clone(),
        );
        let posts = PostService::new(
            PostRepository::new(Arc::clone(&db)),
            PostLikeRepository::new(Arc::clone(&db)),
            CommentRepository::new(Arc::clone(&db)),
            following_repo.clone(),
            fanout,
        );
        SubscriptionService::new(bus.clone(), following_repo, posts)
    }

    fn service(bus: &EventBus) -> SubscriptionService {
        service_with(bus, MockDatabase::new(DatabaseBackend::Postgres).into_connection())
    }

    fn caller(id: &str, role: Role) -> Caller {
        Caller::Authenticated(Principal::new(create_test_user(id, role, UserStatus::Active)))
    }

    #[test]
    fn test_channel_wire_format() {
        let channel: StreamChannel =
            serde_json::from_str(r#"{"channel":"newComment","postId":"p1"}"#).unwrap();
        assert_eq!(
            channel,
            StreamChannel::NewComment {
                post_id: "p1".to_string()
            }
        );

        let channel: StreamChannel =
            serde_json::from_str(r#"{"channel":"systemAlert"}"#).unwrap();
        assert_eq!(channel, StreamChannel::SystemAlert);
    }

    #[tokio::test]
    async fn test_refused_caller_registers_nothing() {
        let bus = EventBus::new(8);
        let (tx, _rx) = mpsc::channel(8);

        let result = service(&bus)
            .open(&caller("user", Role::User), &StreamChannel::SystemAlert, &tx)
            .await;

        assert!(matches!(result, Err(AppError::InsufficientPermissions)));
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_god_is_not_admin_for_admin_channels() {
        let bus = EventBus::new(8);
        let (tx, _rx) = mpsc::channel(8);

        let result = service(&bus)
            .open(&caller("god", Role::God), &StreamChannel::NewReport, &tx)
            .await;

        assert!(matches!(result, Err(AppError::InsufficientPermissions)));
    }

    #[tokio::test]
    async fn test_blocked_caller_cannot_open_public_channel() {
        let bus = EventBus::new(8);
        let (tx, _rx) = mpsc::channel(8);
        let blocked = Caller::Authenticated(Principal::new(create_test_user(
            "u",
            Role::User,
            UserStatus::Blocked,
        )));

        let result = service(&bus)
            .open(
                &blocked,
                &StreamChannel::PostLiked {
                    post_id: "p1".to_string(),
                },
                &tx,
            )
            .await;

        assert!(matches!(result, Err(AppError::AccountBlocked)));
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_notification_channel_spans_recipient_topics() {
        let bus = EventBus::new(8);
        let (tx, _rx) = mpsc::channel(8);

        let handles = service(&bus)
            .open(&caller("u1", Role::User), &StreamChannel::NewNotification, &tx)
            .await
            .unwrap();

        assert_eq!(handles.len(), Topic::NOTIFYING.len());
        drop(handles);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_admin_receives_system_alert() {
        let bus = EventBus::new(8);
        let (tx, mut rx) = mpsc::channel(8);

        let _handles = service(&bus)
            .open(&caller("admin", Role::Admin), &StreamChannel::SystemAlert, &tx)
            .await
            .unwrap();
        bus.publish(Event::broadcast(
            Topic::SystemAlert,
            EventPayload::Alert {
                level: AlertLevel::Warning,
                message: "disk".to_string(),
            },
        ));

        let delivery = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.event.topic, Topic::SystemAlert);
    }

    #[tokio::test]
    async fn test_unreadable_post_channel_registers_nothing() {
        let bus = EventBus::new(8);
        let (tx, _rx) = mpsc::channel(8);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_post("p1", "author", Visibility::Private)]])
            .into_connection();

        let result = service_with(&bus, db)
            .open(
                &caller("stranger", Role::User),
                &StreamChannel::NewComment {
                    post_id: "p1".to_string(),
                },
                &tx,
            )
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_author_may_watch_own_private_post() {
        let bus = EventBus::new(8);
        let (tx, _rx) = mpsc::channel(8);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_post("p1", "author", Visibility::Private)]])
            .into_connection();

        let handles = service_with(&bus, db)
            .open(
                &caller("author", Role::User),
                &StreamChannel::PostLiked {
                    post_id: "p1".to_string(),
                },
                &tx,
            )
            .await
            .unwrap();

        assert_eq!(handles.len(), 1);
    }
}
