//! Fan-out engine.
//!
//! Turns one committed write into the notifications and bus events it
//! implies. Runs after the primary write and never fails it: every store or
//! bus problem is logged and reflected only in the returned [`FanoutReport`].

use chorus_common::IdGenerator;
use chorus_db::{
    entities::{
        comment,
        notification::{self, NotificationType},
        post::{self, Visibility},
        report, user,
    },
    repositories::{FollowingRepository, NotificationRepository},
};
use chrono::Utc;
use sea_orm::Set;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::event_bus::{AlertLevel, Event, EventBus, EventPayload, Topic};

/// Followers loaded per page while fanning out a new post.
const FOLLOWER_BATCH: u64 = 500;

/// What one fan-out produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Notification rows written.
    pub notifications: usize,
    /// Events handed to the bus.
    pub published: usize,
}

impl FanoutReport {
    fn absorb(&mut self, other: Self) {
        self.notifications += other.notifications;
        self.published += other.published;
    }
}

fn display_name(user: &user::Model) -> &str {
    user.display_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(&user.username)
}

/// A notification about to be written.
struct Draft {
    recipient_id: String,
    notification_type: NotificationType,
    from_user_id: Option<String>,
    post_id: Option<String>,
    comment_id: Option<String>,
    message: String,
    metadata: Option<Value>,
}

impl Draft {
    fn new(recipient_id: &str, notification_type: NotificationType, message: String) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            notification_type,
            from_user_id: None,
            post_id: None,
            comment_id: None,
            message,
            metadata: None,
        }
    }

    fn from_user(mut self, user_id: &str) -> Self {
        self.from_user_id = Some(user_id.to_string());
        self
    }

    fn post(mut self, post_id: &str) -> Self {
        self.post_id = Some(post_id.to_string());
        self
    }

    fn comment(mut self, comment_id: &str) -> Self {
        self.comment_id = Some(comment_id.to_string());
        self
    }

    fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn into_active_model(self, id: String) -> notification::ActiveModel {
        notification::ActiveModel {
            id: Set(id),
            user_id: Set(self.recipient_id),
            notification_type: Set(self.notification_type),
            from_user_id: Set(self.from_user_id),
            post_id: Set(self.post_id),
            comment_id: Set(self.comment_id),
            message: Set(self.message),
            metadata: Set(self.metadata),
            is_read: Set(false),
            created_at: Set(Utc::now().into()),
        }
    }
}

/// Fan-out service shared by every domain service that writes.
#[derive(Clone)]
pub struct FanoutService {
    bus: EventBus,
    notification_repo: NotificationRepository,
    following_repo: FollowingRepository,
    id_gen: IdGenerator,
}

impl FanoutService {
    #[must_use]
    pub const fn new(
        bus: EventBus,
        notification_repo: NotificationRepository,
        following_repo: FollowingRepository,
    ) -> Self {
        Self {
            bus,
            notification_repo,
            following_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// The bus this engine publishes to.
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn publish(&self, event: Event) -> usize {
        let topic = event.topic;
        let outcome = self.bus.publish(event);
        debug!(topic = %topic, queued = outcome.queued, dropped = outcome.dropped, "Event published");
        1
    }

    /// Write one notification and publish its event to the recipient.
    async fn notify(&self, topic: Topic, draft: Draft, payload: EventPayload) -> FanoutReport {
        let recipient_id = draft.recipient_id.clone();
        let mut report = FanoutReport::default();
        let mut event = Event::to_recipient(topic, recipient_id, payload);

        match self
            .notification_repo
            .create(draft.into_active_model(self.id_gen.generate()))
            .await
        {
            Ok(created) => {
                report.notifications = 1;
                event = event.with_notification(created.id);
            }
            Err(e) => warn!(topic = %topic, error = %e, "Failed to store notification"),
        }

        report.published = self.publish(event);
        report
    }

    /// A post was published: notify and address every follower of the author.
    ///
    /// Private posts reach nobody.
    pub async fn new_post(&self, author: &user::Model, post: &post::Model) -> FanoutReport {
        let mut report = FanoutReport::default();
        if post.visibility == Visibility::Private {
            return report;
        }

        let message = format!("{} shared a new post", display_name(author));
        let mut until_id: Option<String> = None;

        loop {
            let followers = match self
                .following_repo
                .find_followers(&author.id, FOLLOWER_BATCH, until_id.as_deref())
                .await
            {
                Ok(followers) => followers,
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "Failed to load followers for fan-out");
                    break;
                }
            };
            let Some(last) = followers.last() else { break };
            until_id = Some(last.id.clone());

            let ids: Vec<String> = followers.iter().map(|_| self.id_gen.generate()).collect();
            let models = followers
                .iter()
                .zip(&ids)
                .map(|(edge, id)| {
                    Draft::new(&edge.follower_id, NotificationType::NewPost, message.clone())
                        .from_user(&author.id)
                        .post(&post.id)
                        .into_active_model(id.clone())
                })
                .collect();

            let stored = match self.notification_repo.create_many(models).await {
                Ok(()) => {
                    report.notifications += followers.len();
                    true
                }
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "Failed to store new post notifications");
                    false
                }
            };

            for (edge, id) in followers.iter().zip(ids) {
                let mut event = Event::to_recipient(
                    Topic::NewPost,
                    edge.follower_id.clone(),
                    EventPayload::Post { post: post.clone() },
                );
                if stored {
                    event = event.with_notification(id);
                }
                report.published += self.publish(event);
            }

            if (followers.len() as u64) < FOLLOWER_BATCH {
                break;
            }
        }

        debug!(
            post_id = %post.id,
            notifications = report.notifications,
            published = report.published,
            "New post fanned out"
        );
        report
    }

    /// Someone liked a post. Self-likes notify nobody.
    pub async fn post_liked(&self, liker: &user::Model, post: &post::Model) -> FanoutReport {
        if liker.id == post.author_id {
            return FanoutReport::default();
        }

        let draft = Draft::new(
            &post.author_id,
            NotificationType::PostLiked,
            format!("{} liked your post", display_name(liker)),
        )
        .from_user(&liker.id)
        .post(&post.id);

        self.notify(
            Topic::PostLiked,
            draft,
            EventPayload::PostLiked {
                post_id: post.id.clone(),
                post_author_id: post.author_id.clone(),
                liker_id: liker.id.clone(),
            },
        )
        .await
    }

    /// Someone commented on a post. Notifies the author unless they commented
    /// themselves.
    pub async fn post_commented(
        &self,
        commenter: &user::Model,
        post: &post::Model,
        comment: &comment::Model,
    ) -> FanoutReport {
        if commenter.id == post.author_id {
            return FanoutReport::default();
        }

        let draft = Draft::new(
            &post.author_id,
            NotificationType::PostCommented,
            format!("{} commented on your post", display_name(commenter)),
        )
        .from_user(&commenter.id)
        .post(&post.id)
        .comment(&comment.id);

        self.notify(
            Topic::PostCommented,
            draft,
            EventPayload::Comment {
                comment: comment.clone(),
                post_author_id: post.author_id.clone(),
            },
        )
        .await
    }

    /// Broadcast a comment to everyone watching the post's thread.
    pub fn new_comment(&self, post: &post::Model, comment: &comment::Model) -> FanoutReport {
        FanoutReport {
            notifications: 0,
            published: self.publish(Event::broadcast(
                Topic::NewComment,
                EventPayload::Comment {
                    comment: comment.clone(),
                    post_author_id: post.author_id.clone(),
                },
            )),
        }
    }

    /// A follow edge was created. A self-follow notifies nobody.
    pub async fn new_follower(&self, follower: &user::Model, followee_id: &str) -> FanoutReport {
        if follower.id == followee_id {
            return FanoutReport::default();
        }

        let draft = Draft::new(
            followee_id,
            NotificationType::NewFollower,
            format!("{} started following you", display_name(follower)),
        )
        .from_user(&follower.id);

        self.notify(
            Topic::NewFollower,
            draft,
            EventPayload::Followed {
                follower_id: follower.id.clone(),
                followee_id: followee_id.to_string(),
            },
        )
        .await
    }

    /// A moderator blocked an account: tell the account, then the admins.
    pub async fn user_blocked(
        &self,
        target: &user::Model,
        moderator: &user::Model,
        reason: Option<&str>,
    ) -> FanoutReport {
        let message = match reason {
            Some(reason) => format!("Your account has been blocked: {reason}"),
            None => "Your account has been blocked".to_string(),
        };
        let draft = Draft::new(&target.id, NotificationType::UserBlocked, message)
            .from_user(&moderator.id)
            .metadata(json!({ "reason": reason, "blockedUntil": target.blocked_until }));

        let mut report = self
            .notify(
                Topic::UserBlocked,
                draft,
                EventPayload::UserStatus {
                    user_id: target.id.clone(),
                    status: target.status,
                    reason: reason.map(str::to_string),
                    moderator_id: Some(moderator.id.clone()),
                },
            )
            .await;
        report.absorb(self.user_status_changed(target, Some(moderator), reason));
        report
    }

    /// Broadcast an account status change to the admin pool.
    pub fn user_status_changed(
        &self,
        target: &user::Model,
        moderator: Option<&user::Model>,
        reason: Option<&str>,
    ) -> FanoutReport {
        FanoutReport {
            notifications: 0,
            published: self.publish(Event::broadcast(
                Topic::UserStatusChanged,
                EventPayload::UserStatus {
                    user_id: target.id.clone(),
                    status: target.status,
                    reason: reason.map(str::to_string),
                    moderator_id: moderator.map(|m| m.id.clone()),
                },
            )),
        }
    }

    /// A moderator removed a post: tell its author.
    pub async fn post_deleted(
        &self,
        post: &post::Model,
        moderator: &user::Model,
        reason: Option<&str>,
    ) -> FanoutReport {
        let message = match reason {
            Some(reason) => format!("Your post was removed by a moderator: {reason}"),
            None => "Your post was removed by a moderator".to_string(),
        };
        let draft = Draft::new(&post.author_id, NotificationType::PostDeleted, message)
            .from_user(&moderator.id)
            .post(&post.id);

        self.notify(
            Topic::PostDeleted,
            draft,
            EventPayload::PostRemoved {
                post_id: post.id.clone(),
                author_id: post.author_id.clone(),
                reason: reason.map(str::to_string),
                moderator_id: moderator.id.clone(),
            },
        )
        .await
    }

    /// A report was filed: broadcast to the admin pool.
    pub fn new_report(&self, report: &report::Model) -> FanoutReport {
        FanoutReport {
            notifications: 0,
            published: self.publish(Event::broadcast(
                Topic::NewReport,
                EventPayload::Report {
                    report: report.clone(),
                },
            )),
        }
    }

    /// An operator message to each recipient.
    pub async fn admin_message(
        &self,
        sender: &user::Model,
        recipient_ids: &[String],
        title: &str,
        body: &str,
        data: Option<&Value>,
    ) -> FanoutReport {
        let mut report = FanoutReport::default();

        for recipient_id in recipient_ids {
            let mut draft = Draft::new(
                recipient_id,
                NotificationType::AdminMessage,
                format!("{title}: {body}"),
            )
            .from_user(&sender.id);
            if let Some(data) = data {
                draft = draft.metadata(data.clone());
            }

            report.absorb(
                self.notify(
                    Topic::AdminMessage,
                    draft,
                    EventPayload::Message {
                        title: title.to_string(),
                        body: body.to_string(),
                        sender_id: Some(sender.id.clone()),
                        data: data.cloned(),
                    },
                )
                .await,
            );
        }

        report
    }

    /// Result of a push delivery attempt, for the requesting user only.
    pub fn push_status(&self, recipient_id: &str, success: bool, message: &str) -> FanoutReport {
        FanoutReport {
            notifications: 0,
            published: self.publish(Event::to_recipient(
                Topic::PushStatus,
                recipient_id,
                EventPayload::PushStatus {
                    success,
                    message: message.to_string(),
                },
            )),
        }
    }

    pub fn system_alert(&self, level: AlertLevel, message: &str) -> FanoutReport {
        self.broadcast(
            Topic::SystemAlert,
            EventPayload::Alert {
                level,
                message: message.to_string(),
            },
        )
    }

    pub fn critical_alert(&self, message: &str) -> FanoutReport {
        self.broadcast(
            Topic::CriticalAlert,
            EventPayload::Alert {
                level: AlertLevel::Critical,
                message: message.to_string(),
            },
        )
    }

    pub fn maintenance_changed(&self, enabled: bool, message: Option<&str>) -> FanoutReport {
        self.broadcast(
            Topic::SystemMaintenance,
            EventPayload::Maintenance {
                enabled,
                message: message.map(str::to_string),
            },
        )
    }

    /// Noteworthy user-driven activity, for the system owner.
    pub fn system_activity(&self, action: &str, actor_id: Option<&str>, details: Value) -> FanoutReport {
        self.broadcast(
            Topic::SystemActivity,
            EventPayload::Activity {
                action: action.to_string(),
                actor_id: actor_id.map(str::to_string),
                details,
            },
        )
    }

    /// A moderator acted, for the system owner.
    pub fn admin_activity(&self, action: &str, actor_id: &str, details: Value) -> FanoutReport {
        self.broadcast(
            Topic::AdminActivity,
            EventPayload::Activity {
                action: action.to_string(),
                actor_id: Some(actor_id.to_string()),
                details,
            },
        )
    }

    fn broadcast(&self, topic: Topic, payload: EventPayload) -> FanoutReport {
        FanoutReport {
            notifications: 0,
            published: self.publish(Event::broadcast(topic, payload)),
        }
    }
}
