//! In-process event bus.
//!
//! One [`EventBus`] is built at startup and cloned into every publisher and
//! subscriber; clones share the same registry. Each subscription owns a
//! bounded FIFO queue drained by its own delivery task, which evaluates the
//! subscription's [`EventFilter`] against the live state at delivery time and
//! forwards matches to the connection's sink.
//!
//! [`EventBus::publish`] never waits: it offers the event to every queue on
//! the topic with `try_send`. A full queue drops the event for that
//! subscriber only; a closed queue is pruned.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use chorus_common::AppResult;
use chorus_db::{
    entities::{comment, post, report, user::UserStatus},
    repositories::FollowingRepository,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Closed set of event topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Topic {
    NewPost,
    PostLiked,
    PostCommented,
    NewComment,
    NewFollower,
    UserBlocked,
    PostDeleted,
    UserStatusChanged,
    NewReport,
    AdminMessage,
    PushStatus,
    SystemAlert,
    CriticalAlert,
    SystemMaintenance,
    SystemActivity,
    AdminActivity,
}

impl Topic {
    /// Topics whose events mirror a persisted notification for one recipient.
    pub const NOTIFYING: [Self; 7] = [
        Self::NewPost,
        Self::PostLiked,
        Self::PostCommented,
        Self::NewFollower,
        Self::UserBlocked,
        Self::PostDeleted,
        Self::AdminMessage,
    ];

    /// Wire name of the topic.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewPost => "NEW_POST",
            Self::PostLiked => "POST_LIKED",
            Self::PostCommented => "POST_COMMENTED",
            Self::NewComment => "NEW_COMMENT",
            Self::NewFollower => "NEW_FOLLOWER",
            Self::UserBlocked => "USER_BLOCKED",
            Self::PostDeleted => "POST_DELETED",
            Self::UserStatusChanged => "USER_STATUS_CHANGED",
            Self::NewReport => "NEW_REPORT",
            Self::AdminMessage => "ADMIN_MESSAGE",
            Self::PushStatus => "PUSH_STATUS",
            Self::SystemAlert => "SYSTEM_ALERT",
            Self::CriticalAlert => "CRITICAL_ALERT",
            Self::SystemMaintenance => "SYSTEM_MAINTENANCE",
            Self::SystemActivity => "SYSTEM_ACTIVITY",
            Self::AdminActivity => "ADMIN_ACTIVITY",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an operator alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// Event body, one variant per kind of domain change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EventPayload {
    #[serde(rename_all = "camelCase")]
    Post { post: post::Model },
    #[serde(rename_all = "camelCase")]
    PostLiked {
        post_id: String,
        post_author_id: String,
        liker_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Comment {
        comment: comment::Model,
        post_author_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Followed {
        follower_id: String,
        followee_id: String,
    },
    #[serde(rename_all = "camelCase")]
    UserStatus {
        user_id: String,
        status: UserStatus,
        reason: Option<String>,
        moderator_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PostRemoved {
        post_id: String,
        author_id: String,
        reason: Option<String>,
        moderator_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Report { report: report::Model },
    #[serde(rename_all = "camelCase")]
    Message {
        title: String,
        body: String,
        sender_id: Option<String>,
        data: Option<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    PushStatus { success: bool, message: String },
    #[serde(rename_all = "camelCase")]
    Alert { level: AlertLevel, message: String },
    #[serde(rename_all = "camelCase")]
    Maintenance {
        enabled: bool,
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Activity {
        action: String,
        actor_id: Option<String>,
        details: serde_json::Value,
    },
}

/// A published event. Never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub topic: Topic,
    /// Set for events addressed to one user; `None` for broadcasts.
    pub recipient_id: Option<String>,
    /// The persisted counterpart, when one was written.
    pub notification_id: Option<String>,
    pub payload: EventPayload,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    /// An event for every subscriber of the topic.
    #[must_use]
    pub fn broadcast(topic: Topic, payload: EventPayload) -> Self {
        Self {
            topic,
            recipient_id: None,
            notification_id: None,
            payload,
            occurred_at: Utc::now(),
        }
    }

    /// An event addressed to one user.
    #[must_use]
    pub fn to_recipient(topic: Topic, recipient_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            recipient_id: Some(recipient_id.into()),
            ..Self::broadcast(topic, payload)
        }
    }

    /// Attach the id of the notification written for this event.
    #[must_use]
    pub fn with_notification(mut self, notification_id: impl Into<String>) -> Self {
        self.notification_id = Some(notification_id.into());
        self
    }

    /// The post this event is about, if any.
    #[must_use]
    pub fn post_id(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Post { post } => Some(&post.id),
            EventPayload::PostLiked { post_id, .. } | EventPayload::PostRemoved { post_id, .. } => {
                Some(post_id)
            }
            EventPayload::Comment { comment, .. } => Some(&comment.post_id),
            EventPayload::Report { report } => Some(&report.post_id),
            _ => None,
        }
    }

    /// The author of the post this event is about, if any.
    #[must_use]
    pub fn post_author_id(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Post { post } => Some(&post.author_id),
            EventPayload::PostLiked { post_author_id, .. }
            | EventPayload::Comment { post_author_id, .. } => Some(post_author_id),
            EventPayload::PostRemoved { author_id, .. } => Some(author_id),
            _ => None,
        }
    }
}

/// Who is listening on a subscription.
#[derive(Debug, Clone, Default)]
pub struct SubscriberContext {
    /// `None` for anonymous subscribers of public channels.
    pub principal_id: Option<String>,
}

impl SubscriberContext {
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { principal_id: None }
    }

    #[must_use]
    pub fn for_principal(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: Some(principal_id.into()),
        }
    }
}

/// Per-subscription predicate, evaluated when the event is delivered.
#[async_trait]
pub trait EventFilter: Send + Sync {
    /// Whether `event` should reach the subscriber described by `ctx`.
    async fn matches(&self, event: &Event, ctx: &SubscriberContext) -> AppResult<bool>;
}

/// Accepts every event on the topic.
pub struct AcceptAll;

#[async_trait]
impl EventFilter for AcceptAll {
    async fn matches(&self, _event: &Event, _ctx: &SubscriberContext) -> AppResult<bool> {
        Ok(true)
    }
}

/// Accepts events addressed to the subscriber.
pub struct RecipientIs;

#[async_trait]
impl EventFilter for RecipientIs {
    async fn matches(&self, event: &Event, ctx: &SubscriberContext) -> AppResult<bool> {
        Ok(matches!(
            (&event.recipient_id, &ctx.principal_id),
            (Some(recipient), Some(me)) if recipient == me
        ))
    }
}

/// Accepts events about one post.
pub struct PostIs(pub String);

#[async_trait]
impl EventFilter for PostIs {
    async fn matches(&self, event: &Event, _ctx: &SubscriberContext) -> AppResult<bool> {
        Ok(event.post_id() == Some(self.0.as_str()))
    }
}

/// Accepts post events addressed to the subscriber while the subscriber still
/// follows the author. The follow edge is read at delivery time, so an
/// unfollow stops later deliveries of the same session.
pub struct FollowsAuthor {
    following_repo: FollowingRepository,
}

impl FollowsAuthor {
    #[must_use]
    pub const fn new(following_repo: FollowingRepository) -> Self {
        Self { following_repo }
    }
}

#[async_trait]
impl EventFilter for FollowsAuthor {
    async fn matches(&self, event: &Event, ctx: &SubscriberContext) -> AppResult<bool> {
        let Some(me) = ctx.principal_id.as_deref() else {
            return Ok(false);
        };
        if let Some(recipient) = event.recipient_id.as_deref()
            && recipient != me
        {
            return Ok(false);
        }
        let Some(author_id) = event.post_author_id() else {
            return Ok(false);
        };
        self.following_repo.is_following(me, author_id).await
    }
}

/// Identifier of one subscription, unique for the bus lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// An event handed to a connection's sink.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub subscription_id: SubscriptionId,
    pub event: Arc<Event>,
}

/// What a single publish reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Subscriptions the event was queued for.
    pub queued: usize,
    /// Subscriptions skipped because their queue was full.
    pub dropped: usize,
}

struct Registration {
    id: SubscriptionId,
    queue: mpsc::Sender<Arc<Event>>,
    cancelled: Arc<AtomicBool>,
}

struct BusInner {
    registry: RwLock<HashMap<Topic, Vec<Registration>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl BusInner {
    fn deregister(&self, topic: Topic, id: SubscriptionId) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(registrations) = registry.get_mut(&topic) {
            registrations.retain(|r| r.id != id);
            if registrations.is_empty() {
                registry.remove(&topic);
            }
        }
    }
}

/// Process-wide publish/subscribe register.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus whose subscriptions buffer up to `queue_capacity` events.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                queue_capacity: queue_capacity.max(1),
            }),
        }
    }

    /// Register a subscription and start its delivery task.
    ///
    /// Only events published after this call are delivered. Matching events
    /// are sent to `sink` in publish order. Must be called inside a Tokio
    /// runtime.
    pub fn subscribe(
        &self,
        topic: Topic,
        filter: Arc<dyn EventFilter>,
        context: SubscriberContext,
        sink: mpsc::Sender<Delivery>,
    ) -> SubscriptionHandle {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (queue, inbox) = mpsc::channel(self.inner.queue_capacity);
        let cancelled = Arc::new(AtomicBool::new(false));

        {
            let mut registry = self
                .inner
                .registry
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            registry.entry(topic).or_default().push(Registration {
                id,
                queue,
                cancelled: Arc::clone(&cancelled),
            });
        }

        tokio::spawn(run_delivery(
            DeliveryTask {
                id,
                topic,
                filter,
                context,
                sink,
                cancelled: Arc::clone(&cancelled),
                bus: Arc::downgrade(&self.inner),
            },
            inbox,
        ));

        debug!(subscription = %id, topic = %topic, "Subscription registered");

        SubscriptionHandle {
            id,
            topic,
            cancelled,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Offer an event to every live subscription on its topic.
    ///
    /// Never blocks and never fails; per-subscriber problems are logged.
    pub fn publish(&self, event: Event) -> PublishOutcome {
        let topic = event.topic;
        let event = Arc::new(event);
        let mut outcome = PublishOutcome::default();
        let mut closed = Vec::new();

        {
            let registry = self
                .inner
                .registry
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(registrations) = registry.get(&topic) else {
                trace!(topic = %topic, "No subscribers");
                return outcome;
            };

            for registration in registrations {
                if registration.cancelled.load(Ordering::Acquire) {
                    continue;
                }
                match registration.queue.try_send(Arc::clone(&event)) {
                    Ok(()) => outcome.queued += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        outcome.dropped += 1;
                        warn!(
                            subscription = %registration.id,
                            topic = %topic,
                            "Subscriber queue full, dropping event"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(registration.id),
                }
            }
        }

        for id in closed {
            debug!(subscription = %id, topic = %topic, "Pruning closed subscription");
            self.inner.deregister(topic, id);
        }

        outcome
    }

    /// Cancel a subscription. Cancelling twice is a no-op.
    pub fn cancel(&self, handle: &SubscriptionHandle) {
        handle.cancel();
    }

    /// Number of live subscriptions across all topics.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Number of live subscriptions on one topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&topic)
            .map_or(0, Vec::len)
    }
}

/// Owner's handle on a subscription. Dropping it cancels the subscription.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    topic: Topic,
    cancelled: Arc<AtomicBool>,
    bus: Weak<BusInner>,
}

impl SubscriptionHandle {
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    #[must_use]
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    /// Stop delivery and deregister. Idempotent.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.deregister(self.topic, self.id);
        }
        debug!(subscription = %self.id, topic = %self.topic, "Subscription cancelled");
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct DeliveryTask {
    id: SubscriptionId,
    topic: Topic,
    filter: Arc<dyn EventFilter>,
    context: SubscriberContext,
    sink: mpsc::Sender<Delivery>,
    cancelled: Arc<AtomicBool>,
    bus: Weak<BusInner>,
}

async fn run_delivery(task: DeliveryTask, mut inbox: mpsc::Receiver<Arc<Event>>) {
    while let Some(event) = inbox.recv().await {
        if task.cancelled.load(Ordering::Acquire) {
            break;
        }

        match task.filter.matches(&event, &task.context).await {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!(
                    subscription = %task.id,
                    topic = %task.topic,
                    error = %e,
                    "Subscription filter failed, skipping event"
                );
                continue;
            }
        }

        // The filter may have awaited; a cancel in the meantime wins
        if task.cancelled.load(Ordering::Acquire) {
            break;
        }

        let delivery = Delivery {
            subscription_id: task.id,
            event,
        };
        if task.sink.send(delivery).await.is_err() {
            debug!(subscription = %task.id, "Subscriber sink closed");
            task.cancelled.store(true, Ordering::Release);
            if let Some(bus) = task.bus.upgrade() {
                bus.deregister(task.topic, task.id);
            }
            break;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chorus_common::AppError;
    use std::time::Duration;
    use tokio::time::timeout;

    fn alert(message: &str) -> Event {
        Event::broadcast(
            Topic::SystemAlert,
            EventPayload::Alert {
                level: AlertLevel::Info,
                message: message.to_string(),
            },
        )
    }

    fn message_for(recipient: &str) -> Event {
        Event::to_recipient(
            Topic::AdminMessage,
            recipient,
            EventPayload::Message {
                title: "hi".to_string(),
                body: "hello".to_string(),
                sender_id: None,
                data: None,
            },
        )
    }

    async fn next(rx: &mut mpsc::Receiver<Delivery>) -> Option<Delivery> {
        timeout(Duration::from_millis(200), rx.recv()).await.ok().flatten()
    }

    fn message_text(delivery: &Delivery) -> &str {
        match &delivery.event.payload {
            EventPayload::Alert { message, .. } => message,
            _ => "",
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber_in_order() {
        let bus = EventBus::new(16);
        let (tx, mut rx) = mpsc::channel(16);
        let handle = bus.subscribe(
            Topic::SystemAlert,
            Arc::new(AcceptAll),
            SubscriberContext::anonymous(),
            tx,
        );

        for i in 0..5 {
            bus.publish(alert(&format!("m{i}")));
        }

        for i in 0..5 {
            let delivery = next(&mut rx).await.unwrap();
            assert_eq!(delivery.subscription_id, handle.id());
            assert_eq!(message_text(&delivery), format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscribers() {
        let bus = EventBus::new(16);
        bus.publish(alert("before"));

        let (tx, mut rx) = mpsc::channel(16);
        let _handle = bus.subscribe(
            Topic::SystemAlert,
            Arc::new(AcceptAll),
            SubscriberContext::anonymous(),
            tx,
        );

        assert!(next(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = EventBus::new(16);
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = bus.subscribe(
            Topic::CriticalAlert,
            Arc::new(AcceptAll),
            SubscriberContext::anonymous(),
            tx,
        );

        let outcome = bus.publish(alert("wrong topic"));

        assert_eq!(outcome.queued, 0);
        assert!(next(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_recipient_filter() {
        let bus = EventBus::new(16);
        let (alice_tx, mut alice_rx) = mpsc::channel(16);
        let (bob_tx, mut bob_rx) = mpsc::channel(16);
        let _a = bus.subscribe(
            Topic::AdminMessage,
            Arc::new(RecipientIs),
            SubscriberContext::for_principal("alice"),
            alice_tx,
        );
        let _b = bus.subscribe(
            Topic::AdminMessage,
            Arc::new(RecipientIs),
            SubscriberContext::for_principal("bob"),
            bob_tx,
        );

        bus.publish(message_for("alice"));

        let delivery = next(&mut alice_rx).await.unwrap();
        assert_eq!(delivery.event.recipient_id.as_deref(), Some("alice"));
        assert!(next(&mut bob_rx).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_stops_delivery() {
        let bus = EventBus::new(16);
        let (tx, mut rx) = mpsc::channel(16);
        let handle = bus.subscribe(
            Topic::SystemAlert,
            Arc::new(AcceptAll),
            SubscriberContext::anonymous(),
            tx,
        );
        assert_eq!(bus.subscriber_count(Topic::SystemAlert), 1);

        bus.cancel(&handle);
        bus.cancel(&handle);
        handle.cancel();

        assert!(handle.is_cancelled());
        assert_eq!(bus.subscriber_count(Topic::SystemAlert), 0);
        assert_eq!(bus.publish(alert("after cancel")).queued, 0);
        assert!(next(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_handle_deregisters() {
        let bus = EventBus::new(16);
        let (tx, _rx) = mpsc::channel(16);
        let handle = bus.subscribe(
            Topic::SystemAlert,
            Arc::new(AcceptAll),
            SubscriberContext::anonymous(),
            tx,
        );

        drop(handle);

        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_only_for_slow_subscriber() {
        let bus = EventBus::new(1);

        // The slow sink has no buffer room after one delivery and is never read
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let _slow = bus.subscribe(
            Topic::SystemAlert,
            Arc::new(AcceptAll),
            SubscriberContext::anonymous(),
            slow_tx,
        );
        let (fast_tx, mut fast_rx) = mpsc::channel(64);
        let _fast = bus.subscribe(
            Topic::SystemAlert,
            Arc::new(AcceptAll),
            SubscriberContext::anonymous(),
            fast_tx,
        );

        let mut dropped = 0;
        for i in 0..20 {
            dropped += bus.publish(alert(&format!("m{i}"))).dropped;
            // Let the fast delivery task keep up
            tokio::task::yield_now().await;
            assert!(next(&mut fast_rx).await.is_some());
        }

        assert!(dropped > 0);
    }

    struct FailingFilter;

    #[async_trait]
    impl EventFilter for FailingFilter {
        async fn matches(&self, _event: &Event, _ctx: &SubscriberContext) -> AppResult<bool> {
            Err(AppError::Database("lookup failed".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failing_filter_is_isolated() {
        let bus = EventBus::new(16);
        let (bad_tx, mut bad_rx) = mpsc::channel(16);
        let (good_tx, mut good_rx) = mpsc::channel(16);
        let _bad = bus.subscribe(
            Topic::SystemAlert,
            Arc::new(FailingFilter),
            SubscriberContext::anonymous(),
            bad_tx,
        );
        let _good = bus.subscribe(
            Topic::SystemAlert,
            Arc::new(AcceptAll),
            SubscriberContext::anonymous(),
            good_tx,
        );

        let outcome = bus.publish(alert("still delivered"));

        assert_eq!(outcome.queued, 2);
        assert!(next(&mut good_rx).await.is_some());
        assert!(next(&mut bad_rx).await.is_none());
    }

    #[tokio::test]
    async fn test_closed_sink_is_pruned() {
        let bus = EventBus::new(16);
        let (tx, rx) = mpsc::channel(16);
        let _handle = bus.subscribe(
            Topic::SystemAlert,
            Arc::new(AcceptAll),
            SubscriberContext::anonymous(),
            tx,
        );
        drop(rx);

        bus.publish(alert("into the void"));
        // Give the delivery task a chance to observe the closed sink
        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.publish(alert("again"));

        assert_eq!(bus.subscriber_count(Topic::SystemAlert), 0);
    }

    #[test]
    fn test_post_id_extraction() {
        let event = Event::to_recipient(
            Topic::PostLiked,
            "author",
            EventPayload::PostLiked {
                post_id: "p1".to_string(),
                post_author_id: "author".to_string(),
                liker_id: "fan".to_string(),
            },
        );

        assert_eq!(event.post_id(), Some("p1"));
        assert_eq!(event.post_author_id(), Some("author"));
        assert_eq!(Topic::PostLiked.to_string(), "POST_LIKED");
    }
}
