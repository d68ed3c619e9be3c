//! End-to-end behaviour of the core services over a migrated in-memory store.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use chorus_common::AppError;
use chorus_core::{
    BlockUserInput, Caller, CommentService, CreateCommentInput, CreatePostInput, CredentialService,
    Delivery, EventBus, EventPayload, FanoutService, FollowingService, IdentityResolver,
    LikeService, ModerationService, PostService, Principal, ReportPostInput, ReportService,
    StreamChannel, SubscriptionService, Topic,
};
use chorus_db::{
    entities::{
        notification::NotificationType,
        post::Visibility,
        report::ReportReason,
        user::{self, Role, UserStatus},
    },
    repositories::{
        CommentRepository, FollowingRepository, NotificationRepository, PostLikeRepository,
        PostRepository, ReportRepository, SystemLogRepository, UserRepository,
    },
    test_utils::TestDatabase,
};
use tokio::sync::mpsc;

/// How long a subscriber waits before an event counts as not delivered.
const QUIET: Duration = Duration::from_millis(200);

struct Harness {
    db: TestDatabase,
    bus: EventBus,
    resolver: IdentityResolver,
    following: FollowingService,
    posts: PostService,
    likes: LikeService,
    comments: CommentService,
    reports: ReportService,
    moderation: ModerationService,
    subscriptions: SubscriptionService,
    notifications: NotificationRepository,
}

impl Harness {
    async fn new() -> Self {
        let db = TestDatabase::in_memory().await.unwrap();
        let conn = db.connection();
        let bus = EventBus::new(64);

        let user_repo = UserRepository::new(conn.clone());
        let following_repo = FollowingRepository::new(conn.clone());
        let notification_repo = NotificationRepository::new(conn.clone());
        let fanout = FanoutService::new(
            bus.clone(),
            notification_repo.clone(),
            following_repo.clone(),
        );

        let posts = PostService::new(
            PostRepository::new(conn.clone()),
            PostLikeRepository::new(conn.clone()),
            CommentRepository::new(conn.clone()),
            following_repo.clone(),
            fanout.clone(),
        );

        Self {
            resolver: IdentityResolver::new(
                CredentialService::new("scenario-secret", chrono::Duration::hours(1)),
                user_repo.clone(),
            ),
            following: FollowingService::new(
                following_repo.clone(),
                user_repo.clone(),
                fanout.clone(),
            ),
            likes: LikeService::new(
                PostLikeRepository::new(conn.clone()),
                posts.clone(),
                fanout.clone(),
            ),
            comments: CommentService::new(
                CommentRepository::new(conn.clone()),
                posts.clone(),
                fanout.clone(),
            ),
            reports: ReportService::new(
                ReportRepository::new(conn.clone()),
                posts.clone(),
                fanout.clone(),
            ),
            moderation: ModerationService::new(
                user_repo,
                PostRepository::new(conn.clone()),
                ReportRepository::new(conn.clone()),
                SystemLogRepository::new(conn.clone()),
                fanout,
            ),
            subscriptions: SubscriptionService::new(bus.clone(), following_repo, posts.clone()),
            notifications: notification_repo,
            posts,
            bus,
            db,
        }
    }

    async fn user(&self, name: &str, role: Role) -> user::Model {
        self.db.create_user(name, role).await.unwrap()
    }

    /// Resolve a caller the way a request would, from a fresh credential.
    async fn caller_for(&self, user: &user::Model) -> Caller {
        let token = self.resolver.credentials().issue(user).unwrap().token;
        self.resolver.resolve_caller(Some(&token)).await.unwrap()
    }

    async fn post(&self, author: &user::Model, content: &str) -> String {
        self.post_with(author, content, Visibility::Public).await
    }

    async fn post_with(
        &self,
        author: &user::Model,
        content: &str,
        visibility: Visibility,
    ) -> String {
        let caller = self.caller_for(author).await;
        self.posts
            .create(
                &caller,
                CreatePostInput {
                    title: None,
                    content: content.to_string(),
                    image_url: None,
                    visibility,
                },
            )
            .await
            .unwrap()
            .id
    }
}

async fn next(rx: &mut mpsc::Receiver<Delivery>) -> Option<Delivery> {
    tokio::time::timeout(QUIET, rx.recv()).await.ok().flatten()
}

#[tokio::test]
async fn test_new_post_reaches_only_followers() {
    let h = Harness::new().await;
    let u1 = h.user("u1", Role::User).await;
    let u2 = h.user("u2", Role::User).await;
    let u3 = h.user("u3", Role::User).await;

    h.following
        .follow(&h.caller_for(&u1).await, &u2.id)
        .await
        .unwrap();

    let (tx1, mut rx1) = mpsc::channel(16);
    let (tx3, mut rx3) = mpsc::channel(16);
    let _sub1 = h
        .subscriptions
        .open(&h.caller_for(&u1).await, &StreamChannel::NewPostFromFollowing, &tx1)
        .await
        .unwrap();
    let _sub3 = h
        .subscriptions
        .open(&h.caller_for(&u3).await, &StreamChannel::NewPostFromFollowing, &tx3)
        .await
        .unwrap();

    let post_id = h.post(&u2, "hello followers").await;

    let notes = h
        .notifications
        .find_by_user_and_type(&u1.id, NotificationType::NewPost)
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].post_id.as_deref(), Some(post_id.as_str()));

    let delivery = next(&mut rx1).await.unwrap();
    assert_eq!(delivery.event.topic, Topic::NewPost);
    assert_eq!(delivery.event.post_id(), Some(post_id.as_str()));
    assert!(next(&mut rx1).await.is_none());

    assert!(next(&mut rx3).await.is_none());
    assert!(
        h.notifications
            .find_by_user_and_type(&u3.id, NotificationType::NewPost)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_double_like_toggles_back_with_one_notification() {
    let h = Harness::new().await;
    let u1 = h.user("u1", Role::User).await;
    let u2 = h.user("u2", Role::User).await;
    let post_id = h.post(&u2, "like me").await;
    let caller = h.caller_for(&u1).await;

    let first = h.likes.toggle(&caller, &post_id).await.unwrap();
    let second = h.likes.toggle(&caller, &post_id).await.unwrap();

    assert!(first.is_liked);
    assert_eq!(first.like_count, 1);
    assert!(!second.is_liked);
    assert_eq!(second.like_count, 0);

    let likes = PostLikeRepository::new(h.db.connection());
    assert_eq!(likes.count_by_pair(&u1.id, &post_id).await.unwrap(), 0);
    assert_eq!(
        h.notifications
            .find_by_user_and_type(&u2.id, NotificationType::PostLiked)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_like_parity_after_many_toggles() {
    let h = Harness::new().await;
    let u1 = h.user("u1", Role::User).await;
    let u2 = h.user("u2", Role::User).await;
    let post_id = h.post(&u2, "parity").await;
    let caller = h.caller_for(&u1).await;

    for n in 1..=5u64 {
        let toggle = h.likes.toggle(&caller, &post_id).await.unwrap();
        assert_eq!(toggle.is_liked, n % 2 == 1);
        assert_eq!(toggle.like_count, n % 2);
    }

    // Three creations, three notifications
    assert_eq!(
        h.notifications
            .find_by_user_and_type(&u2.id, NotificationType::PostLiked)
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn test_liking_own_post_notifies_nobody() {
    let h = Harness::new().await;
    let u1 = h.user("u1", Role::User).await;
    let post_id = h.post(&u1, "mine").await;

    let toggle = h
        .likes
        .toggle(&h.caller_for(&u1).await, &post_id)
        .await
        .unwrap();

    assert!(toggle.is_liked);
    assert!(
        h.notifications
            .find_by_user_and_type(&u1.id, NotificationType::PostLiked)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_block_rejects_existing_credential_and_alerts_admins() {
    let h = Harness::new().await;
    let admin = h.user("admin", Role::Admin).await;
    let bystander = h.user("bystander", Role::User).await;
    let u4 = h.user("u4", Role::User).await;
    let post_id = h.post(&admin, "announcement").await;

    // Issued while u4 is still active
    let u4_token = h.resolver.credentials().issue(&u4).unwrap().token;

    let (admin_tx, mut admin_rx) = mpsc::channel(16);
    let _admin_sub = h
        .subscriptions
        .open(&h.caller_for(&admin).await, &StreamChannel::UserStatusChanged, &admin_tx)
        .await
        .unwrap();
    let (user_tx, _user_rx) = mpsc::channel(16);
    let refused = h
        .subscriptions
        .open(
            &h.caller_for(&bystander).await,
            &StreamChannel::UserStatusChanged,
            &user_tx,
        )
        .await;
    assert!(matches!(refused, Err(AppError::InsufficientPermissions)));

    h.moderation
        .block_user(
            &h.caller_for(&admin).await,
            &u4.id,
            BlockUserInput {
                reason: Some("spam".to_string()),
                duration_days: None,
            },
        )
        .await
        .unwrap();

    let u4_caller = h.resolver.resolve_caller(Some(&u4_token)).await.unwrap();
    assert!(matches!(
        h.likes.toggle(&u4_caller, &post_id).await,
        Err(AppError::AccountBlocked)
    ));
    assert!(matches!(
        h.posts.get(&u4_caller, &post_id).await,
        Err(AppError::AccountBlocked)
    ));
    assert!(matches!(
        h.following.follow(&u4_caller, &admin.id).await,
        Err(AppError::AccountBlocked)
    ));
    assert!(matches!(
        h.subscriptions
            .open(&u4_caller, &StreamChannel::SystemMaintenance, &user_tx)
            .await,
        Err(AppError::AccountBlocked)
    ));

    let delivery = next(&mut admin_rx).await.unwrap();
    assert_eq!(delivery.event.topic, Topic::UserStatusChanged);
    match &delivery.event.payload {
        EventPayload::UserStatus { user_id, status, .. } => {
            assert_eq!(user_id, &u4.id);
            assert_eq!(*status, UserStatus::Blocked);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn test_unfollow_stops_following_posts() {
    let h = Harness::new().await;
    let u1 = h.user("u1", Role::User).await;
    let u2 = h.user("u2", Role::User).await;
    let u1_caller = h.caller_for(&u1).await;

    h.following.follow(&u1_caller, &u2.id).await.unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let _sub = h
        .subscriptions
        .open(&u1_caller, &StreamChannel::NewPostFromFollowing, &tx)
        .await
        .unwrap();

    h.post(&u2, "first").await;
    assert!(next(&mut rx).await.is_some());

    h.following.unfollow(&u1_caller, &u2.id).await.unwrap();
    h.post(&u2, "second").await;
    assert!(next(&mut rx).await.is_none());
}

#[tokio::test]
async fn test_double_follow_is_rejected() {
    let h = Harness::new().await;
    let u1 = h.user("u1", Role::User).await;
    let u2 = h.user("u2", Role::User).await;
    let caller = h.caller_for(&u1).await;

    h.following.follow(&caller, &u2.id).await.unwrap();
    let second = h.following.follow(&caller, &u2.id).await;

    assert!(matches!(second, Err(AppError::AlreadyFollowing)));
    assert_eq!(
        FollowingRepository::new(h.db.connection())
            .count_followers(&u2.id)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        h.notifications
            .find_by_user_and_type(&u2.id, NotificationType::NewFollower)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_self_targets_are_rejected() {
    let h = Harness::new().await;
    let admin = h.user("admin", Role::Admin).await;
    let caller = h.caller_for(&admin).await;
    let post_id = h.post(&admin, "own").await;

    assert!(matches!(
        h.following.follow(&caller, &admin.id).await,
        Err(AppError::InvalidTarget(_))
    ));
    assert!(matches!(
        h.moderation
            .block_user(
                &caller,
                &admin.id,
                BlockUserInput {
                    reason: None,
                    duration_days: None,
                },
            )
            .await,
        Err(AppError::InvalidTarget(_))
    ));
    assert!(matches!(
        h.reports
            .report_post(
                &caller,
                &post_id,
                ReportPostInput {
                    reason: ReportReason::Spam,
                    description: None,
                },
            )
            .await,
        Err(AppError::InvalidTarget(_))
    ));
}

#[tokio::test]
async fn test_duplicate_report_is_rejected() {
    let h = Harness::new().await;
    let author = h.user("author", Role::User).await;
    let reporter = h.user("reporter", Role::User).await;
    let post_id = h.post(&author, "questionable").await;
    let caller = h.caller_for(&reporter).await;

    let input = || ReportPostInput {
        reason: ReportReason::Spam,
        description: Some("ads".to_string()),
    };

    let report = h.reports.report_post(&caller, &post_id, input()).await.unwrap();
    assert_eq!(report.reported_user_id, author.id);

    let second = h.reports.report_post(&caller, &post_id, input()).await;
    assert!(matches!(second, Err(AppError::AlreadyReported)));
}

#[tokio::test]
async fn test_role_gates_are_not_hierarchical() {
    let h = Harness::new().await;
    let god = h.user("god", Role::God).await;
    let super_admin = h.user("super", Role::SuperAdmin).await;
    let admin = h.user("admin", Role::Admin).await;

    // Admin-only listings admit neither SUPER_ADMIN nor GOD
    for user in [&god, &super_admin] {
        let caller = h.caller_for(user).await;
        assert!(matches!(
            h.moderation.stats(&caller).await,
            Err(AppError::InsufficientPermissions)
        ));
    }
    assert!(h.moderation.stats(&h.caller_for(&admin).await).await.is_ok());
}

#[tokio::test]
async fn test_comment_broadcasts_to_thread_watchers() {
    let h = Harness::new().await;
    let author = h.user("author", Role::User).await;
    let commenter = h.user("commenter", Role::User).await;
    let post_id = h.post(&author, "discuss").await;
    let other_post = h.post(&author, "elsewhere").await;

    let (tx, mut rx) = mpsc::channel(16);
    let _sub = h
        .subscriptions
        .open(
            &Caller::Anonymous,
            &StreamChannel::NewComment {
                post_id: post_id.clone(),
            },
            &tx,
        )
        .await
        .unwrap();

    let input = |content: &str| CreateCommentInput {
        content: content.to_string(),
    };
    let caller = h.caller_for(&commenter).await;
    h.comments
        .comment(&caller, &other_post, input("not this one"))
        .await
        .unwrap();
    let comment = h
        .comments
        .comment(&caller, &post_id, input("nice"))
        .await
        .unwrap();

    let delivery = next(&mut rx).await.unwrap();
    assert_eq!(delivery.event.topic, Topic::NewComment);
    assert_eq!(delivery.event.post_id(), Some(post_id.as_str()));
    assert!(next(&mut rx).await.is_none());

    assert_eq!(
        h.notifications
            .find_by_user_and_type(&author.id, NotificationType::PostCommented)
            .await
            .unwrap()
            .len(),
        2
    );
    assert_eq!(comment.post_id, post_id);
}

#[tokio::test]
async fn test_stale_credential_degrades_to_anonymous_on_public_reads() {
    let h = Harness::new().await;
    let author = h.user("author", Role::User).await;
    let post_id = h.post(&author, "public").await;

    let caller = h.resolver.resolve_caller(Some("garbage")).await.unwrap();

    assert!(h.posts.get(&caller, &post_id).await.is_ok());
    assert!(matches!(
        h.likes.toggle(&caller, &post_id).await,
        Err(AppError::InvalidCredential)
    ));
}

#[tokio::test]
async fn test_pending_account_may_act() {
    let h = Harness::new().await;
    let author = h.user("author", Role::User).await;
    let pending = h
        .db
        .create_user_with_status("pending", Role::User, UserStatus::Pending)
        .await
        .unwrap();
    let post_id = h.post(&author, "hi").await;

    let caller = Caller::Authenticated(Principal::new(pending));
    assert!(h.likes.toggle(&caller, &post_id).await.is_ok());
    assert_eq!(h.bus.subscription_count(), 0);
}

#[tokio::test]
async fn test_concurrent_follows_leave_one_edge() {
    let h = Harness::new().await;
    let u1 = h.user("u1", Role::User).await;
    let u2 = h.user("u2", Role::User).await;
    let caller = h.caller_for(&u1).await;

    let (a, b) = tokio::join!(
        h.following.follow(&caller, &u2.id),
        h.following.follow(&caller, &u2.id)
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(AppError::AlreadyFollowing)))
    );
    assert_eq!(
        FollowingRepository::new(h.db.connection())
            .count_followers(&u2.id)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        h.notifications
            .find_by_user_and_type(&u2.id, NotificationType::NewFollower)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_concurrent_reports_leave_one_report() {
    let h = Harness::new().await;
    let author = h.user("author", Role::User).await;
    let reporter = h.user("reporter", Role::User).await;
    let post_id = h.post(&author, "questionable").await;
    let caller = h.caller_for(&reporter).await;

    let input = || ReportPostInput {
        reason: ReportReason::Spam,
        description: None,
    };
    let (a, b) = tokio::join!(
        h.reports.report_post(&caller, &post_id, input()),
        h.reports.report_post(&caller, &post_id, input())
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(AppError::AlreadyReported)))
    );
    assert_eq!(ReportRepository::new(h.db.connection()).count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_likes_stay_consistent() {
    let h = Harness::new().await;
    let u1 = h.user("u1", Role::User).await;
    let u2 = h.user("u2", Role::User).await;
    let post_id = h.post(&u2, "race").await;
    let caller = h.caller_for(&u1).await;

    let (a, b) = tokio::join!(
        h.likes.toggle(&caller, &post_id),
        h.likes.toggle(&caller, &post_id)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    // Either the toggles serialized (liked then unliked) or they raced and
    // both observed the single like row.
    let rows = PostLikeRepository::new(h.db.connection())
        .count_by_pair(&u1.id, &post_id)
        .await
        .unwrap();
    if a.is_liked && b.is_liked {
        assert_eq!(rows, 1);
    } else {
        assert_ne!(a.is_liked, b.is_liked);
        assert_eq!(rows, 0);
    }
    assert_eq!(
        h.notifications
            .find_by_user_and_type(&u2.id, NotificationType::PostLiked)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_post_channels_follow_post_visibility() {
    let h = Harness::new().await;
    let author = h.user("author", Role::User).await;
    let follower = h.user("follower", Role::User).await;
    let stranger = h.user("stranger", Role::User).await;
    h.following
        .follow(&h.caller_for(&follower).await, &author.id)
        .await
        .unwrap();
    let post_id = h
        .post_with(&author, "friends only", Visibility::Followers)
        .await;
    let channel = StreamChannel::NewComment {
        post_id: post_id.clone(),
    };

    let (tx, mut rx) = mpsc::channel(16);
    for caller in [Caller::Anonymous, h.caller_for(&stranger).await] {
        assert!(matches!(
            h.subscriptions.open(&caller, &channel, &tx).await,
            Err(AppError::NotFound(_))
        ));
    }
    assert_eq!(h.bus.subscription_count(), 0);

    let follower_caller = h.caller_for(&follower).await;
    let _sub = h
        .subscriptions
        .open(&follower_caller, &channel, &tx)
        .await
        .unwrap();
    h.comments
        .comment(
            &follower_caller,
            &post_id,
            CreateCommentInput {
                content: "seen".to_string(),
            },
        )
        .await
        .unwrap();

    let delivery = next(&mut rx).await.unwrap();
    assert_eq!(delivery.event.topic, Topic::NewComment);
    assert_eq!(delivery.event.post_id(), Some(post_id.as_str()));
}
