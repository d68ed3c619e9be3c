//! Database integration tests against the migrated in-memory schema.

#![allow(clippy::unwrap_used)]

use chorus_common::{AppError, IdGenerator};
use chorus_db::{
    entities::{
        following,
        post::{self, Visibility},
        post_like, report,
        user::Role,
    },
    repositories::{
        FollowingRepository, NotificationSettingRepository, NotificationSettingUpdate,
        PostLikeRepository, PostRepository, PushTokenRepository, ReportRepository,
        SystemSettingRepository,
    },
    test_utils::TestDatabase,
};
use chrono::Utc;
use sea_orm::Set;

fn follow_edge(follower: &str, followee: &str) -> following::ActiveModel {
    following::ActiveModel {
        id: Set(IdGenerator::new().generate()),
        follower_id: Set(follower.to_string()),
        followee_id: Set(followee.to_string()),
        created_at: Set(Utc::now().into()),
    }
}

#[tokio::test]
async fn test_duplicate_follow_edge_is_constraint_violation() {
    let db = TestDatabase::in_memory().await.unwrap();
    let alice = db.create_user("alice", Role::User).await.unwrap();
    let bob = db.create_user("bob", Role::User).await.unwrap();
    let repo = FollowingRepository::new(db.connection());

    repo.create(follow_edge(&alice.id, &bob.id)).await.unwrap();
    let second = repo.create(follow_edge(&alice.id, &bob.id)).await;

    assert!(matches!(second, Err(AppError::ConstraintViolation(_))));
    assert_eq!(repo.count_followers(&bob.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_reverse_follow_edge_is_distinct() {
    let db = TestDatabase::in_memory().await.unwrap();
    let alice = db.create_user("alice", Role::User).await.unwrap();
    let bob = db.create_user("bob", Role::User).await.unwrap();
    let repo = FollowingRepository::new(db.connection());

    repo.create(follow_edge(&alice.id, &bob.id)).await.unwrap();
    repo.create(follow_edge(&bob.id, &alice.id)).await.unwrap();

    assert_eq!(repo.count().await.unwrap(), 2);
    assert_eq!(repo.following_ids(&alice.id).await.unwrap(), vec![bob.id]);
}

#[tokio::test]
async fn test_duplicate_like_is_constraint_violation() {
    let db = TestDatabase::in_memory().await.unwrap();
    let alice = db.create_user("alice", Role::User).await.unwrap();
    let post = db.create_post(&alice.id, "hello").await.unwrap();
    let repo = PostLikeRepository::new(db.connection());

    let like = || post_like::ActiveModel {
        id: Set(IdGenerator::new().generate()),
        user_id: Set(alice.id.clone()),
        post_id: Set(post.id.clone()),
        created_at: Set(Utc::now().into()),
    };

    repo.create(like()).await.unwrap();
    assert!(matches!(
        repo.create(like()).await,
        Err(AppError::ConstraintViolation(_))
    ));
    assert_eq!(repo.count_by_pair(&alice.id, &post.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_report_is_constraint_violation() {
    let db = TestDatabase::in_memory().await.unwrap();
    let author = db.create_user("author", Role::User).await.unwrap();
    let reporter = db.create_user("reporter", Role::User).await.unwrap();
    let post = db.create_post(&author.id, "spam").await.unwrap();
    let repo = ReportRepository::new(db.connection());

    let report = || report::ActiveModel {
        id: Set(IdGenerator::new().generate()),
        reporter_id: Set(reporter.id.clone()),
        post_id: Set(post.id.clone()),
        reported_user_id: Set(author.id.clone()),
        reason: Set(report::ReportReason::Spam),
        description: Set(None),
        status: Set(report::ReportStatus::Pending),
        action: Set(None),
        admin_note: Set(None),
        resolved_by: Set(None),
        resolved_at: Set(None),
        created_at: Set(Utc::now().into()),
    };

    repo.create(report()).await.unwrap();
    assert!(matches!(
        repo.create(report()).await,
        Err(AppError::ConstraintViolation(_))
    ));
}

#[tokio::test]
async fn test_push_token_upsert_keeps_one_row_per_pair() {
    let db = TestDatabase::in_memory().await.unwrap();
    let alice = db.create_user("alice", Role::User).await.unwrap();
    let repo = PushTokenRepository::new(db.connection());
    let id_gen = IdGenerator::new();
    let token = "ExponentPushToken[abc]";

    let first = repo
        .upsert(id_gen.generate(), &alice.id, token, "ios", Utc::now().into())
        .await
        .unwrap();
    let second = repo
        .upsert(id_gen.generate(), &alice.id, token, "android", Utc::now().into())
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.platform, "android");
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_notification_settings_partial_update() {
    let db = TestDatabase::in_memory().await.unwrap();
    let alice = db.create_user("alice", Role::User).await.unwrap();
    let repo = NotificationSettingRepository::new(db.connection());

    let defaults = repo.get_or_create(&alice.id, Utc::now().into()).await.unwrap();
    assert!(defaults.push_enabled && defaults.post_liked);

    let update = NotificationSettingUpdate {
        post_liked: Some(false),
        ..Default::default()
    };
    let updated = repo.upsert(&alice.id, &update, Utc::now().into()).await.unwrap();

    assert!(!updated.post_liked);
    assert!(updated.push_enabled);
}

#[tokio::test]
async fn test_system_setting_upsert_replaces_value() {
    let db = TestDatabase::in_memory().await.unwrap();
    let repo = SystemSettingRepository::new(db.connection());

    repo.upsert("maintenance_mode", serde_json::json!({"enabled": true}), None, Utc::now().into())
        .await
        .unwrap();
    let setting = repo
        .upsert("maintenance_mode", serde_json::json!({"enabled": false}), None, Utc::now().into())
        .await
        .unwrap();

    assert_eq!(setting.value["enabled"], serde_json::json!(false));
}

#[tokio::test]
async fn test_feed_page_excludes_private_posts_of_others() {
    let db = TestDatabase::in_memory().await.unwrap();
    let alice = db.create_user("alice", Role::User).await.unwrap();
    let bob = db.create_user("bob", Role::User).await.unwrap();
    let repo = PostRepository::new(db.connection());

    let make_private = |model: post::Model| {
        let mut active: post::ActiveModel = model.into();
        active.visibility = Set(Visibility::Private);
        active
    };
    db.create_post(&bob.id, "one").await.unwrap();
    let hidden = db.create_post(&bob.id, "two").await.unwrap();
    repo.update(make_private(hidden)).await.unwrap();
    db.create_post(&bob.id, "three").await.unwrap();
    let own = db.create_post(&alice.id, "mine").await.unwrap();
    let own = repo.update(make_private(own)).await.unwrap();

    let authors = vec![bob.id.clone()];
    let page = repo.find_feed(&alice.id, &authors, 2, None).await.unwrap();
    assert_eq!(page.len(), 2);
    assert!(page.iter().all(|p| p.visibility == Visibility::Public));

    let authors = vec![alice.id.clone(), bob.id.clone()];
    let page = repo.find_feed(&alice.id, &authors, 10, None).await.unwrap();
    assert_eq!(page.len(), 3);
    assert!(page.iter().any(|p| p.id == own.id));
}
