//! Following service.

use chorus_common::{AppError, AppResult, IdGenerator};
use chorus_db::{
    entities::{following, user::UserStatus},
    repositories::{FollowingRepository, UserRepository},
};
use chrono::Utc;
use sea_orm::Set;

use super::fanout::FanoutService;
use super::guard::{gates, require};
use super::identity::Caller;

/// Largest page a follow listing returns.
const MAX_PAGE: u64 = 100;

/// Following service for business logic.
#[derive(Clone)]
pub struct FollowingService {
    following_repo: FollowingRepository,
    user_repo: UserRepository,
    fanout: FanoutService,
    id_gen: IdGenerator,
}

impl FollowingService {
    /// Create a new following service.
    #[must_use]
    pub const fn new(
        following_repo: FollowingRepository,
        user_repo: UserRepository,
        fanout: FanoutService,
    ) -> Self {
        Self {
            following_repo,
            user_repo,
            fanout,
            id_gen: IdGenerator::new(),
        }
    }

    /// Follow a user.
    ///
    /// Self-follows are rejected before the uniqueness check. A duplicate
    /// edge, including one created concurrently, is `AlreadyFollowing`.
    pub async fn follow(&self, caller: &Caller, followee_id: &str) -> AppResult<following::Model> {
        let me = require(gates::FOLLOW, caller)?;

        if me.id() == followee_id {
            return Err(AppError::InvalidTarget("Cannot follow yourself".to_string()));
        }

        let followee = self.user_repo.get_by_id(followee_id).await?;
        if followee.status == UserStatus::Deleted {
            return Err(AppError::NotFound(format!("User {followee_id}")));
        }

        if self.following_repo.is_following(me.id(), followee_id).await? {
            return Err(AppError::AlreadyFollowing);
        }

        let model = following::ActiveModel {
            id: Set(self.id_gen.generate()),
            follower_id: Set(me.id().to_string()),
            followee_id: Set(followee.id.clone()),
            created_at: Set(Utc::now().into()),
        };

        let edge = match self.following_repo.create(model).await {
            Ok(edge) => edge,
            Err(AppError::ConstraintViolation(_)) => return Err(AppError::AlreadyFollowing),
            Err(e) => return Err(e),
        };

        self.fanout.new_follower(me.user(), &followee.id).await;

        tracing::info!(follower = %me.id(), followee = %followee.id, "User followed");
        Ok(edge)
    }

    /// Unfollow a user. A missing edge is `NotFound`.
    pub async fn unfollow(&self, caller: &Caller, followee_id: &str) -> AppResult<()> {
        let me = require(gates::UNFOLLOW, caller)?;

        self.following_repo
            .delete_by_pair(me.id(), followee_id)
            .await?;

        tracing::info!(follower = %me.id(), followee = %followee_id, "User unfollowed");
        Ok(())
    }

    /// Get followers of a user.
    pub async fn followers(
        &self,
        caller: &Caller,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<following::Model>> {
        gates::LIST_FOLLOWS.check(caller)?;
        self.following_repo
            .find_followers(user_id, limit.clamp(1, MAX_PAGE), until_id)
            .await
    }

    /// Get users that a user is following.
    pub async fn following(
        &self,
        caller: &Caller,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<following::Model>> {
        gates::LIST_FOLLOWS.check(caller)?;
        self.following_repo
            .find_following(user_id, limit.clamp(1, MAX_PAGE), until_id)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::event_bus::EventBus;
    use crate::services::identity::{AuthFailure, Principal};
    use chorus_db::{
        entities::user::{self, Role},
        repositories::NotificationRepository,
    };
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
    use std::sync::Arc;

    fn create_test_user(id: &str) -> user::Model {
        user::Model {
            id: id.to_string(),
            email: None,
            username: id.to_string(),
            password_hash: None,
            display_name: None,
            bio: None,
            avatar_url: None,
            role: Role::User,
            status: UserStatus::Active,
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

    fn create_test_following(id: &str, follower_id: &str, followee_id: &str) -> following::Model {
        following::Model {
            id: id.to_string(),
            follower_id: follower_id.to_string(),
            followee_id: followee_id.to_string(),
            created_at: Utc::now().into(),
        }
    }

    fn service(db: DatabaseConnection) -> FollowingService {
        let db = Arc::new(db);
        let fanout = FanoutService::new(
            EventBus::new(8),
            NotificationRepository::new(Arc::clone(&db)),
            FollowingRepository::new(Arc::clone(&db)),
        );
        FollowingService::new(
            FollowingRepository::new(Arc::clone(&db)),
            UserRepository::new(db),
            fanout,
        )
    }

    fn caller(id: &str) -> Caller {
        Caller::Authenticated(Principal::new(create_test_user(id)))
    }

    #[tokio::test]
    async fn test_follow_yourself_is_invalid_target() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let result = service.follow(&caller("user1"), "user1").await;

        assert!(matches!(result, Err(AppError::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn test_follow_already_following() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_user("user2")]])
            .append_query_results([[create_test_following("f1", "user1", "user2")]])
            .into_connection();
        let service = service(db);

        let result = service.follow(&caller("user1"), "user2").await;

        assert!(matches!(result, Err(AppError::AlreadyFollowing)));
    }

    #[tokio::test]
    async fn test_follow_missing_target_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<user::Model>::new()])
            .into_connection();
        let service = service(db);

        let result = service.follow(&caller("user1"), "ghost").await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_follow_requires_authentication() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let anonymous = service.follow(&Caller::Anonymous, "user2").await;
        let rejected = service
            .follow(&Caller::Rejected(AuthFailure::InvalidCredential), "user2")
            .await;

        assert!(matches!(anonymous, Err(AppError::AuthenticationRequired)));
        assert!(matches!(rejected, Err(AppError::InvalidCredential)));
    }

    #[tokio::test]
    async fn test_followers_listing_is_public() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_following("f1", "user1", "user2")]])
            .into_connection();
        let service = service(db);

        let followers = service
            .followers(&Caller::Anonymous, "user2", 10, None)
            .await
            .unwrap();

        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].follower_id, "user1");
    }
}
