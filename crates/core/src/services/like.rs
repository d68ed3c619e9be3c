//! Like service.

use chorus_common::{AppError, AppResult, IdGenerator};
use chorus_db::{entities::post_like, repositories::PostLikeRepository};
use chrono::Utc;
use sea_orm::Set;
use serde::Serialize;

use super::fanout::FanoutService;
use super::guard::{gates, require};
use super::identity::Caller;
use super::post::PostService;

/// State of a like after a toggle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggle {
    pub post_id: String,
    pub is_liked: bool,
    pub like_count: u64,
}

/// Like service for business logic.
#[derive(Clone)]
pub struct LikeService {
    like_repo: PostLikeRepository,
    post_service: PostService,
    fanout: FanoutService,
    id_gen: IdGenerator,
}

impl LikeService {
    /// Create a new like service.
    #[must_use]
    pub const fn new(
        like_repo: PostLikeRepository,
        post_service: PostService,
        fanout: FanoutService,
    ) -> Self {
        Self {
            like_repo,
            post_service,
            fanout,
            id_gen: IdGenerator::new(),
        }
    }

    /// Flip the caller's like on a post.
    ///
    /// Creating a like fans out `POST_LIKED`; removing one is silent. If a
    /// concurrent toggle created the row first, the post ends up liked and
    /// this call fans out nothing.
    pub async fn toggle(&self, caller: &Caller, post_id: &str) -> AppResult<LikeToggle> {
        let me = require(gates::TOGGLE_LIKE, caller)?;
        let post = self.post_service.visible_post(Some(&me), post_id).await?;

        let is_liked = if self.like_repo.delete_by_pair(me.id(), &post.id).await? {
            false
        } else {
            let model = post_like::ActiveModel {
                id: Set(self.id_gen.generate()),
                user_id: Set(me.id().to_string()),
                post_id: Set(post.id.clone()),
                created_at: Set(Utc::now().into()),
            };

            match self.like_repo.create(model).await {
                Ok(_) => {
                    self.fanout.post_liked(me.user(), &post).await;
                }
                Err(AppError::ConstraintViolation(_)) => {
                    tracing::debug!(post_id = %post.id, "Like raced with a concurrent toggle");
                }
                Err(e) => return Err(e),
            }
            true
        };

        let like_count = self.like_repo.count_by_post(&post.id).await?;

        Ok(LikeToggle {
            post_id: post.id,
            is_liked,
            like_count,
        })
    }
}
