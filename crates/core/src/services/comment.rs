//! Comment service.

use chorus_common::{AppResult, IdGenerator};
use chorus_db::{entities::comment, repositories::CommentRepository};
use chrono::Utc;
use sea_orm::Set;
use serde::Deserialize;
use validator::Validate;

use super::fanout::FanoutService;
use super::guard::{gates, require};
use super::identity::Caller;
use super::post::PostService;

const MAX_PAGE: u64 = 100;

/// Input for commenting on a post.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentInput {
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
}

/// Comment service for business logic.
#[derive(Clone)]
pub struct CommentService {
    comment_repo: CommentRepository,
    post_service: PostService,
    fanout: FanoutService,
    id_gen: IdGenerator,
}

impl CommentService {
    /// Create a new comment service.
    #[must_use]
    pub const fn new(
        comment_repo: CommentRepository,
        post_service: PostService,
        fanout: FanoutService,
    ) -> Self {
        Self {
            comment_repo,
            post_service,
            fanout,
            id_gen: IdGenerator::new(),
        }
    }

    /// Comment on a post the caller can see.
    ///
    /// The post author is notified unless they wrote the comment; the thread
    /// broadcast goes out either way.
    pub async fn comment(
        &self,
        caller: &Caller,
        post_id: &str,
        input: CreateCommentInput,
    ) -> AppResult<comment::Model> {
        let me = require(gates::COMMENT, caller)?;
        input.validate()?;

        let post = self.post_service.visible_post(Some(&me), post_id).await?;

        let model = comment::ActiveModel {
            id: Set(self.id_gen.generate()),
            post_id: Set(post.id.clone()),
            author_id: Set(me.id().to_string()),
            content: Set(input.content),
            created_at: Set(Utc::now().into()),
        };
        let comment = self.comment_repo.create(model).await?;

        self.fanout.post_commented(me.user(), &post, &comment).await;
        self.fanout.new_comment(&post, &comment);

        Ok(comment)
    }

    /// Comments on a post, oldest first.
    pub async fn list(
        &self,
        caller: &Caller,
        post_id: &str,
        limit: u64,
        since_id: Option<&str>,
    ) -> AppResult<Vec<comment::Model>> {
        let viewer = gates::LIST_COMMENTS.check(caller)?;
        let post = self.post_service.visible_post(viewer.as_ref(), post_id).await?;

        self.comment_repo
            .find_by_post(&post.id, limit.clamp(1, MAX_PAGE), since_id)
            .await
    }
}
