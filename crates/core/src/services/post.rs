//! Post service.

use chorus_common::{AppError, AppResult, IdGenerator};
use chorus_db::{
    entities::post::{self, PostStatus, Visibility},
    repositories::{CommentRepository, FollowingRepository, PostLikeRepository, PostRepository},
};
use chrono::Utc;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use super::fanout::FanoutService;
use super::guard::{gates, require};
use super::identity::{Caller, Principal};

/// Largest page a post listing returns.
const MAX_PAGE: u64 = 100;

/// Input for creating a post.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
    #[validate(url)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

/// Input for updating a post; absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostInput {
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub content: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
    pub visibility: Option<Visibility>,
}

/// A post with its engagement counts as seen by one viewer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: post::Model,
    pub like_count: u64,
    pub comment_count: u64,
    pub is_liked: bool,
}

/// Post service for business logic.
#[derive(Clone)]
pub struct PostService {
    post_repo: PostRepository,
    like_repo: PostLikeRepository,
    comment_repo: CommentRepository,
    following_repo: FollowingRepository,
    fanout: FanoutService,
    id_gen: IdGenerator,
}

impl PostService {
    /// Create a new post service.
    #[must_use]
    pub const fn new(
        post_repo: PostRepository,
        like_repo: PostLikeRepository,
        comment_repo: CommentRepository,
        following_repo: FollowingRepository,
        fanout: FanoutService,
    ) -> Self {
        Self {
            post_repo,
            like_repo,
            comment_repo,
            following_repo,
            fanout,
            id_gen: IdGenerator::new(),
        }
    }

    /// Publish a post and fan it out to the author's followers.
    pub async fn create(&self, caller: &Caller, input: CreatePostInput) -> AppResult<post::Model> {
        let me = require(gates::CREATE_POST, caller)?;
        input.validate()?;

        let now = Utc::now();
        let model = post::ActiveModel {
            id: Set(self.id_gen.generate()),
            author_id: Set(me.id().to_string()),
            title: Set(input.title),
            content: Set(input.content),
            image_url: Set(input.image_url),
            visibility: Set(input.visibility),
            status: Set(PostStatus::Published),
            published_at: Set(Some(now.into())),
            deleted_at: Set(None),
            deleted_by: Set(None),
            deleted_reason: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(None),
        };

        let post = self.post_repo.create(model).await?;

        self.fanout.new_post(me.user(), &post).await;
        self.fanout.system_activity(
            "post.created",
            Some(me.id()),
            json!({ "postId": post.id }),
        );

        Ok(post)
    }

    /// Update one of the caller's posts. Posts of others are `NotFound`.
    pub async fn update(
        &self,
        caller: &Caller,
        post_id: &str,
        input: UpdatePostInput,
    ) -> AppResult<post::Model> {
        let me = require(gates::UPDATE_POST, caller)?;
        input.validate()?;

        let post = self.owned_post(&me, post_id).await?;

        let mut active: post::ActiveModel = post.into();
        if let Some(title) = input.title {
            active.title = Set(Some(title));
        }
        if let Some(content) = input.content {
            active.content = Set(content);
        }
        if let Some(image_url) = input.image_url {
            active.image_url = Set(Some(image_url));
        }
        if let Some(visibility) = input.visibility {
            active.visibility = Set(visibility);
        }
        active.updated_at = Set(Some(Utc::now().into()));

        self.post_repo.update(active).await
    }

    /// Soft-delete one of the caller's posts. Posts of others are `NotFound`.
    pub async fn delete(&self, caller: &Caller, post_id: &str) -> AppResult<()> {
        let me = require(gates::DELETE_POST, caller)?;
        let post = self.owned_post(&me, post_id).await?;

        let now = Utc::now();
        let mut active: post::ActiveModel = post.into();
        active.status = Set(PostStatus::Deleted);
        active.deleted_at = Set(Some(now.into()));
        active.deleted_by = Set(Some(me.id().to_string()));
        active.updated_at = Set(Some(now.into()));
        self.post_repo.update(active).await?;

        tracing::info!(post_id = %post_id, "Post deleted by author");
        Ok(())
    }

    /// Get a post the caller may see.
    pub async fn get(&self, caller: &Caller, post_id: &str) -> AppResult<PostView> {
        let viewer = gates::GET_POST.check(caller)?;
        let post = self.visible_post(viewer.as_ref(), post_id).await?;
        self.view(viewer.as_ref(), post).await
    }

    /// The caller's own posts and those of accounts they follow.
    pub async fn feed(
        &self,
        caller: &Caller,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<PostView>> {
        let me = require(gates::FEED, caller)?;

        let mut authors = self.following_repo.following_ids(me.id()).await?;
        authors.push(me.id().to_string());

        let posts = self
            .post_repo
            .find_feed(me.id(), &authors, limit.clamp(1, MAX_PAGE), until_id)
            .await?;

        self.views(Some(&me), posts).await
    }

    /// Public posts, newest first.
    pub async fn explore(
        &self,
        caller: &Caller,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<PostView>> {
        let viewer = gates::EXPLORE.check(caller)?;
        let posts = self
            .post_repo
            .find_public(limit.clamp(1, MAX_PAGE), until_id)
            .await?;
        self.views(viewer.as_ref(), posts).await
    }

    /// Search public posts.
    pub async fn search(
        &self,
        caller: &Caller,
        query: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<PostView>> {
        let viewer = gates::SEARCH_POSTS.check(caller)?;
        if query.trim().is_empty() {
            return Err(AppError::Validation("Search query must not be empty".to_string()));
        }

        let posts = self
            .post_repo
            .search(query, limit.clamp(1, MAX_PAGE), offset)
            .await?;
        self.views(viewer.as_ref(), posts).await
    }

    /// Load a post the viewer may see; anything else is `NotFound`.
    pub(crate) async fn visible_post(
        &self,
        viewer: Option<&Principal>,
        post_id: &str,
    ) -> AppResult<post::Model> {
        let post = self.post_repo.get_visible(post_id).await?;

        let visible = match post.visibility {
            Visibility::Public => true,
            Visibility::Private => viewer.is_some_and(|v| v.id() == post.author_id),
            Visibility::Followers => match viewer {
                Some(v) if v.id() == post.author_id => true,
                Some(v) => self.following_repo.is_following(v.id(), &post.author_id).await?,
                None => false,
            },
        };

        if visible {
            Ok(post)
        } else {
            Err(AppError::NotFound(format!("Post {post_id}")))
        }
    }

    async fn owned_post(&self, me: &Principal, post_id: &str) -> AppResult<post::Model> {
        match self.post_repo.get_visible(post_id).await? {
            post if post.author_id == me.id() => Ok(post),
            _ => Err(AppError::NotFound(format!("Post {post_id}"))),
        }
    }

    async fn view(&self, viewer: Option<&Principal>, post: post::Model) -> AppResult<PostView> {
        let like_count = self.like_repo.count_by_post(&post.id).await?;
        let comment_count = self.comment_repo.count_by_post(&post.id).await?;
        let is_liked = match viewer {
            Some(v) => self.like_repo.count_by_pair(v.id(), &post.id).await? > 0,
            None => false,
        };

        Ok(PostView {
            post,
            like_count,
            comment_count,
            is_liked,
        })
    }

    async fn views(
        &self,
        viewer: Option<&Principal>,
        posts: Vec<post::Model>,
    ) -> AppResult<Vec<PostView>> {
        let liked = match viewer {
            Some(v) => {
                let ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
                self.like_repo.liked_post_ids(v.id(), &ids).await?
            }
            None => Vec::new(),
        };

        let mut views = Vec::with_capacity(posts.len());
        for post in posts {
            let like_count = self.like_repo.count_by_post(&post.id).await?;
            let comment_count = self.comment_repo.count_by_post(&post.id).await?;
            let is_liked = liked.contains(&post.id);
            views.push(PostView {
                post,
                like_count,
                comment_count,
                is_liked,
            });
        }
        Ok(views)
    }
}
