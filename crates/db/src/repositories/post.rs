//! Post repository.

use std::sync::Arc;

use super::map_write_err;
use crate::entities::{
    Post,
    post::{self, PostStatus, Visibility},
};
use chorus_common::{AppError, AppResult};
use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
    sea_query::{Expr, Func},
};

/// Post repository for database operations.
#[derive(Clone)]
pub struct PostRepository {
    db: Arc<DatabaseConnection>,
}

impl PostRepository {
    /// Create a new post repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a post by ID, including soft-deleted ones.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<post::Model>> {
        Post::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a post that has not been deleted, or fail with `NotFound`.
    pub async fn get_visible(&self, id: &str) -> AppResult<post::Model> {
        match self.find_by_id(id).await? {
            Some(post) if !post.is_deleted() => Ok(post),
            _ => Err(AppError::NotFound(format!("Post {id}"))),
        }
    }

    /// Create a new post.
    pub async fn create(&self, model: post::ActiveModel) -> AppResult<post::Model> {
        model.insert(self.db.as_ref()).await.map_err(map_write_err)
    }

    /// Update a post.
    pub async fn update(&self, model: post::ActiveModel) -> AppResult<post::Model> {
        model.update(self.db.as_ref()).await.map_err(map_write_err)
    }

    /// Published posts by the given authors that `viewer_id` may read in a
    /// feed, newest first. Private posts appear only to their own author.
    pub async fn find_feed(
        &self,
        viewer_id: &str,
        author_ids: &[String],
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<post::Model>> {
        if author_ids.is_empty() {
            return Ok(vec![]);
        }

        let mut query = Post::find()
            .filter(post::Column::AuthorId.is_in(author_ids.to_vec()))
            .filter(post::Column::Status.eq(PostStatus::Published))
            .filter(
                Condition::any()
                    .add(post::Column::Visibility.ne(Visibility::Private))
                    .add(post::Column::AuthorId.eq(viewer_id)),
            )
            .order_by_desc(post::Column::Id);

        if let Some(id) = until_id {
            query = query.filter(post::Column::Id.lt(id));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Published public posts, newest first.
    pub async fn find_public(
        &self,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<post::Model>> {
        let mut query = Post::find()
            .filter(post::Column::Status.eq(PostStatus::Published))
            .filter(post::Column::Visibility.eq(Visibility::Public))
            .order_by_desc(post::Column::Id);

        if let Some(id) = until_id {
            query = query.filter(post::Column::Id.lt(id));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Case-insensitive search over title and content of public posts.
    pub async fn search(&self, text: &str, limit: u64, offset: u64) -> AppResult<Vec<post::Model>> {
        let pattern = format!("%{}%", text.trim().to_lowercase());

        Post::find()
            .filter(post::Column::Status.eq(PostStatus::Published))
            .filter(post::Column::Visibility.eq(Visibility::Public))
            .filter(
                Condition::any()
                    .add(Expr::expr(Func::lower(Expr::col(post::Column::Content))).like(&pattern))
                    .add(Expr::expr(Func::lower(Expr::col(post::Column::Title))).like(&pattern)),
            )
            .order_by_desc(post::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count all posts.
    pub async fn count(&self) -> AppResult<u64> {
        Post::find()
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count posts in a given state.
    pub async fn count_by_status(&self, status: PostStatus) -> AppResult<u64> {
        Post::find()
            .filter(post::Column::Status.eq(status))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count published posts of one author.
    pub async fn count_published_by_author(&self, author_id: &str) -> AppResult<u64> {
        Post::find()
            .filter(post::Column::AuthorId.eq(author_id))
            .filter(post::Column::Status.eq(PostStatus::Published))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Hard-delete posts soft-deleted before the cutoff.
    pub async fn purge_deleted_before(&self, cutoff: DateTime<FixedOffset>) -> AppResult<u64> {
        let result = Post::delete_many()
            .filter(post::Column::Status.eq(PostStatus::Deleted))
            .filter(post::Column::DeletedAt.lt(cutoff))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_post(id: &str, status: PostStatus) -> post::Model {
        post::Model {
            id: id.to_string(),
            author_id: "author".to_string(),
            title: None,
            content: "hello".to_string(),
            image_url: None,
            visibility: Visibility::Public,
            status,
            published_at: None,
            deleted_at: None,
            deleted_by: None,
            deleted_reason: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_get_visible_hides_deleted_posts() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_post("p1", PostStatus::Deleted)]])
            .into_connection();

        let repo = PostRepository::new(Arc::new(db));
        let result = repo.get_visible("p1").await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_visible_returns_published_post() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_post("p1", PostStatus::Published)]])
            .into_connection();

        let repo = PostRepository::new(Arc::new(db));
        let post = repo.get_visible("p1").await.unwrap();

        assert_eq!(post.id, "p1");
    }

    #[tokio::test]
    async fn test_find_feed_without_authors_skips_query() {
        // No query results appended: touching the database would fail
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let repo = PostRepository::new(Arc::new(db));
        let posts = repo.find_feed("u1", &[], 10, None).await.unwrap();

        assert!(posts.is_empty());
    }
}
