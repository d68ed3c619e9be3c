//! Test utilities for database operations.
//!
//! [`TestDatabase`] runs the real migrations against a private in-memory
//! `SQLite` database, so unique indexes behave as they do in production.

use std::sync::Arc;

use crate::entities::{
    post::{self, PostStatus, Visibility},
    user::{self, Role, UserStatus},
};
use crate::repositories::{PostRepository, UserRepository};
use chorus_common::{AppResult, IdGenerator};
use chrono::Utc;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr, Set};
use sea_orm_migration::MigratorTrait;
use tracing::debug;

/// A migrated in-memory database.
pub struct TestDatabase {
    /// Database connection.
    pub conn: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl TestDatabase {
    /// Create and migrate a fresh in-memory database.
    ///
    /// The pool is pinned to one connection: every `SQLite` memory connection
    /// is a separate database.
    pub async fn in_memory() -> Result<Self, DbErr> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);

        let conn = Database::connect(opt).await?;
        crate::migrations::Migrator::up(&conn, None).await?;

        debug!("Created in-memory test database");

        Ok(Self {
            conn: Arc::new(conn),
            id_gen: IdGenerator::new(),
        })
    }

    /// Get the shared connection handle.
    #[must_use]
    pub fn connection(&self) -> Arc<DatabaseConnection> {
        Arc::clone(&self.conn)
    }

    /// Insert an active user with the given role.
    pub async fn create_user(&self, username: &str, role: Role) -> AppResult<user::Model> {
        self.create_user_with_status(username, role, UserStatus::Active)
            .await
    }

    /// Insert a user with an explicit role and status.
    pub async fn create_user_with_status(
        &self,
        username: &str,
        role: Role,
        status: UserStatus,
    ) -> AppResult<user::Model> {
        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            email: Set(Some(format!("{username}@example.com"))),
            username: Set(username.to_lowercase()),
            password_hash: Set(None),
            display_name: Set(Some(username.to_string())),
            bio: Set(None),
            avatar_url: Set(None),
            role: Set(role),
            status: Set(status),
            email_verified: Set(false),
            google_id: Set(None),
            apple_id: Set(None),
            blocked_at: Set(None),
            blocked_reason: Set(None),
            blocked_by: Set(None),
            blocked_until: Set(None),
            last_active_at: Set(None),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };

        UserRepository::new(self.connection()).create(model).await
    }

    /// Insert a published public post.
    pub async fn create_post(&self, author_id: &str, content: &str) -> AppResult<post::Model> {
        let now = Utc::now();
        let model = post::ActiveModel {
            id: Set(self.id_gen.generate()),
            author_id: Set(author_id.to_string()),
            title: Set(None),
            content: Set(content.to_string()),
            image_url: Set(None),
            visibility: Set(Visibility::Public),
            status: Set(PostStatus::Published),
            published_at: Set(Some(now.into())),
            deleted_at: Set(None),
            deleted_by: Set(None),
            deleted_reason: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(None),
        };

        PostRepository::new(self.connection()).create(model).await
    }
}
