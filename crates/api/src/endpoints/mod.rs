//! API endpoints.

mod admin;
mod auth;
mod god;
mod notifications;
mod posts;
mod push;
mod users;

use axum::Router;
use serde::Deserialize;

use crate::middleware::AppState;

const DEFAULT_LIMIT: u64 = 20;

/// Paging parameters shared by list endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub until_id: Option<String>,
    pub since_id: Option<String>,
}

impl PageQuery {
    fn limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    fn offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }
}

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/posts", posts::router())
        .nest("/notifications", notifications::router())
        .nest("/push", push::router())
        .nest("/admin", admin::router())
        .nest("/god", god::router())
}
