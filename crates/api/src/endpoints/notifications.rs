//! Notification endpoints.

use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chorus_common::AppResult;
use chorus_db::entities::notification;
use serde::{Deserialize, Serialize};

use super::DEFAULT_LIMIT;
use crate::{extractors::CallerContext, middleware::AppState, response::ApiResponse};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: u64,
}

async fn list(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<ApiResponse<Vec<notification::Model>>> {
    let notifications = state
        .notification_service
        .list(
            &caller,
            query.unread_only,
            query.limit.unwrap_or(DEFAULT_LIMIT),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(ApiResponse::ok(notifications))
}

async fn unread_count(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.unread_count(&caller).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

async fn mark_read(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> AppResult<ApiResponse<notification::Model>> {
    let notification = state
        .notification_service
        .mark_read(&caller, &notification_id)
        .await?;
    Ok(ApiResponse::ok(notification))
}

/// Responds with the number of notifications that changed.
async fn mark_all_read(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.mark_all_read(&caller).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/unread-count", get(unread_count))
        .route("/{id}/read", post(mark_read))
        .route("/read-all", post(mark_all_read))
}
