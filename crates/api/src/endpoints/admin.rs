//! Moderation endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chorus_common::AppResult;
use chorus_core::{AdminStats, BlockUserInput, ModeratePostInput, ResolveReportInput, UserPage};
use chorus_db::{
    entities::{
        report::{self, ReportStatus},
        system_log::{self, LogType},
        user::{self, Role, UserStatus},
    },
    repositories::UserSearch,
};
use serde::Deserialize;

use super::DEFAULT_LIMIT;
use crate::{
    extractors::CallerContext,
    middleware::AppState,
    response::{Acknowledgement, ApiResponse},
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersQuery {
    pub q: Option<String>,
    pub status: Option<UserStatus>,
    pub role: Option<Role>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportsQuery {
    pub status: Option<ReportStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub log_type: Option<LogType>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

async fn block_user(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(input): Json<BlockUserInput>,
) -> AppResult<ApiResponse<user::Model>> {
    let user = state
        .moderation_service
        .block_user(&caller, &user_id, input)
        .await?;
    Ok(ApiResponse::ok(user))
}

async fn unblock_user(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<ApiResponse<user::Model>> {
    let user = state.moderation_service.unblock_user(&caller, &user_id).await?;
    Ok(ApiResponse::ok(user))
}

async fn delete_post(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(input): Json<ModeratePostInput>,
) -> AppResult<ApiResponse<Acknowledgement>> {
    state
        .moderation_service
        .delete_post(&caller, &post_id, input)
        .await?;
    Ok(Acknowledgement::new("Post removed"))
}

async fn resolve_report(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    Json(input): Json<ResolveReportInput>,
) -> AppResult<ApiResponse<report::Model>> {
    let report = state
        .moderation_service
        .resolve_report(&caller, &report_id, input)
        .await?;
    Ok(ApiResponse::ok(report))
}

async fn stats(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<AdminStats>> {
    Ok(ApiResponse::ok(state.moderation_service.stats(&caller).await?))
}

async fn users(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Query(query): Query<UsersQuery>,
) -> AppResult<ApiResponse<UserPage>> {
    let search = UserSearch {
        query: query.q,
        status: query.status,
        role: query.role,
    };
    let page = state
        .moderation_service
        .users(
            &caller,
            search,
            query.page.unwrap_or(1),
            query.limit.unwrap_or(DEFAULT_LIMIT),
        )
        .await?;
    Ok(ApiResponse::ok(page))
}

async fn reports(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Query(query): Query<ReportsQuery>,
) -> AppResult<ApiResponse<Vec<report::Model>>> {
    let reports = state
        .moderation_service
        .reports(
            &caller,
            query.status,
            query.limit.unwrap_or(DEFAULT_LIMIT),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(ApiResponse::ok(reports))
}

async fn logs(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> AppResult<ApiResponse<Vec<system_log::Model>>> {
    let logs = state
        .moderation_service
        .logs(
            &caller,
            query.log_type,
            query.limit.unwrap_or(DEFAULT_LIMIT),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(ApiResponse::ok(logs))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(users))
        .route("/users/{id}/block", post(block_user))
        .route("/users/{id}/unblock", post(unblock_user))
        .route("/posts/{id}/delete", post(delete_post))
        .route("/reports", get(reports))
        .route("/reports/{id}/resolve", post(resolve_report))
        .route("/stats", get(stats))
        .route("/logs", get(logs))
}
