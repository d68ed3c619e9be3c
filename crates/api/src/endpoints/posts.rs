//! Post endpoints: authoring, timelines, likes, comments and reports.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chorus_common::AppResult;
use chorus_core::{
    CreateCommentInput, CreatePostInput, LikeToggle, PostView, ReportPostInput, UpdatePostInput,
};
use chorus_db::entities::{comment, post, report};
use serde::Deserialize;

use super::{DEFAULT_LIMIT, PageQuery};
use crate::{
    extractors::CallerContext,
    middleware::AppState,
    response::{Acknowledgement, ApiResponse},
};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

async fn create(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(input): Json<CreatePostInput>,
) -> AppResult<ApiResponse<post::Model>> {
    let post = state.post_service.create(&caller, input).await?;
    Ok(ApiResponse::created(post))
}

/// Own and followed authors' posts, newest first.
async fn feed(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> AppResult<ApiResponse<Vec<PostView>>> {
    let posts = state
        .post_service
        .feed(&caller, page.limit(), page.until_id.as_deref())
        .await?;
    Ok(ApiResponse::ok(posts))
}

async fn explore(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> AppResult<ApiResponse<Vec<PostView>>> {
    let posts = state
        .post_service
        .explore(&caller, page.limit(), page.until_id.as_deref())
        .await?;
    Ok(ApiResponse::ok(posts))
}

async fn search(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<ApiResponse<Vec<PostView>>> {
    let posts = state
        .post_service
        .search(
            &caller,
            &query.q,
            query.limit.unwrap_or(DEFAULT_LIMIT),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(ApiResponse::ok(posts))
}

async fn show(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<ApiResponse<PostView>> {
    Ok(ApiResponse::ok(state.post_service.get(&caller, &post_id).await?))
}

async fn update(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(input): Json<UpdatePostInput>,
) -> AppResult<ApiResponse<post::Model>> {
    let post = state.post_service.update(&caller, &post_id, input).await?;
    Ok(ApiResponse::ok(post))
}

async fn delete(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<ApiResponse<Acknowledgement>> {
    state.post_service.delete(&caller, &post_id).await?;
    Ok(Acknowledgement::new("Post deleted"))
}

/// Like the post, or remove the like if the caller already liked it.
async fn like(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<ApiResponse<LikeToggle>> {
    Ok(ApiResponse::ok(state.like_service.toggle(&caller, &post_id).await?))
}

async fn comments(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<ApiResponse<Vec<comment::Model>>> {
    let comments = state
        .comment_service
        .list(&caller, &post_id, page.limit(), page.since_id.as_deref())
        .await?;
    Ok(ApiResponse::ok(comments))
}

async fn add_comment(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(input): Json<CreateCommentInput>,
) -> AppResult<ApiResponse<comment::Model>> {
    let comment = state
        .comment_service
        .comment(&caller, &post_id, input)
        .await?;
    Ok(ApiResponse::created(comment))
}

async fn report(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(input): Json<ReportPostInput>,
) -> AppResult<ApiResponse<report::Model>> {
    let report = state
        .report_service
        .report_post(&caller, &post_id, input)
        .await?;
    Ok(ApiResponse::created(report))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/feed", get(feed))
        .route("/explore", get(explore))
        .route("/search", get(search))
        .route("/{id}", get(show).patch(update).delete(delete))
        .route("/{id}/like", post(like))
        .route("/{id}/comments", get(comments).post(add_comment))
        .route("/{id}/report", post(report))
}
