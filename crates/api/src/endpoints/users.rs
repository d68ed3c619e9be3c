//! User and social graph endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chorus_common::AppResult;
use chorus_core::{UpdateProfileInput, UserProfile};
use chorus_db::entities::{following, user};
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

async fn me(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<user::Model>> {
    Ok(ApiResponse::ok(state.account_service.me(&caller).await?))
}

async fn update_me(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(input): Json<UpdateProfileInput>,
) -> AppResult<ApiResponse<user::Model>> {
    let user = state.account_service.update_profile(&caller, input).await?;
    Ok(ApiResponse::ok(user))
}

async fn search(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<ApiResponse<Vec<user::Model>>> {
    let users = state
        .account_service
        .search_users(
            &caller,
            &query.q,
            query.limit.unwrap_or(DEFAULT_LIMIT),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(ApiResponse::ok(users))
}

async fn show(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<ApiResponse<UserProfile>> {
    let profile = state.account_service.user_profile(&caller, &user_id).await?;
    Ok(ApiResponse::ok(profile))
}

async fn followers(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<ApiResponse<Vec<following::Model>>> {
    let edges = state
        .following_service
        .followers(&caller, &user_id, page.limit(), page.until_id.as_deref())
        .await?;
    Ok(ApiResponse::ok(edges))
}

async fn following(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<ApiResponse<Vec<following::Model>>> {
    let edges = state
        .following_service
        .following(&caller, &user_id, page.limit(), page.until_id.as_deref())
        .await?;
    Ok(ApiResponse::ok(edges))
}

async fn follow(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<ApiResponse<following::Model>> {
    let edge = state.following_service.follow(&caller, &user_id).await?;
    Ok(ApiResponse::created(edge))
}

async fn unfollow(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<ApiResponse<Acknowledgement>> {
    state.following_service.unfollow(&caller, &user_id).await?;
    Ok(Acknowledgement::new("Unfollowed"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me).patch(update_me))
        .route("/search", get(search))
        .route("/{id}", get(show))
        .route("/{id}/followers", get(followers))
        .route("/{id}/following", get(following))
        .route("/{id}/follow", post(follow).delete(unfollow))
}
