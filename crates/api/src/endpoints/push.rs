//! Push notification endpoints.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chorus_common::AppResult;
use chorus_core::{PushSendResult, RegisterPushTokenInput, SendPushInput};
use chorus_db::{
    entities::{notification_setting, push_token},
    repositories::NotificationSettingUpdate,
};

use crate::{extractors::CallerContext, middleware::AppState, response::ApiResponse};

async fn register_token(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(input): Json<RegisterPushTokenInput>,
) -> AppResult<ApiResponse<push_token::Model>> {
    let token = state.push_service.register_token(&caller, input).await?;
    Ok(ApiResponse::ok(token))
}

async fn settings(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<notification_setting::Model>> {
    Ok(ApiResponse::ok(state.push_service.settings(&caller).await?))
}

async fn update_settings(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(update): Json<NotificationSettingUpdate>,
) -> AppResult<ApiResponse<notification_setting::Model>> {
    let settings = state.push_service.update_settings(&caller, update).await?;
    Ok(ApiResponse::ok(settings))
}

/// Send a test push to the caller's own devices.
async fn test(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<PushSendResult>> {
    Ok(ApiResponse::ok(state.push_service.test(&caller).await?))
}

async fn send(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(input): Json<SendPushInput>,
) -> AppResult<ApiResponse<PushSendResult>> {
    Ok(ApiResponse::ok(state.push_service.send(&caller, input).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tokens", post(register_token))
        .route("/settings", get(settings).patch(update_settings))
        .route("/test", post(test))
        .route("/send", post(send))
}
