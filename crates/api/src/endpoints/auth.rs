//! Authentication endpoints.

use axum::{Json, Router, extract::State, routing::post};
use chorus_common::AppResult;
use chorus_core::{
    AuthPayload, ChangePasswordInput, LoginInput, RegisterInput, ResetPasswordInput,
};
use serde::Deserialize;

use crate::{
    extractors::CallerContext,
    middleware::AppState,
    response::{Acknowledgement, ApiResponse},
};

/// Social sign-in request carrying the provider's identity token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialSignInRequest {
    pub id_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Create a password account.
async fn register(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> AppResult<ApiResponse<AuthPayload>> {
    let payload = state.account_service.register(&caller, input).await?;
    Ok(ApiResponse::created(payload))
}

/// Sign in with email and password.
async fn login(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> AppResult<ApiResponse<AuthPayload>> {
    let payload = state.account_service.login(&caller, input).await?;
    Ok(ApiResponse::ok(payload))
}

async fn google(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(req): Json<SocialSignInRequest>,
) -> AppResult<ApiResponse<AuthPayload>> {
    let payload = state
        .account_service
        .sign_in_with_google(&caller, &req.id_token)
        .await?;
    Ok(ApiResponse::ok(payload))
}

async fn apple(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(req): Json<SocialSignInRequest>,
) -> AppResult<ApiResponse<AuthPayload>> {
    let payload = state
        .account_service
        .sign_in_with_apple(&caller, &req.id_token)
        .await?;
    Ok(ApiResponse::ok(payload))
}

async fn logout(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Acknowledgement>> {
    state.account_service.logout(&caller).await?;
    Ok(Acknowledgement::new("Logged out"))
}

/// Request a password reset. The answer is the same whether or not the
/// address belongs to an account.
async fn forgot_password(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> AppResult<ApiResponse<Acknowledgement>> {
    state
        .account_service
        .forgot_password(&caller, &req.email)
        .await?;
    Ok(Acknowledgement::new(
        "If an account exists for this email, a reset link has been sent",
    ))
}

async fn reset_password(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(input): Json<ResetPasswordInput>,
) -> AppResult<ApiResponse<Acknowledgement>> {
    state.account_service.reset_password(&caller, input).await?;
    Ok(Acknowledgement::new("Password has been reset"))
}

async fn change_password(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(input): Json<ChangePasswordInput>,
) -> AppResult<ApiResponse<Acknowledgement>> {
    state.account_service.change_password(&caller, input).await?;
    Ok(Acknowledgement::new("Password changed"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/google", post(google))
        .route("/apple", post(apple))
        .route("/logout", post(logout))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/change-password", post(change_password))
}
