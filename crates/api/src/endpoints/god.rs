//! System owner endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch, post},
};
use chorus_common::AppResult;
use chorus_core::{
    CreateAdminInput, DatabaseStats, MaintenanceNotice, MaintenanceState, OptimizeReport,
    PerformanceMetrics, SystemInfo,
};
use chorus_db::entities::user::{self, Role};
use serde::Deserialize;

use crate::{extractors::CallerContext, middleware::AppState, response::ApiResponse};

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceRequest {
    pub enabled: bool,
    pub message: Option<String>,
}

async fn create_admin(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(input): Json<CreateAdminInput>,
) -> AppResult<ApiResponse<user::Model>> {
    let admin = state.system_service.create_admin(&caller, input).await?;
    Ok(ApiResponse::created(admin))
}

async fn admins(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<user::Model>>> {
    Ok(ApiResponse::ok(state.system_service.admins(&caller).await?))
}

async fn update_role(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> AppResult<ApiResponse<user::Model>> {
    let user = state
        .system_service
        .update_admin_role(&caller, &user_id, req.role)
        .await?;
    Ok(ApiResponse::ok(user))
}

/// Current maintenance state; readable by anyone.
async fn maintenance(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Option<MaintenanceNotice>>> {
    Ok(ApiResponse::ok(
        state.system_service.maintenance_state(&caller).await?,
    ))
}

async fn set_maintenance(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
    Json(req): Json<MaintenanceRequest>,
) -> AppResult<ApiResponse<MaintenanceState>> {
    let maintenance = state
        .system_service
        .set_maintenance_mode(&caller, req.enabled, req.message)
        .await?;
    Ok(ApiResponse::ok(maintenance))
}

async fn optimize(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<OptimizeReport>> {
    Ok(ApiResponse::ok(
        state.system_service.optimize_database(&caller).await?,
    ))
}

async fn system_info(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<SystemInfo>> {
    Ok(ApiResponse::ok(state.system_service.system_info(&caller).await?))
}

async fn database_stats(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<DatabaseStats>> {
    Ok(ApiResponse::ok(
        state.system_service.database_stats(&caller).await?,
    ))
}

async fn performance(
    CallerContext(caller): CallerContext,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<PerformanceMetrics>> {
    Ok(ApiResponse::ok(
        state.system_service.performance_metrics(&caller).await?,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admins", get(admins).post(create_admin))
        .route("/admins/{id}/role", patch(update_role))
        .route("/maintenance", get(maintenance).post(set_maintenance))
        .route("/optimize", post(optimize))
        .route("/system-info", get(system_info))
        .route("/database-stats", get(database_stats))
        .route("/performance", get(performance))
}
