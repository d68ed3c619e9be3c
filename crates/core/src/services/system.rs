//! System owner operations: administrators, maintenance and store upkeep.

use std::sync::Arc;
use std::time::Instant;

use chorus_common::{AppError, AppResult, IdGenerator, config::MaintenanceConfig};
use chorus_db::{
    entities::{
        report::ReportStatus,
        system_log::{self, LogType},
        user::{self, Role, UserStatus},
    },
    repositories::{
        CommentRepository, FollowingRepository, NotificationRepository, PostLikeRepository,
        PostRepository, PushTokenRepository, ReportRepository, SystemLogRepository,
        SystemSettingRepository, UserRepository,
    },
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{DatabaseConnection, Set};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use validator::Validate;

use super::account::hash_password;
use super::event_bus::AlertLevel;
use super::fanout::FanoutService;
use super::guard::{gates, require};
use super::identity::{Caller, Principal};

/// Setting key holding the maintenance flag.
pub const MAINTENANCE_SETTING: &str = "maintenance_mode";

/// Input for creating an administrator.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 3, max = 30))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[serde(default = "default_admin_role")]
    pub role: Role,
}

const fn default_admin_role() -> Role {
    Role::Admin
}

/// Stored maintenance flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceState {
    pub enabled: bool,
    pub message: Option<String>,
    pub set_by: String,
    pub set_at: DateTime<Utc>,
}

/// Maintenance flag as shown to any caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceNotice {
    pub enabled: bool,
    pub message: Option<String>,
    pub since: DateTime<Utc>,
}

impl From<MaintenanceState> for MaintenanceNotice {
    fn from(state: MaintenanceState) -> Self {
        Self {
            enabled: state.enabled,
            message: state.message,
            since: state.set_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeReport {
    pub deleted_logs: u64,
    pub deleted_posts: u64,
    pub lifted_blocks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemHealth {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub user_count: u64,
    pub admin_count: u64,
    pub post_count: u64,
    pub pending_reports: u64,
    pub system_health: SystemHealth,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStats {
    pub table: &'static str,
    pub rows: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub tables: Vec<TableStats>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub uptime_seconds: u64,
    pub live_subscriptions: usize,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// System owner service.
#[derive(Clone)]
pub struct SystemService {
    db: Arc<DatabaseConnection>,
    user_repo: UserRepository,
    post_repo: PostRepository,
    report_repo: ReportRepository,
    log_repo: SystemLogRepository,
    setting_repo: SystemSettingRepository,
    fanout: FanoutService,
    maintenance: MaintenanceConfig,
    started_at: Instant,
    id_gen: IdGenerator,
}

impl SystemService {
    /// Create a new system service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        fanout: FanoutService,
        maintenance: MaintenanceConfig,
    ) -> Self {
        Self {
            user_repo: UserRepository::new(Arc::clone(&db)),
            post_repo: PostRepository::new(Arc::clone(&db)),
            report_repo: ReportRepository::new(Arc::clone(&db)),
            log_repo: SystemLogRepository::new(Arc::clone(&db)),
            setting_repo: SystemSettingRepository::new(Arc::clone(&db)),
            db,
            fanout,
            maintenance,
            started_at: Instant::now(),
            id_gen: IdGenerator::new(),
        }
    }

    /// Create an ADMIN or SUPER_ADMIN account.
    pub async fn create_admin(&self, caller: &Caller, input: CreateAdminInput) -> AppResult<user::Model> {
        let me = require(gates::CREATE_ADMIN, caller)?;
        input.validate()?;

        if !matches!(input.role, Role::Admin | Role::SuperAdmin) {
            return Err(AppError::BadRequest(
                "Role must be ADMIN or SUPER_ADMIN".to_string(),
            ));
        }

        let email = input.email.to_lowercase();
        let username = input.username.to_lowercase();
        if self.user_repo.find_by_email(&email).await?.is_some()
            || self.user_repo.find_by_username(&username).await?.is_some()
        {
            return Err(AppError::Conflict(
                "User with this email or username already exists".to_string(),
            ));
        }

        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            email: Set(Some(email)),
            username: Set(username),
            password_hash: Set(Some(hash_password(&input.password)?)),
            display_name: Set(None),
            bio: Set(None),
            avatar_url: Set(None),
            role: Set(input.role),
            status: Set(UserStatus::Active),
            email_verified: Set(true),
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

        let admin = match self.user_repo.create(model).await {
            Ok(admin) => admin,
            Err(AppError::ConstraintViolation(_)) => {
                return Err(AppError::Conflict(
                    "User with this email or username already exists".to_string(),
                ));
            }
            Err(e) => return Err(e),
        };

        self.log(
            &me,
            format!("New admin created: {}", admin.username),
            Some(&admin.id),
            Some(json!({ "role": admin.role, "email": admin.email })),
        )
        .await;
        self.fanout.admin_activity(
            "admin.created",
            me.id(),
            json!({ "userId": admin.id, "role": admin.role }),
        );

        tracing::info!(god = %me.id(), admin_id = %admin.id, role = admin.role.as_str(), "Admin created");
        Ok(admin)
    }

    /// Change another account's role. GOD cannot be granted.
    pub async fn update_admin_role(
        &self,
        caller: &Caller,
        user_id: &str,
        new_role: Role,
    ) -> AppResult<user::Model> {
        let me = require(gates::UPDATE_ADMIN_ROLE, caller)?;

        if me.id() == user_id {
            return Err(AppError::InvalidTarget(
                "Cannot change your own role".to_string(),
            ));
        }
        if new_role == Role::God {
            return Err(AppError::BadRequest("Cannot grant GOD".to_string()));
        }

        let target = self.user_repo.get_by_id(user_id).await?;
        if target.status == UserStatus::Deleted {
            return Err(AppError::NotFound(format!("User {user_id}")));
        }
        if target.role == Role::God {
            return Err(AppError::InvalidTarget(
                "Cannot change the role of a system owner".to_string(),
            ));
        }

        let previous = target.role;
        let mut active: user::ActiveModel = target.into();
        active.role = Set(new_role);
        active.updated_at = Set(Some(Utc::now().into()));
        let user = self.user_repo.update(active).await?;

        self.log(
            &me,
            format!("Admin role changed to {}", new_role.as_str()),
            Some(&user.id),
            Some(json!({ "previousRole": previous, "newRole": new_role })),
        )
        .await;
        self.fanout.admin_activity(
            "admin.role_changed",
            me.id(),
            json!({ "userId": user.id, "previousRole": previous, "newRole": new_role }),
        );

        Ok(user)
    }

    /// Record the maintenance flag and announce it.
    pub async fn set_maintenance_mode(
        &self,
        caller: &Caller,
        enabled: bool,
        message: Option<String>,
    ) -> AppResult<MaintenanceState> {
        let me = require(gates::MAINTENANCE_MODE, caller)?;

        let state = MaintenanceState {
            enabled,
            message,
            set_by: me.id().to_string(),
            set_at: Utc::now(),
        };
        let value = serde_json::to_value(&state)
            .map_err(|e| AppError::Internal(format!("Failed to encode maintenance state: {e}")))?;

        self.setting_repo
            .upsert(
                MAINTENANCE_SETTING,
                value,
                Some(me.id().to_string()),
                state.set_at.into(),
            )
            .await?;

        self.fanout
            .maintenance_changed(enabled, state.message.as_deref());
        self.fanout.system_alert(
            AlertLevel::Warning,
            &format!(
                "Maintenance mode {}",
                if enabled { "enabled" } else { "disabled" }
            ),
        );
        self.log(
            &me,
            format!("Maintenance mode {}", if enabled { "enabled" } else { "disabled" }),
            None,
            Some(json!({ "message": state.message })),
        )
        .await;

        tracing::warn!(god = %me.id(), enabled, "Maintenance mode changed");
        Ok(state)
    }

    /// The stored maintenance flag, if one was ever set.
    pub async fn maintenance_state(
        &self,
        caller: &Caller,
    ) -> AppResult<Option<MaintenanceNotice>> {
        gates::MAINTENANCE_STATE.check(caller)?;

        let Some(setting) = self.setting_repo.get(MAINTENANCE_SETTING).await? else {
            return Ok(None);
        };
        serde_json::from_value::<MaintenanceState>(setting.value)
            .map(|state| Some(state.into()))
            .map_err(|e| AppError::Internal(format!("Malformed maintenance state: {e}")))
    }

    /// Purge old system logs and removed posts, and lift expired blocks.
    pub async fn optimize_database(&self, caller: &Caller) -> AppResult<OptimizeReport> {
        let me = require(gates::OPTIMIZE_DATABASE, caller)?;

        let now = Utc::now();
        let log_cutoff = now - Duration::days(self.maintenance.log_retention_days);
        let post_cutoff = now - Duration::days(self.maintenance.deleted_post_retention_days);

        let report = OptimizeReport {
            deleted_logs: self.log_repo.purge_before(log_cutoff.into()).await?,
            deleted_posts: self.post_repo.purge_deleted_before(post_cutoff.into()).await?,
            lifted_blocks: self.user_repo.lift_expired_blocks(now.into()).await?,
        };

        self.log(
            &me,
            format!(
                "Database optimized. Deleted {} logs, {} posts",
                report.deleted_logs, report.deleted_posts
            ),
            None,
            Some(json!(report)),
        )
        .await;

        tracing::info!(
            deleted_logs = report.deleted_logs,
            deleted_posts = report.deleted_posts,
            lifted_blocks = report.lifted_blocks,
            "Database optimized"
        );
        Ok(report)
    }

    /// Headline counts and store health.
    pub async fn system_info(&self, caller: &Caller) -> AppResult<SystemInfo> {
        require(gates::SYSTEM_INFO, caller)?;

        let system_health = self.health().await;
        if system_health == SystemHealth::Unhealthy {
            self.fanout.critical_alert("Database health check failed");
        }

        Ok(SystemInfo {
            user_count: self.user_repo.count().await?,
            admin_count: self
                .user_repo
                .count_by_roles(&[Role::Admin, Role::SuperAdmin])
                .await?,
            post_count: self.post_repo.count().await?,
            pending_reports: self.report_repo.count_by_status(ReportStatus::Pending).await?,
            system_health,
            timestamp: Utc::now(),
        })
    }

    pub async fn admins(&self, caller: &Caller) -> AppResult<Vec<user::Model>> {
        require(gates::LIST_ADMINS, caller)?;
        self.user_repo
            .find_by_roles(&[Role::Admin, Role::SuperAdmin])
            .await
    }

    /// Row count per table.
    pub async fn database_stats(&self, caller: &Caller) -> AppResult<DatabaseStats> {
        require(gates::DATABASE_STATS, caller)?;

        let db = &self.db;
        let tables = vec![
            TableStats { table: "user", rows: self.user_repo.count().await? },
            TableStats { table: "post", rows: self.post_repo.count().await? },
            TableStats {
                table: "following",
                rows: FollowingRepository::new(Arc::clone(db)).count().await?,
            },
            TableStats {
                table: "post_like",
                rows: PostLikeRepository::new(Arc::clone(db)).count().await?,
            },
            TableStats {
                table: "comment",
                rows: CommentRepository::new(Arc::clone(db)).count().await?,
            },
            TableStats {
                table: "notification",
                rows: NotificationRepository::new(Arc::clone(db)).count().await?,
            },
            TableStats { table: "report", rows: self.report_repo.count().await? },
            TableStats {
                table: "push_token",
                rows: PushTokenRepository::new(Arc::clone(db)).count().await?,
            },
            TableStats { table: "system_log", rows: self.log_repo.count().await? },
        ];

        Ok(DatabaseStats {
            tables,
            timestamp: Utc::now(),
        })
    }

    pub async fn performance_metrics(&self, caller: &Caller) -> AppResult<PerformanceMetrics> {
        require(gates::PERFORMANCE_METRICS, caller)?;

        Ok(PerformanceMetrics {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            live_subscriptions: self.fanout.bus().subscription_count(),
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now(),
        })
    }

    async fn health(&self) -> SystemHealth {
        match self.db.ping().await {
            Ok(()) => SystemHealth::Healthy,
            Err(e) => {
                tracing::error!(error = %e, "Database ping failed");
                SystemHealth::Unhealthy
            }
        }
    }

    /// Append a GOD_ACTION entry. Failures are logged and swallowed.
    async fn log(
        &self,
        me: &Principal,
        action: String,
        target_user_id: Option<&str>,
        metadata: Option<Value>,
    ) {
        let entry = system_log::ActiveModel {
            id: Set(self.id_gen.generate()),
            log_type: Set(LogType::GodAction),
            action: Set(action),
            user_id: Set(Some(me.id().to_string())),
            target_user_id: Set(target_user_id.map(str::to_string)),
            metadata: Set(metadata),
            created_at: Set(Utc::now().into()),
        };

        if let Err(e) = self.log_repo.create(entry).await {
            tracing::warn!(error = %e, "Failed to write system log");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::event_bus::EventBus;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_user(id: &str, role: Role) -> user::Model {
        user::Model {
            id: id.to_string(),
            email: None,
            username: id.to_string(),
            password_hash: None,
            display_name: None,
            bio: None,
            avatar_url: None,
            role,
            status: UserStatus::Active,
            email_verified: false,
            google_id: None,
            apple_id: None,
            blocked_at: None,
            blocked_reason: None,
            blocked_by: None,
            blocked_until: None,
            last_active_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn service(db: DatabaseConnection) -> SystemService {
        let db = Arc::new(db);
        let fanout = FanoutService::new(
            EventBus::new(8),
            NotificationRepository::new(Arc::clone(&db)),
            FollowingRepository::new(Arc::clone(&db)),
        );
        SystemService::new(
            db,
            fanout,
            MaintenanceConfig {
                log_retention_days: 90,
                deleted_post_retention_days: 30,
            },
        )
    }

    fn caller(id: &str, role: Role) -> Caller {
        Caller::Authenticated(Principal::new(create_test_user(id, role)))
    }

    #[tokio::test]
    async fn test_create_admin_rejects_god_role() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let result = service(db)
            .create_admin(
                &caller("god", Role::God),
                CreateAdminInput {
                    email: "new@example.com".to_string(),
                    username: "newadmin".to_string(),
                    password: "password123".to_string(),
                    role: Role::God,
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_admin_cannot_use_owner_operations() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let service = service(db);
        let admin = caller("admin", Role::Admin);

        assert!(matches!(
            service.system_info(&admin).await,
            Err(AppError::InsufficientPermissions)
        ));
        assert!(matches!(
            service.set_maintenance_mode(&admin, true, None).await,
            Err(AppError::InsufficientPermissions)
        ));
        assert!(matches!(
            service.optimize_database(&admin).await,
            Err(AppError::InsufficientPermissions)
        ));
    }

    #[tokio::test]
    async fn test_maintenance_state_hides_operator() {
        let stored = chorus_db::entities::system_setting::Model {
            key: MAINTENANCE_SETTING.to_string(),
            value: json!({
                "enabled": true,
                "message": "Upgrading",
                "setBy": "god",
                "setAt": "2026-01-01T00:00:00Z"
            }),
            updated_by: Some("god".to_string()),
            updated_at: Utc::now().into(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[stored]])
            .into_connection();

        let notice = service(db)
            .maintenance_state(&Caller::Anonymous)
            .await
            .unwrap()
            .unwrap();
        let body = serde_json::to_value(&notice).unwrap();

        assert!(notice.enabled);
        assert_eq!(body["message"], "Upgrading");
        assert!(body.get("setBy").is_none());
    }

    #[tokio::test]
    async fn test_blocked_caller_cannot_read_maintenance_state() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let mut blocked = create_test_user("u1", Role::User);
        blocked.status = UserStatus::Blocked;

        let result = service(db)
            .maintenance_state(&Caller::Authenticated(Principal::new(blocked)))
            .await;

        assert!(matches!(result, Err(AppError::AccountBlocked)));
    }

    #[tokio::test]
    async fn test_update_own_role_is_invalid_target() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let result = service(db)
            .update_admin_role(&caller("god", Role::God), "god", Role::Admin)
            .await;

        assert!(matches!(result, Err(AppError::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn test_performance_metrics_counts_live_subscriptions() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let metrics = service(db)
            .performance_metrics(&caller("god", Role::God))
            .await
            .unwrap();

        assert_eq!(metrics.live_subscriptions, 0);
    }
}
