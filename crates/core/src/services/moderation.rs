//! Moderation service.
//!
//! Moderators act on accounts, posts and reports. Every action is written to
//! the system log and announced on the admin topics.

use chorus_common::{AppError, AppResult, IdGenerator};
use chorus_db::{
    entities::{
        post::{self, PostStatus},
        report::{self, ReportAction, ReportStatus},
        system_log::{self, LogType},
        user::{self, Role, UserStatus},
    },
    repositories::{PostRepository, ReportRepository, SystemLogRepository, UserRepository, UserSearch},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use validator::Validate;

use super::fanout::FanoutService;
use super::guard::{gates, require};
use super::identity::{Caller, Principal};

const MAX_PAGE: u64 = 100;

/// Input for blocking an account.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BlockUserInput {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
    /// Block length in days; indefinite when absent.
    #[validate(range(min = 1, max = 3650))]
    pub duration_days: Option<i64>,
}

/// Input for removing a post.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModeratePostInput {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Final state a moderator gives a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportResolution {
    #[default]
    Resolved,
    Dismissed,
}

/// Input for resolving a report.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReportInput {
    #[serde(default)]
    pub resolution: ReportResolution,
    pub action: Option<ReportAction>,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

/// Admin dashboard counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub user_count: u64,
    pub post_count: u64,
    /// Accounts seen in the last 24 hours.
    pub active_users: u64,
    pub pending_reports: u64,
    pub timestamp: DateTime<Utc>,
}

/// One page of an account listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub users: Vec<user::Model>,
    pub page: u64,
    pub limit: u64,
    pub has_more: bool,
}

/// Moderation service for business logic.
#[derive(Clone)]
pub struct ModerationService {
    user_repo: UserRepository,
    post_repo: PostRepository,
    report_repo: ReportRepository,
    log_repo: SystemLogRepository,
    fanout: FanoutService,
    id_gen: IdGenerator,
}

impl ModerationService {
    /// Create a new moderation service.
    #[must_use]
    pub const fn new(
        user_repo: UserRepository,
        post_repo: PostRepository,
        report_repo: ReportRepository,
        log_repo: SystemLogRepository,
        fanout: FanoutService,
    ) -> Self {
        Self {
            user_repo,
            post_repo,
            report_repo,
            log_repo,
            fanout,
            id_gen: IdGenerator::new(),
        }
    }

    /// Block an account, optionally for a number of days.
    pub async fn block_user(
        &self,
        caller: &Caller,
        user_id: &str,
        input: BlockUserInput,
    ) -> AppResult<user::Model> {
        let me = require(gates::BLOCK_USER, caller)?;
        input.validate()?;

        let target = self.user_repo.get_by_id(user_id).await?;
        self.apply_block(&me, target, input.reason.as_deref(), input.duration_days)
            .await
    }

    /// Lift a block.
    pub async fn unblock_user(&self, caller: &Caller, user_id: &str) -> AppResult<user::Model> {
        let me = require(gates::UNBLOCK_USER, caller)?;
        let target = self.user_repo.get_by_id(user_id).await?;

        let mut active: user::ActiveModel = target.into();
        active.status = Set(UserStatus::Active);
        active.blocked_at = Set(None);
        active.blocked_reason = Set(None);
        active.blocked_by = Set(None);
        active.blocked_until = Set(None);
        active.updated_at = Set(Some(Utc::now().into()));
        let user = self.user_repo.update(active).await?;

        self.log(
            &me,
            format!("User {} unblocked", user.username),
            Some(&user.id),
            None,
        )
        .await;
        self.fanout.user_status_changed(&user, Some(me.user()), None);
        self.fanout.admin_activity(
            "user.unblocked",
            me.id(),
            json!({ "userId": user.id }),
        );

        tracing::info!(moderator = %me.id(), user_id = %user.id, "User unblocked");
        Ok(user)
    }

    /// Remove a post on moderation grounds.
    pub async fn delete_post(
        &self,
        caller: &Caller,
        post_id: &str,
        input: ModeratePostInput,
    ) -> AppResult<()> {
        let me = require(gates::MODERATE_POST, caller)?;
        input.validate()?;

        let post = self.post_repo.get_visible(post_id).await?;
        self.apply_post_removal(&me, post, input.reason.as_deref())
            .await?;
        Ok(())
    }

    /// Close a pending report, applying its action first.
    pub async fn resolve_report(
        &self,
        caller: &Caller,
        report_id: &str,
        input: ResolveReportInput,
    ) -> AppResult<report::Model> {
        let me = require(gates::RESOLVE_REPORT, caller)?;
        input.validate()?;

        let report = self.report_repo.get_by_id(report_id).await?;
        if report.status != ReportStatus::Pending {
            return Err(AppError::Conflict(format!("Report {report_id} is already closed")));
        }

        match input.action {
            Some(ReportAction::BlockUser) => {
                let target = self.user_repo.get_by_id(&report.reported_user_id).await?;
                let reason = format!("Reported: {}", reason_label(&report));
                self.apply_block(&me, target, Some(&reason), None).await?;
            }
            Some(ReportAction::DeletePost) => match self.post_repo.find_by_id(&report.post_id).await? {
                Some(post) if !post.is_deleted() => {
                    let reason = format!("Reported: {}", reason_label(&report));
                    self.apply_post_removal(&me, post, Some(&reason)).await?;
                }
                _ => tracing::debug!(post_id = %report.post_id, "Reported post already gone"),
            },
            Some(ReportAction::NoAction) | None => {}
        }

        let status = match input.resolution {
            ReportResolution::Resolved => ReportStatus::Resolved,
            ReportResolution::Dismissed => ReportStatus::Dismissed,
        };

        let mut active: report::ActiveModel = report.into();
        active.status = Set(status);
        active.action = Set(input.action);
        active.admin_note = Set(input.note);
        active.resolved_by = Set(Some(me.id().to_string()));
        active.resolved_at = Set(Some(Utc::now().into()));
        let report = self.report_repo.update(active).await?;

        self.log(
            &me,
            format!("Report {} closed", report.id),
            Some(&report.reported_user_id),
            Some(json!({ "reportId": report.id, "status": status, "action": input.action })),
        )
        .await;
        self.fanout.admin_activity(
            "report.resolved",
            me.id(),
            json!({ "reportId": report.id, "action": input.action }),
        );

        Ok(report)
    }

    pub async fn stats(&self, caller: &Caller) -> AppResult<AdminStats> {
        require(gates::ADMIN_STATS, caller)?;

        let now = Utc::now();
        Ok(AdminStats {
            user_count: self.user_repo.count().await?,
            post_count: self.post_repo.count().await?,
            active_users: self
                .user_repo
                .count_active_since((now - Duration::hours(24)).into())
                .await?,
            pending_reports: self.report_repo.count_by_status(ReportStatus::Pending).await?,
            timestamp: now,
        })
    }

    /// Page through accounts. `page` starts at 1.
    pub async fn users(
        &self,
        caller: &Caller,
        search: UserSearch,
        page: u64,
        limit: u64,
    ) -> AppResult<UserPage> {
        require(gates::ADMIN_USERS, caller)?;

        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE);
        let mut users = self
            .user_repo
            .search(&search, limit + 1, (page - 1) * limit)
            .await?;

        let has_more = users.len() as u64 > limit;
        users.truncate(limit as usize);

        Ok(UserPage {
            users,
            page,
            limit,
            has_more,
        })
    }

    /// Reports in one state, pending by default.
    pub async fn reports(
        &self,
        caller: &Caller,
        status: Option<ReportStatus>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<report::Model>> {
        require(gates::ADMIN_REPORTS, caller)?;
        self.report_repo
            .find_by_status(
                Some(status.unwrap_or(ReportStatus::Pending)),
                limit.clamp(1, MAX_PAGE),
                offset,
            )
            .await
    }

    pub async fn logs(
        &self,
        caller: &Caller,
        log_type: Option<LogType>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<system_log::Model>> {
        require(gates::ADMIN_LOGS, caller)?;
        self.log_repo
            .find_recent(log_type, limit.clamp(1, MAX_PAGE), offset)
            .await
    }

    async fn apply_block(
        &self,
        me: &Principal,
        target: user::Model,
        reason: Option<&str>,
        duration_days: Option<i64>,
    ) -> AppResult<user::Model> {
        if target.id == me.id() {
            return Err(AppError::InvalidTarget("Cannot block yourself".to_string()));
        }
        if target.status == UserStatus::Deleted {
            return Err(AppError::NotFound(format!("User {}", target.id)));
        }

        let now = Utc::now();
        let mut active: user::ActiveModel = target.into();
        active.status = Set(UserStatus::Blocked);
        active.blocked_at = Set(Some(now.into()));
        active.blocked_reason = Set(reason.map(str::to_string));
        active.blocked_by = Set(Some(me.id().to_string()));
        active.blocked_until = Set(duration_days.map(|days| (now + Duration::days(days)).into()));
        active.updated_at = Set(Some(now.into()));
        let user = self.user_repo.update(active).await?;

        self.log(
            me,
            format!("User {} blocked", user.username),
            Some(&user.id),
            Some(json!({ "reason": reason, "durationDays": duration_days })),
        )
        .await;
        self.fanout.user_blocked(&user, me.user(), reason).await;
        self.fanout.admin_activity(
            "user.blocked",
            me.id(),
            json!({ "userId": user.id, "reason": reason, "durationDays": duration_days }),
        );

        tracing::info!(moderator = %me.id(), user_id = %user.id, "User blocked");
        Ok(user)
    }

    async fn apply_post_removal(
        &self,
        me: &Principal,
        post: post::Model,
        reason: Option<&str>,
    ) -> AppResult<post::Model> {
        let now = Utc::now();
        let mut active: post::ActiveModel = post.into();
        active.status = Set(PostStatus::Deleted);
        active.deleted_at = Set(Some(now.into()));
        active.deleted_by = Set(Some(me.id().to_string()));
        active.deleted_reason = Set(reason.map(str::to_string));
        active.updated_at = Set(Some(now.into()));
        let post = self.post_repo.update(active).await?;

        self.log(
            me,
            format!("Post {} removed", post.id),
            Some(&post.author_id),
            Some(json!({ "postId": post.id, "reason": reason })),
        )
        .await;
        self.fanout.post_deleted(&post, me.user(), reason).await;
        self.fanout.admin_activity(
            "post.removed",
            me.id(),
            json!({ "postId": post.id, "reason": reason }),
        );

        tracing::info!(moderator = %me.id(), post_id = %post.id, "Post removed");
        Ok(post)
    }

    /// Append to the system log. Failures are logged and swallowed.
    async fn log(
        &self,
        me: &Principal,
        action: String,
        target_user_id: Option<&str>,
        metadata: Option<Value>,
    ) {
        let log_type = if me.role() == Role::God {
            LogType::GodAction
        } else {
            LogType::AdminAction
        };

        let entry = system_log::ActiveModel {
            id: Set(self.id_gen.generate()),
            log_type: Set(log_type),
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

fn reason_label(report: &report::Model) -> String {
    serde_json::to_value(report.reason)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "OTHER".to_string())
}
