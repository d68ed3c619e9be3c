//! Report service.

use chorus_common::{AppError, AppResult, IdGenerator};
use chorus_db::{
    entities::report::{self, ReportReason, ReportStatus},
    repositories::ReportRepository,
};
use chrono::Utc;
use sea_orm::Set;
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use super::fanout::FanoutService;
use super::guard::{gates, require};
use super::identity::Caller;
use super::post::PostService;

/// Input for reporting a post.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportPostInput {
    pub reason: ReportReason,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

/// Report service for business logic.
#[derive(Clone)]
pub struct ReportService {
    report_repo: ReportRepository,
    post_service: PostService,
    fanout: FanoutService,
    id_gen: IdGenerator,
}

impl ReportService {
    /// Create a new report service.
    #[must_use]
    pub const fn new(
        report_repo: ReportRepository,
        post_service: PostService,
        fanout: FanoutService,
    ) -> Self {
        Self {
            report_repo,
            post_service,
            fanout,
            id_gen: IdGenerator::new(),
        }
    }

    /// File a report against a post. Each reporter may report a post once.
    pub async fn report_post(
        &self,
        caller: &Caller,
        post_id: &str,
        input: ReportPostInput,
    ) -> AppResult<report::Model> {
        let me = require(gates::REPORT_POST, caller)?;
        input.validate()?;

        let post = self.post_service.visible_post(Some(&me), post_id).await?;
        if post.author_id == me.id() {
            return Err(AppError::InvalidTarget(
                "Cannot report your own post".to_string(),
            ));
        }

        if self.report_repo.find_by_pair(me.id(), &post.id).await?.is_some() {
            return Err(AppError::AlreadyReported);
        }

        let model = report::ActiveModel {
            id: Set(self.id_gen.generate()),
            reporter_id: Set(me.id().to_string()),
            post_id: Set(post.id.clone()),
            reported_user_id: Set(post.author_id.clone()),
            reason: Set(input.reason),
            description: Set(input.description),
            status: Set(ReportStatus::Pending),
            action: Set(None),
            admin_note: Set(None),
            resolved_by: Set(None),
            resolved_at: Set(None),
            created_at: Set(Utc::now().into()),
        };

        let report = match self.report_repo.create(model).await {
            Ok(report) => report,
            Err(AppError::ConstraintViolation(_)) => return Err(AppError::AlreadyReported),
            Err(e) => return Err(e),
        };

        self.fanout.new_report(&report);
        self.fanout.system_activity(
            "post.reported",
            Some(me.id()),
            json!({ "reportId": report.id, "postId": report.post_id }),
        );

        tracing::info!(report_id = %report.id, post_id = %report.post_id, "Post reported");
        Ok(report)
    }
}
