//! API middleware and shared application state.

#![allow(missing_docs)]

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chorus_common::Config;
use chorus_core::{
    AccountService, AppleIdentityProvider, AuthFailure, Caller, CommentService, CredentialService,
    EventBus, FanoutService, FollowingService, GoogleIdentityProvider, IdentityResolver,
    LikeService, ModerationService, NotificationService, PostService, PushNotificationService,
    ReportService, SubscriptionService, SystemService, bearer_token, sender_from_config,
};
use chorus_db::repositories::{
    CommentRepository, FollowingRepository, NotificationRepository,
    NotificationSettingRepository, PasswordResetRepository, PostLikeRepository, PostRepository,
    PushTokenRepository, ReportRepository, SystemLogRepository, UserRepository,
};
use sea_orm::DatabaseConnection;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub identity_resolver: IdentityResolver,
    pub account_service: AccountService,
    pub following_service: FollowingService,
    pub post_service: PostService,
    pub like_service: LikeService,
    pub comment_service: CommentService,
    pub report_service: ReportService,
    pub notification_service: NotificationService,
    pub push_service: PushNotificationService,
    pub moderation_service: ModerationService,
    pub system_service: SystemService,
    pub subscription_service: SubscriptionService,
}

impl AppState {
    /// Wire every service over one connection pool and one event bus.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, bus: EventBus, config: &Config) -> Self {
        let user_repo = UserRepository::new(Arc::clone(&db));
        let post_repo = PostRepository::new(Arc::clone(&db));
        let following_repo = FollowingRepository::new(Arc::clone(&db));
        let like_repo = PostLikeRepository::new(Arc::clone(&db));
        let comment_repo = CommentRepository::new(Arc::clone(&db));
        let notification_repo = NotificationRepository::new(Arc::clone(&db));
        let report_repo = ReportRepository::new(Arc::clone(&db));

        let fanout = FanoutService::new(
            bus.clone(),
            notification_repo.clone(),
            following_repo.clone(),
        );
        let credentials = CredentialService::from_config(&config.auth);

        let mut account_service = AccountService::new(
            user_repo.clone(),
            following_repo.clone(),
            post_repo.clone(),
            PasswordResetRepository::new(Arc::clone(&db)),
            credentials.clone(),
            fanout.clone(),
            chrono::Duration::minutes(config.auth.password_reset_ttl_minutes),
        );
        if let Some(ref client_id) = config.auth.google_client_id {
            account_service = account_service
                .with_identity_provider(Arc::new(GoogleIdentityProvider::new(client_id)));
        }
        if let Some(ref client_id) = config.auth.apple_client_id {
            account_service = account_service
                .with_identity_provider(Arc::new(AppleIdentityProvider::new(client_id)));
        }

        let post_service = PostService::new(
            post_repo.clone(),
            like_repo.clone(),
            comment_repo.clone(),
            following_repo.clone(),
            fanout.clone(),
        );

        Self {
            identity_resolver: IdentityResolver::new(credentials, user_repo.clone()),
            following_service: FollowingService::new(
                following_repo.clone(),
                user_repo.clone(),
                fanout.clone(),
            ),
            like_service: LikeService::new(like_repo, post_service.clone(), fanout.clone()),
            comment_service: CommentService::new(comment_repo, post_service.clone(), fanout.clone()),
            report_service: ReportService::new(
                report_repo.clone(),
                post_service.clone(),
                fanout.clone(),
            ),
            notification_service: NotificationService::new(notification_repo),
            push_service: PushNotificationService::new(
                PushTokenRepository::new(Arc::clone(&db)),
                NotificationSettingRepository::new(Arc::clone(&db)),
                sender_from_config(&config.push),
                fanout.clone(),
            ),
            moderation_service: ModerationService::new(
                user_repo,
                post_repo,
                report_repo,
                SystemLogRepository::new(Arc::clone(&db)),
                fanout.clone(),
            ),
            system_service: SystemService::new(db, fanout, config.maintenance.clone()),
            subscription_service: SubscriptionService::new(
                bus,
                following_repo,
                post_service.clone(),
            ),
            account_service,
            post_service,
        }
    }
}

/// Authentication middleware.
///
/// Resolves the `Authorization` header into a [`Caller`] request extension.
/// A header that is not a bearer credential counts as an invalid one.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().ok().and_then(bearer_token).map(str::to_string));

    let caller = match header {
        None => Caller::Anonymous,
        Some(None) => Caller::Rejected(AuthFailure::InvalidCredential),
        Some(Some(token)) => {
            match state
                .identity_resolver
                .resolve_caller(Some(token.as_str()))
                .await
            {
                Ok(caller) => caller,
                Err(e) => return e.into_response(),
            }
        }
    };

    req.extensions_mut().insert(caller);
    next.run(req).await
}
