//! Business logic services.

#![allow(missing_docs)]

pub mod account;
pub mod comment;
pub mod event_bus;
pub mod fanout;
pub mod following;
pub mod guard;
pub mod identity;
pub mod like;
pub mod moderation;
pub mod notification;
pub mod post;
pub mod push_notification;
pub mod report;
pub mod social_auth;
pub mod subscription;
pub mod system;

pub use account::{
    AccountService, AuthPayload, ChangePasswordInput, LoginInput, RegisterInput,
    ResetPasswordInput, UpdateProfileInput, UserProfile,
};
pub use comment::{CommentService, CreateCommentInput};
pub use event_bus::{
    AcceptAll, AlertLevel, Delivery, Event, EventBus, EventFilter, EventPayload, FollowsAuthor,
    PostIs, PublishOutcome, RecipientIs, SubscriberContext, SubscriptionHandle, SubscriptionId,
    Topic,
};
pub use fanout::{FanoutReport, FanoutService};
pub use following::FollowingService;
pub use guard::{Gate, gates, guarded, require};
pub use identity::{
    AuthFailure, Caller, Claims, CredentialService, Identity, IdentityResolver, IssuedCredential,
    Principal, bearer_token,
};
pub use like::{LikeService, LikeToggle};
pub use moderation::{
    AdminStats, BlockUserInput, ModeratePostInput, ModerationService, ReportResolution,
    ResolveReportInput, UserPage,
};
pub use notification::NotificationService;
pub use post::{CreatePostInput, PostService, PostView, UpdatePostInput};
pub use push_notification::{
    ExpoPushSender, LoggingPushSender, PushMessage, PushNotificationService, PushSendResult,
    PushSender, PushSenderService, RegisterPushTokenInput, SendPushInput, sender_from_config,
};
pub use report::{ReportPostInput, ReportService};
pub use social_auth::{
    AppleIdentityProvider, GoogleIdentityProvider, IdentityProvider, IdentityProviderService,
    Provider, ProviderIdentity,
};
pub use subscription::{StreamChannel, SubscriptionService};
pub use system::{
    CreateAdminInput, DatabaseStats, MaintenanceNotice, MaintenanceState, OptimizeReport,
    PerformanceMetrics, SystemHealth, SystemInfo, SystemService,
};
