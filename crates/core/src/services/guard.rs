//! Authorization guard.
//!
//! Every operation declares one [`Gate`]. The gate is checked before the
//! operation body runs, so a rejected caller never causes a side effect.
//! Role gates are literal sets: holding a "higher" role grants nothing that
//! the set does not name.

use std::future::Future;

use chorus_common::{AppError, AppResult};
use chorus_db::entities::user::{Role, UserStatus};
use tracing::debug;

use super::identity::{Caller, Principal};

/// Access requirement of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Anyone, including anonymous callers.
    Public,
    /// Any authenticated principal.
    Authenticated,
    /// A principal whose role is a member of the set.
    Roles(&'static [Role]),
}

impl Gate {
    /// Check a caller against this gate.
    ///
    /// Returns the principal to run the operation with, or `None` for an
    /// anonymous caller of a public operation. A blocked principal is
    /// rejected by every gate, public ones included, before any role check.
    pub fn check(&self, caller: &Caller) -> AppResult<Option<Principal>> {
        match caller {
            Caller::Authenticated(principal) => {
                match principal.status() {
                    UserStatus::Blocked => return Err(AppError::AccountBlocked),
                    UserStatus::Deleted => return Err(AppError::PrincipalNotFound),
                    UserStatus::Active | UserStatus::Pending => {}
                }
                if !self.admits(principal.role()) {
                    debug!(
                        user_id = %principal.id(),
                        role = principal.role().as_str(),
                        "Role not admitted by gate"
                    );
                    return Err(AppError::InsufficientPermissions);
                }
                Ok(Some(principal.clone()))
            }
            Caller::Anonymous if self.is_public() => Ok(None),
            Caller::Anonymous => Err(AppError::AuthenticationRequired),
            // A stale credential does not lock the caller out of public operations
            Caller::Rejected(_) if self.is_public() => Ok(None),
            Caller::Rejected(failure) => Err((*failure).into()),
        }
    }

    /// Whether a principal with `role` passes this gate's role check.
    #[must_use]
    pub fn admits(&self, role: Role) -> bool {
        match self {
            Self::Public | Self::Authenticated => true,
            Self::Roles(roles) => roles.is_empty() || roles.contains(&role),
        }
    }

    /// Whether anonymous callers pass. An empty role set names no requirement.
    #[must_use]
    pub const fn is_public(&self) -> bool {
        match self {
            Self::Public => true,
            Self::Authenticated => false,
            Self::Roles(roles) => roles.is_empty(),
        }
    }
}

/// Check a gate that must yield a principal.
pub fn require(gate: Gate, caller: &Caller) -> AppResult<Principal> {
    gate.check(caller)?.ok_or(AppError::AuthenticationRequired)
}

/// Run `op` with the principal once `gate` admits the caller.
pub async fn guarded<T, F, Fut>(gate: Gate, caller: &Caller, op: F) -> AppResult<T>
where
    F: FnOnce(Principal) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let principal = require(gate, caller)?;
    op(principal).await
}

/// Per-operation gates.
pub mod gates {
    use super::Gate;
    use chorus_db::entities::user::Role;

    /// Moderators of user content.
    pub const MODERATORS: &[Role] = &[Role::Admin, Role::SuperAdmin, Role::God];
    /// The admin console.
    pub const ADMIN_ONLY: &[Role] = &[Role::Admin];
    /// The system owner console.
    pub const GOD_ONLY: &[Role] = &[Role::God];

    // Account
    pub const REGISTER: Gate = Gate::Public;
    pub const LOGIN: Gate = Gate::Public;
    pub const SOCIAL_SIGN_IN: Gate = Gate::Public;
    pub const LOGOUT: Gate = Gate::Authenticated;
    pub const FORGOT_PASSWORD: Gate = Gate::Public;
    pub const RESET_PASSWORD: Gate = Gate::Public;
    pub const CHANGE_PASSWORD: Gate = Gate::Authenticated;
    pub const UPDATE_PROFILE: Gate = Gate::Authenticated;
    pub const ME: Gate = Gate::Authenticated;
    pub const USER_PROFILE: Gate = Gate::Public;
    pub const SEARCH_USERS: Gate = Gate::Public;

    // Social graph
    pub const FOLLOW: Gate = Gate::Authenticated;
    pub const UNFOLLOW: Gate = Gate::Authenticated;
    pub const LIST_FOLLOWS: Gate = Gate::Public;

    // Posts
    pub const CREATE_POST: Gate = Gate::Authenticated;
    pub const UPDATE_POST: Gate = Gate::Authenticated;
    pub const DELETE_POST: Gate = Gate::Authenticated;
    pub const GET_POST: Gate = Gate::Public;
    pub const FEED: Gate = Gate::Authenticated;
    pub const EXPLORE: Gate = Gate::Public;
    pub const SEARCH_POSTS: Gate = Gate::Public;
    pub const TOGGLE_LIKE: Gate = Gate::Authenticated;
    pub const COMMENT: Gate = Gate::Authenticated;
    pub const LIST_COMMENTS: Gate = Gate::Public;
    pub const REPORT_POST: Gate = Gate::Authenticated;

    // Notifications and push
    pub const NOTIFICATIONS: Gate = Gate::Authenticated;
    pub const REGISTER_PUSH_TOKEN: Gate = Gate::Authenticated;
    pub const PUSH_SETTINGS: Gate = Gate::Authenticated;
    pub const SEND_PUSH: Gate = Gate::Roles(MODERATORS);
    pub const TEST_PUSH: Gate = Gate::Authenticated;

    // Moderation
    pub const BLOCK_USER: Gate = Gate::Roles(MODERATORS);
    pub const UNBLOCK_USER: Gate = Gate::Roles(MODERATORS);
    pub const MODERATE_POST: Gate = Gate::Roles(MODERATORS);
    pub const RESOLVE_REPORT: Gate = Gate::Roles(MODERATORS);
    pub const ADMIN_STATS: Gate = Gate::Roles(ADMIN_ONLY);
    pub const ADMIN_USERS: Gate = Gate::Roles(ADMIN_ONLY);
    pub const ADMIN_REPORTS: Gate = Gate::Roles(ADMIN_ONLY);
    pub const ADMIN_LOGS: Gate = Gate::Roles(ADMIN_ONLY);

    // System owner
    pub const CREATE_ADMIN: Gate = Gate::Roles(GOD_ONLY);
    pub const UPDATE_ADMIN_ROLE: Gate = Gate::Roles(GOD_ONLY);
    pub const MAINTENANCE_MODE: Gate = Gate::Roles(GOD_ONLY);
    pub const MAINTENANCE_STATE: Gate = Gate::Public;
    pub const OPTIMIZE_DATABASE: Gate = Gate::Roles(GOD_ONLY);
    pub const SYSTEM_INFO: Gate = Gate::Roles(GOD_ONLY);
    pub const LIST_ADMINS: Gate = Gate::Roles(GOD_ONLY);
    pub const DATABASE_STATS: Gate = Gate::Roles(GOD_ONLY);
    pub const PERFORMANCE_METRICS: Gate = Gate::Roles(GOD_ONLY);

    // Streaming channels
    pub const STREAM_NOTIFICATIONS: Gate = Gate::Authenticated;
    pub const STREAM_FOLLOWING_POSTS: Gate = Gate::Authenticated;
    pub const STREAM_POST_ACTIVITY: Gate = Gate::Public;
    pub const STREAM_PUSH_STATUS: Gate = Gate::Authenticated;
    pub const STREAM_MAINTENANCE: Gate = Gate::Authenticated;
    pub const STREAM_ADMIN: Gate = Gate::Roles(ADMIN_ONLY);
    pub const STREAM_OWNER: Gate = Gate::Roles(GOD_ONLY);

    /// Every operation with its gate.
    pub const CATALOGUE: &[(&str, Gate)] = &[
        ("register", REGISTER),
        ("login", LOGIN),
        ("socialSignIn", SOCIAL_SIGN_IN),
        ("logout", LOGOUT),
        ("forgotPassword", FORGOT_PASSWORD),
        ("resetPassword", RESET_PASSWORD),
        ("changePassword", CHANGE_PASSWORD),
        ("updateProfile", UPDATE_PROFILE),
        ("me", ME),
        ("userProfile", USER_PROFILE),
        ("searchUsers", SEARCH_USERS),
        ("follow", FOLLOW),
        ("unfollow", UNFOLLOW),
        ("listFollows", LIST_FOLLOWS),
        ("createPost", CREATE_POST),
        ("updatePost", UPDATE_POST),
        ("deletePost", DELETE_POST),
        ("getPost", GET_POST),
        ("feed", FEED),
        ("explore", EXPLORE),
        ("searchPosts", SEARCH_POSTS),
        ("toggleLike", TOGGLE_LIKE),
        ("comment", COMMENT),
        ("listComments", LIST_COMMENTS),
        ("reportPost", REPORT_POST),
        ("notifications", NOTIFICATIONS),
        ("registerPushToken", REGISTER_PUSH_TOKEN),
        ("pushSettings", PUSH_SETTINGS),
        ("sendPush", SEND_PUSH),
        ("testPush", TEST_PUSH),
        ("blockUser", BLOCK_USER),
        ("unblockUser", UNBLOCK_USER),
        ("moderatePost", MODERATE_POST),
        ("resolveReport", RESOLVE_REPORT),
        ("adminStats", ADMIN_STATS),
        ("adminUsers", ADMIN_USERS),
        ("adminReports", ADMIN_REPORTS),
        ("adminLogs", ADMIN_LOGS),
        ("createAdmin", CREATE_ADMIN),
        ("updateAdminRole", UPDATE_ADMIN_ROLE),
        ("maintenanceMode", MAINTENANCE_MODE),
        ("maintenanceState", MAINTENANCE_STATE),
        ("optimizeDatabase", OPTIMIZE_DATABASE),
        ("systemInfo", SYSTEM_INFO),
        ("listAdmins", LIST_ADMINS),
        ("databaseStats", DATABASE_STATS),
        ("performanceMetrics", PERFORMANCE_METRICS),
        ("streamNotifications", STREAM_NOTIFICATIONS),
        ("streamFollowingPosts", STREAM_FOLLOWING_POSTS),
        ("streamPostActivity", STREAM_POST_ACTIVITY),
        ("streamPushStatus", STREAM_PUSH_STATUS),
        ("streamMaintenance", STREAM_MAINTENANCE),
        ("streamAdmin", STREAM_ADMIN),
        ("streamOwner", STREAM_OWNER),
    ];
}
