//! Account service: registration, sign-in, password recovery and profiles.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chorus_common::{AppError, AppResult, IdGenerator};
use chorus_db::{
    entities::{
        password_reset,
        user::{self, Role, UserStatus},
    },
    repositories::{
        FollowingRepository, PasswordResetRepository, PostRepository, UserRepository, UserSearch,
    },
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::{Validate, ValidationError};

use super::fanout::FanoutService;
use super::guard::{gates, require};
use super::identity::{Caller, CredentialService};
use super::social_auth::{IdentityProviderService, Provider, ProviderIdentity};

const MAX_PAGE: u64 = 100;

const INVALID_RESET_TOKEN: &str = "Invalid or expired reset token";

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        Err(ValidationError::new("username_charset"))
    }
}

/// Input for password registration.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 3, max = 30), custom(function = "validate_username"))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(max = 50))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginInput {
    #[validate(length(min = 1, max = 255))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordInput {
    #[validate(length(min = 1, max = 128))]
    pub token: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordInput {
    #[validate(length(min = 1, max = 128))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

/// Profile update; absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    #[validate(length(max = 50))]
    pub display_name: Option<String>,
    #[validate(length(max = 500))]
    pub bio: Option<String>,
    #[validate(url)]
    pub avatar_url: Option<String>,
}

/// A signed-in account with its credential.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: user::Model,
}

/// Public profile of an account as seen by one viewer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: user::Model,
    pub followers_count: u64,
    pub following_count: u64,
    pub posts_count: u64,
    pub is_following: bool,
}

/// Account service for business logic.
#[derive(Clone)]
pub struct AccountService {
    user_repo: UserRepository,
    following_repo: FollowingRepository,
    post_repo: PostRepository,
    reset_repo: PasswordResetRepository,
    credentials: CredentialService,
    google: Option<IdentityProviderService>,
    apple: Option<IdentityProviderService>,
    fanout: FanoutService,
    reset_ttl: Duration,
    id_gen: IdGenerator,
}

impl AccountService {
    /// Create a new account service with no social providers.
    #[must_use]
    pub const fn new(
        user_repo: UserRepository,
        following_repo: FollowingRepository,
        post_repo: PostRepository,
        reset_repo: PasswordResetRepository,
        credentials: CredentialService,
        fanout: FanoutService,
        reset_ttl: Duration,
    ) -> Self {
        Self {
            user_repo,
            following_repo,
            post_repo,
            reset_repo,
            credentials,
            google: None,
            apple: None,
            fanout,
            reset_ttl,
            id_gen: IdGenerator::new(),
        }
    }

    /// Enable sign-in through a provider.
    #[must_use]
    pub fn with_identity_provider(mut self, provider: IdentityProviderService) -> Self {
        match provider.provider() {
            Provider::Google => self.google = Some(provider),
            Provider::Apple => self.apple = Some(provider),
        }
        self
    }

    /// Create a password account and sign it in.
    pub async fn register(&self, caller: &Caller, input: RegisterInput) -> AppResult<AuthPayload> {
        gates::REGISTER.check(caller)?;
        input.validate()?;

        let email = input.email.to_lowercase();
        let username = input.username.to_lowercase();

        if self.user_repo.find_by_email(&email).await?.is_some()
            || self.user_repo.find_by_username(&username).await?.is_some()
        {
            return Err(duplicate_account());
        }

        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            email: Set(Some(email)),
            username: Set(username),
            password_hash: Set(Some(hash_password(&input.password)?)),
            display_name: Set(input.display_name),
            bio: Set(None),
            avatar_url: Set(None),
            role: Set(Role::User),
            status: Set(UserStatus::Active),
            email_verified: Set(false),
            google_id: Set(None),
            apple_id: Set(None),
            blocked_at: Set(None),
            blocked_reason: Set(None),
            blocked_by: Set(None),
            blocked_until: Set(None),
            last_active_at: Set(Some(Utc::now().into())),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };

        let user = match self.user_repo.create(model).await {
            Ok(user) => user,
            Err(AppError::ConstraintViolation(_)) => return Err(duplicate_account()),
            Err(e) => return Err(e),
        };

        self.fanout.system_activity(
            "user.registered",
            Some(&user.id),
            json!({ "username": user.username }),
        );
        tracing::info!(user_id = %user.id, "User registered");

        self.sign_in(user)
    }

    /// Password sign-in. Unknown accounts and wrong passwords are
    /// indistinguishable.
    pub async fn login(&self, caller: &Caller, input: LoginInput) -> AppResult<AuthPayload> {
        gates::LOGIN.check(caller)?;
        input.validate()?;

        let user = self
            .user_repo
            .find_by_email(&input.email.to_lowercase())
            .await?
            .filter(|user| user.status != UserStatus::Deleted)
            .ok_or(AppError::InvalidCredential)?;

        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AppError::InvalidCredential)?;
        if !verify_password(&input.password, hash)? {
            return Err(AppError::InvalidCredential);
        }

        if user.is_blocked() {
            return Err(AppError::AccountBlocked);
        }

        let user = self.touch(user).await?;
        tracing::info!(user_id = %user.id, "User signed in");
        self.sign_in(user)
    }

    /// Sign in with a Google ID token, creating the account on first use.
    pub async fn sign_in_with_google(&self, caller: &Caller, id_token: &str) -> AppResult<AuthPayload> {
        self.sign_in_with(caller, Provider::Google, self.google.as_ref(), id_token)
            .await
    }

    /// Sign in with an Apple ID token, creating the account on first use.
    pub async fn sign_in_with_apple(&self, caller: &Caller, id_token: &str) -> AppResult<AuthPayload> {
        self.sign_in_with(caller, Provider::Apple, self.apple.as_ref(), id_token)
            .await
    }

    /// Credentials are stateless; sign-out is recorded and left to the client.
    pub async fn logout(&self, caller: &Caller) -> AppResult<()> {
        let me = require(gates::LOGOUT, caller)?;
        tracing::info!(user_id = %me.id(), "User signed out");
        Ok(())
    }

    /// Issue a reset token for the account with this email. Unknown emails
    /// succeed silently.
    pub async fn forgot_password(&self, caller: &Caller, email: &str) -> AppResult<()> {
        gates::FORGOT_PASSWORD.check(caller)?;

        let Some(user) = self
            .user_repo
            .find_by_email(&email.trim().to_lowercase())
            .await?
            .filter(|user| user.status != UserStatus::Deleted)
        else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let now = Utc::now();
        let model = password_reset::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(user.id.clone()),
            token: Set(self.id_gen.generate_token()),
            expires_at: Set((now + self.reset_ttl).into()),
            used: Set(false),
            created_at: Set(now.into()),
        };
        self.reset_repo.create(model).await?;

        tracing::info!(user_id = %user.id, "Password reset token issued");
        Ok(())
    }

    /// Consume a reset token and set a new password.
    pub async fn reset_password(&self, caller: &Caller, input: ResetPasswordInput) -> AppResult<()> {
        gates::RESET_PASSWORD.check(caller)?;
        input.validate()?;

        let reset = self
            .reset_repo
            .find_by_token(&input.token)
            .await?
            .filter(|reset| !reset.used && reset.expires_at > Utc::now())
            .ok_or_else(|| AppError::BadRequest(INVALID_RESET_TOKEN.to_string()))?;

        if !self.reset_repo.claim(&reset.id).await? {
            return Err(AppError::BadRequest(INVALID_RESET_TOKEN.to_string()));
        }

        let user = self.user_repo.get_by_id(&reset.user_id).await?;
        let mut active: user::ActiveModel = user.into();
        active.password_hash = Set(Some(hash_password(&input.new_password)?));
        active.updated_at = Set(Some(Utc::now().into()));
        self.user_repo.update(active).await?;

        tracing::info!(user_id = %reset.user_id, "Password reset");
        Ok(())
    }

    pub async fn change_password(&self, caller: &Caller, input: ChangePasswordInput) -> AppResult<()> {
        let me = require(gates::CHANGE_PASSWORD, caller)?;
        input.validate()?;

        let current = me.user().password_hash.as_deref().ok_or_else(|| {
            AppError::BadRequest("This account signs in with a social provider".to_string())
        })?;
        if !verify_password(&input.current_password, current)? {
            return Err(AppError::BadRequest("Current password is incorrect".to_string()));
        }

        let mut active: user::ActiveModel = me.into_user().into();
        active.password_hash = Set(Some(hash_password(&input.new_password)?));
        active.updated_at = Set(Some(Utc::now().into()));
        self.user_repo.update(active).await?;
        Ok(())
    }

    pub async fn update_profile(
        &self,
        caller: &Caller,
        input: UpdateProfileInput,
    ) -> AppResult<user::Model> {
        let me = require(gates::UPDATE_PROFILE, caller)?;
        input.validate()?;

        let mut active: user::ActiveModel = me.into_user().into();
        if let Some(display_name) = input.display_name {
            active.display_name = Set(Some(display_name));
        }
        if let Some(bio) = input.bio {
            active.bio = Set(Some(bio));
        }
        if let Some(avatar_url) = input.avatar_url {
            active.avatar_url = Set(Some(avatar_url));
        }
        active.updated_at = Set(Some(Utc::now().into()));

        self.user_repo.update(active).await
    }

    /// The caller's own account.
    pub async fn me(&self, caller: &Caller) -> AppResult<user::Model> {
        Ok(require(gates::ME, caller)?.into_user())
    }

    /// Public profile with graph counts. Deleted accounts are not found.
    pub async fn user_profile(&self, caller: &Caller, user_id: &str) -> AppResult<UserProfile> {
        let viewer = gates::USER_PROFILE.check(caller)?;

        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .filter(|user| user.status != UserStatus::Deleted)
            .ok_or_else(|| AppError::NotFound(format!("User {user_id}")))?;

        let is_following = match viewer {
            Some(ref viewer) if viewer.id() != user.id => {
                self.following_repo.is_following(viewer.id(), &user.id).await?
            }
            _ => false,
        };

        Ok(UserProfile {
            followers_count: self.following_repo.count_followers(&user.id).await?,
            following_count: self.following_repo.count_following(&user.id).await?,
            posts_count: self.post_repo.count_published_by_author(&user.id).await?,
            is_following,
            user,
        })
    }

    /// Search active accounts by username or display name.
    pub async fn search_users(
        &self,
        caller: &Caller,
        query: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<user::Model>> {
        gates::SEARCH_USERS.check(caller)?;

        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("Search query is required".to_string()));
        }

        let search = UserSearch {
            query: Some(query.to_string()),
            status: Some(UserStatus::Active),
            role: None,
        };
        self.user_repo
            .search(&search, limit.clamp(1, MAX_PAGE), offset)
            .await
    }

    async fn sign_in_with(
        &self,
        caller: &Caller,
        provider: Provider,
        verifier: Option<&IdentityProviderService>,
        id_token: &str,
    ) -> AppResult<AuthPayload> {
        gates::SOCIAL_SIGN_IN.check(caller)?;

        let verifier = verifier.ok_or_else(|| {
            AppError::BadRequest(format!("{} sign-in is not configured", provider.display_name()))
        })?;
        if id_token.trim().is_empty() {
            return Err(AppError::InvalidCredential);
        }

        let identity = verifier.verify(id_token).await.map_err(|e| match e {
            AppError::ExternalService(_) => e,
            _ => AppError::InvalidCredential,
        })?;

        let user = match self.find_linked(provider, &identity).await? {
            Some(user) => user,
            None => self.create_social(provider, &identity).await?,
        };

        match user.status {
            UserStatus::Blocked => return Err(AppError::AccountBlocked),
            UserStatus::Deleted => return Err(AppError::InvalidCredential),
            UserStatus::Active | UserStatus::Pending => {}
        }

        let user = self.touch(user).await?;
        tracing::info!(user_id = %user.id, provider = provider.display_name(), "User signed in");
        self.sign_in(user)
    }

    /// An account already bound to the subject, or one with the same
    /// verified email, which is then bound to the subject.
    async fn find_linked(
        &self,
        provider: Provider,
        identity: &ProviderIdentity,
    ) -> AppResult<Option<user::Model>> {
        let bound = match provider {
            Provider::Google => self.user_repo.find_by_google_id(&identity.subject).await?,
            Provider::Apple => self.user_repo.find_by_apple_id(&identity.subject).await?,
        };
        if bound.is_some() {
            return Ok(bound);
        }

        let Some(email) = identity.email.as_deref().filter(|_| identity.email_verified) else {
            return Ok(None);
        };
        let Some(user) = self.user_repo.find_by_email(email).await? else {
            return Ok(None);
        };

        let mut active: user::ActiveModel = user.into();
        match provider {
            Provider::Google => active.google_id = Set(Some(identity.subject.clone())),
            Provider::Apple => active.apple_id = Set(Some(identity.subject.clone())),
        }
        active.email_verified = Set(true);
        active.updated_at = Set(Some(Utc::now().into()));

        let user = self.user_repo.update(active).await?;
        tracing::info!(user_id = %user.id, provider = provider.display_name(), "Linked social identity");
        Ok(Some(user))
    }

    async fn create_social(
        &self,
        provider: Provider,
        identity: &ProviderIdentity,
    ) -> AppResult<user::Model> {
        let username = self.free_username(provider, &identity.subject).await?;
        let (google_id, apple_id) = match provider {
            Provider::Google => (Some(identity.subject.clone()), None),
            Provider::Apple => (None, Some(identity.subject.clone())),
        };

        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            email: Set(identity.email.clone()),
            username: Set(username),
            password_hash: Set(None),
            display_name: Set(identity.name.clone()),
            bio: Set(None),
            avatar_url: Set(identity.picture.clone()),
            role: Set(Role::User),
            status: Set(UserStatus::Active),
            email_verified: Set(true),
            google_id: Set(google_id),
            apple_id: Set(apple_id),
            blocked_at: Set(None),
            blocked_reason: Set(None),
            blocked_by: Set(None),
            blocked_until: Set(None),
            last_active_at: Set(None),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };

        let user = self.user_repo.create(model).await?;
        self.fanout.system_activity(
            "user.registered",
            Some(&user.id),
            json!({ "username": user.username, "provider": provider.username_prefix() }),
        );
        Ok(user)
    }

    /// `<provider>_<last 8 of subject>`, suffixed until unused.
    async fn free_username(&self, provider: Provider, subject: &str) -> AppResult<String> {
        let chars: Vec<char> = subject
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let tail: String = chars[chars.len().saturating_sub(8)..].iter().collect();
        let base = format!("{}_{tail}", provider.username_prefix());

        if self.user_repo.find_by_username(&base).await?.is_none() {
            return Ok(base);
        }
        for n in 1..=20 {
            let candidate = format!("{base}_{n}");
            if self.user_repo.find_by_username(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Ok(format!("{base}_{}", self.id_gen.generate().to_lowercase()))
    }

    async fn touch(&self, user: user::Model) -> AppResult<user::Model> {
        let mut active: user::ActiveModel = user.into();
        active.last_active_at = Set(Some(Utc::now().into()));
        self.user_repo.update(active).await
    }

    fn sign_in(&self, user: user::Model) -> AppResult<AuthPayload> {
        let credential = self.credentials.issue(&user)?;
        Ok(AuthPayload {
            token: credential.token,
            expires_at: credential.expires_at,
            user,
        })
    }
}

fn duplicate_account() -> AppError {
    AppError::Conflict("User with this email or username already exists".to_string())
}

/// Hash a password using Argon2.
pub(crate) fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a hash.
pub(crate) fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("Invalid hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
