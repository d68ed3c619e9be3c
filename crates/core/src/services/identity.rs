//! Bearer credentials and identity resolution.
//!
//! A request carries at most one credential. [`IdentityResolver`] turns it
//! into an [`Identity`]: anonymous when absent, a [`Principal`] when the
//! credential verifies and names a live account, or an [`AuthFailure`].
//! The outcome travels with the request as a [`Caller`] so that public
//! operations can still run when a stale credential is presented.

use chorus_common::{AppError, AppResult, config::AuthConfig};
use chorus_db::{
    entities::user::{self, Role, UserStatus},
    repositories::UserRepository,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// An authenticated account, read from the store for this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    user: user::Model,
}

impl Principal {
    #[must_use]
    pub const fn new(user: user::Model) -> Self {
        Self { user }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.user.id
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.user.role
    }

    #[must_use]
    pub const fn status(&self) -> UserStatus {
        self.user.status
    }

    #[must_use]
    pub const fn user(&self) -> &user::Model {
        &self.user
    }

    #[must_use]
    pub fn into_user(self) -> user::Model {
        self.user
    }
}

/// Why a presented credential did not yield a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Malformed, badly signed or expired.
    InvalidCredential,
    /// Verified, but the account no longer exists.
    PrincipalNotFound,
}

impl From<AuthFailure> for AppError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::InvalidCredential => Self::InvalidCredential,
            AuthFailure::PrincipalNotFound => Self::PrincipalNotFound,
        }
    }
}

/// Result of a successful resolution.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    Principal(Principal),
}

/// Per-request caller as seen by the authorization guard.
#[derive(Debug, Clone)]
pub enum Caller {
    Anonymous,
    Authenticated(Principal),
    /// A credential was presented and rejected.
    Rejected(AuthFailure),
}

impl Caller {
    /// The principal, if the caller authenticated.
    #[must_use]
    pub const fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Authenticated(principal) => Some(principal),
            _ => None,
        }
    }
}

impl From<Identity> for Caller {
    fn from(identity: Identity) -> Self {
        match identity {
            Identity::Anonymous => Self::Anonymous,
            Identity::Principal(principal) => Self::Authenticated(principal),
        }
    }
}

impl From<Principal> for Caller {
    fn from(principal: Principal) -> Self {
        Self::Authenticated(principal)
    }
}

/// Signed credential claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id.
    pub sub: String,
    /// Role at issue time. Informational only; the guard reads the live role.
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly issued credential.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies HS256 bearer credentials.
#[derive(Clone)]
pub struct CredentialService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl CredentialService {
    #[must_use]
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.jwt_secret, Duration::days(config.token_ttl_days))
    }

    /// Issue a credential for an account.
    pub fn issue(&self, user: &user::Model) -> AppResult<IssuedCredential> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: user.id.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign credential: {e}")))?;

        Ok(IssuedCredential { token, expires_at })
    }

    /// Verify signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthFailure> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Credential rejected");
                AuthFailure::InvalidCredential
            })
    }
}

/// Extract the token from an `Authorization: Bearer ...` header value.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Maps an optional credential to an identity.
#[derive(Clone)]
pub struct IdentityResolver {
    credentials: CredentialService,
    user_repo: UserRepository,
}

impl IdentityResolver {
    #[must_use]
    pub const fn new(credentials: CredentialService, user_repo: UserRepository) -> Self {
        Self {
            credentials,
            user_repo,
        }
    }

    /// Resolve a credential.
    ///
    /// Absent or blank credentials are anonymous. The principal is re-read
    /// from the store on every call, so role and status changes apply to
    /// credentials issued before them. Deleted accounts resolve as
    /// [`AppError::PrincipalNotFound`].
    pub async fn resolve(&self, credential: Option<&str>) -> AppResult<Identity> {
        let Some(token) = credential.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(Identity::Anonymous);
        };

        let claims = self.credentials.verify(token)?;

        match self.user_repo.find_by_id(&claims.sub).await? {
            Some(user) if user.status != UserStatus::Deleted => {
                Ok(Identity::Principal(Principal::new(user)))
            }
            _ => {
                debug!(user_id = %claims.sub, "Credential names no live account");
                Err(AuthFailure::PrincipalNotFound.into())
            }
        }
    }

    /// Resolve a credential into a [`Caller`], keeping the rejection reason
    /// instead of failing. Store errors still propagate.
    pub async fn resolve_caller(&self, credential: Option<&str>) -> AppResult<Caller> {
        match self.resolve(credential).await {
            Ok(identity) => Ok(identity.into()),
            Err(AppError::InvalidCredential) => Ok(Caller::Rejected(AuthFailure::InvalidCredential)),
            Err(AppError::PrincipalNotFound) => Ok(Caller::Rejected(AuthFailure::PrincipalNotFound)),
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub const fn credentials(&self) -> &CredentialService {
        &self.credentials
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    fn create_test_user(id: &str, role: Role, status: UserStatus) -> user::Model {
        user::Model {
            id: id.to_string(),
            email: Some(format!("{id}@example.com")),
            username: id.to_string(),
            password_hash: None,
            display_name: None,
            bio: None,
            avatar_url: None,
            role,
            status,
            email_verified: true,
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

    fn credentials() -> CredentialService {
        CredentialService::new("unit-test-secret", Duration::days(1))
    }

    fn resolver(db: MockDatabase) -> IdentityResolver {
        IdentityResolver::new(
            credentials(),
            UserRepository::new(Arc::new(db.into_connection())),
        )
    }

    #[test]
    fn test_issue_and_verify() {
        let user = create_test_user("u1", Role::Admin, UserStatus::Active);
        let service = credentials();

        let issued = service.issue(&user).unwrap();
        let claims = service.verify(&issued.token).unwrap();

        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn test_verify_rejects_foreign_signature() {
        let user = create_test_user("u1", Role::User, UserStatus::Active);
        let other = CredentialService::new("another-secret", Duration::days(1));
        let token = other.issue(&user).unwrap().token;

        assert_eq!(
            credentials().verify(&token).unwrap_err(),
            AuthFailure::InvalidCredential
        );
    }

    #[test]
    fn test_verify_rejects_expired() {
        let user = create_test_user("u1", Role::User, UserStatus::Active);
        let expired = CredentialService::new("unit-test-secret", Duration::hours(-1));
        let token = expired.issue(&user).unwrap().token;

        assert!(credentials().verify(&token).is_err());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[tokio::test]
    async fn test_absent_credential_is_anonymous() {
        let resolver = resolver(MockDatabase::new(DatabaseBackend::Postgres));

        assert!(matches!(resolver.resolve(None).await.unwrap(), Identity::Anonymous));
        assert!(matches!(resolver.resolve(Some("  ")).await.unwrap(), Identity::Anonymous));
    }

    #[tokio::test]
    async fn test_garbage_credential_is_invalid() {
        let resolver = resolver(MockDatabase::new(DatabaseBackend::Postgres));

        let result = resolver.resolve(Some("not-a-jwt")).await;

        assert!(matches!(result, Err(AppError::InvalidCredential)));
    }

    #[tokio::test]
    async fn test_resolves_live_principal() {
        let user = create_test_user("u1", Role::User, UserStatus::Blocked);
        let token = credentials().issue(&user).unwrap().token;
        let resolver = resolver(
            MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[user.clone()]]),
        );

        let Identity::Principal(principal) = resolver.resolve(Some(&token)).await.unwrap() else {
            panic!("expected a principal");
        };

        // Blocked accounts still resolve; the guard rejects them
        assert_eq!(principal.id(), "u1");
        assert_eq!(principal.status(), UserStatus::Blocked);
    }

    #[tokio::test]
    async fn test_missing_account_is_principal_not_found() {
        let user = create_test_user("gone", Role::User, UserStatus::Active);
        let token = credentials().issue(&user).unwrap().token;
        let resolver = resolver(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()]),
        );

        let result = resolver.resolve(Some(&token)).await;

        assert!(matches!(result, Err(AppError::PrincipalNotFound)));
    }

    #[tokio::test]
    async fn test_deleted_account_is_principal_not_found() {
        let user = create_test_user("u1", Role::User, UserStatus::Deleted);
        let token = credentials().issue(&user).unwrap().token;
        let resolver =
            resolver(MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[user]]));

        let caller = resolver.resolve_caller(Some(&token)).await.unwrap();

        assert!(matches!(
            caller,
            Caller::Rejected(AuthFailure::PrincipalNotFound)
        ));
    }
}
