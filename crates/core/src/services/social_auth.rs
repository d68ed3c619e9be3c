//! Third-party identity providers.
//!
//! A provider verifies an ID token issued to this application and yields
//! the provider's subject plus whatever profile it vouches for.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chorus_common::{AppError, AppResult};
use jsonwebtoken::{
    Algorithm, DecodingKey, Validation, decode, decode_header,
    jwk::JwkSet,
};
use serde::Deserialize;
use tokio::sync::RwLock;

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
const APPLE_KEYS_URL: &str = "https://appleid.apple.com/auth/keys";
const APPLE_ISSUER: &str = "https://appleid.apple.com";
const APPLE_KEYS_TTL: Duration = Duration::from_secs(3600);

/// Supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    Apple,
}

impl Provider {
    /// Prefix of usernames generated for accounts created through the provider.
    #[must_use]
    pub const fn username_prefix(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Apple => "apple",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Apple => "Apple",
        }
    }
}

/// Identity asserted by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub subject: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Verifies provider ID tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Verify a token. Any rejection is [`AppError::InvalidCredential`].
    async fn verify(&self, id_token: &str) -> AppResult<ProviderIdentity>;
}

/// Shared identity provider handle.
pub type IdentityProviderService = Arc<dyn IdentityProvider>;

/// Providers take `"true"` and `true` interchangeably.
fn flag(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenInfo {
    aud: String,
    iss: String,
    sub: String,
    email: Option<String>,
    email_verified: Option<serde_json::Value>,
    name: Option<String>,
    picture: Option<String>,
}

/// Google sign-in through the tokeninfo endpoint.
pub struct GoogleIdentityProvider {
    http_client: reqwest::Client,
    client_id: String,
}

impl GoogleIdentityProvider {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn verify(&self, id_token: &str) -> AppResult<ProviderIdentity> {
        let response = self
            .http_client
            .get(GOOGLE_TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Google tokeninfo request failed: {e}")))?;

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "Google rejected ID token");
            return Err(AppError::InvalidCredential);
        }

        let info: GoogleTokenInfo = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("Unreadable Google tokeninfo: {e}")))?;

        if info.aud != self.client_id || !GOOGLE_ISSUERS.contains(&info.iss.as_str()) {
            tracing::debug!(aud = %info.aud, iss = %info.iss, "Google ID token not issued to us");
            return Err(AppError::InvalidCredential);
        }

        Ok(ProviderIdentity {
            subject: info.sub,
            email: info.email.map(|e| e.to_lowercase()),
            email_verified: flag(info.email_verified.as_ref()),
            name: info.name,
            picture: info.picture,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AppleClaims {
    sub: String,
    email: Option<String>,
    email_verified: Option<serde_json::Value>,
}

/// Apple sign-in, verifying ID tokens against Apple's published keys.
pub struct AppleIdentityProvider {
    http_client: reqwest::Client,
    client_id: String,
    keys: RwLock<Option<(Instant, JwkSet)>>,
}

impl AppleIdentityProvider {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            client_id: client_id.into(),
            keys: RwLock::new(None),
        }
    }

    async fn key_set(&self, refresh: bool) -> AppResult<JwkSet> {
        if !refresh
            && let Some((fetched_at, keys)) = self.keys.read().await.as_ref()
            && fetched_at.elapsed() < APPLE_KEYS_TTL
        {
            return Ok(keys.clone());
        }

        let keys: JwkSet = self
            .http_client
            .get(APPLE_KEYS_URL)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AppError::ExternalService(format!("Apple key fetch failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("Unreadable Apple keys: {e}")))?;

        *self.keys.write().await = Some((Instant::now(), keys.clone()));
        Ok(keys)
    }
}

#[async_trait]
impl IdentityProvider for AppleIdentityProvider {
    fn provider(&self) -> Provider {
        Provider::Apple
    }

    async fn verify(&self, id_token: &str) -> AppResult<ProviderIdentity> {
        let header = decode_header(id_token).map_err(|_| AppError::InvalidCredential)?;
        let kid = header.kid.ok_or(AppError::InvalidCredential)?;

        // Apple rotates keys; an unknown kid forces one refetch
        let jwk = match self.key_set(false).await?.find(&kid).cloned() {
            Some(jwk) => jwk,
            None => self
                .key_set(true)
                .await?
                .find(&kid)
                .cloned()
                .ok_or(AppError::InvalidCredential)?,
        };

        let key = DecodingKey::from_jwk(&jwk).map_err(|_| AppError::InvalidCredential)?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(&[APPLE_ISSUER]);

        let claims = decode::<AppleClaims>(id_token, &key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Apple ID token rejected");
                AppError::InvalidCredential
            })?
            .claims;

        Ok(ProviderIdentity {
            subject: claims.sub,
            email: claims.email.map(|e| e.to_lowercase()),
            email_verified: flag(claims.email_verified.as_ref()),
            name: None,
            picture: None,
        })
    }
}
