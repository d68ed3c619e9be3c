//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Credential and sign-in configuration.
    pub auth: AuthConfig,
    /// Event bus configuration.
    #[serde(default)]
    pub events: EventsConfig,
    /// Housekeeping configuration.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Mobile push delivery configuration.
    #[serde(default)]
    pub push: PushConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (`postgres://...` in production).
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Credential and sign-in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign bearer credentials.
    pub jwt_secret: String,
    /// Credential lifetime in days.
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
    /// Password reset token lifetime in minutes.
    #[serde(default = "default_password_reset_ttl_minutes")]
    pub password_reset_ttl_minutes: i64,
    /// Google OAuth client id. Google sign-in is disabled when unset.
    #[serde(default)]
    pub google_client_id: Option<String>,
    /// Apple services id. Apple sign-in is disabled when unset.
    #[serde(default)]
    pub apple_client_id: Option<String>,
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Bounded queue length of each live subscription.
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: default_subscriber_queue_capacity(),
        }
    }
}

/// Housekeeping configuration used by database optimisation.
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// System log entries older than this are purged.
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: i64,
    /// Soft-deleted posts older than this are purged.
    #[serde(default = "default_deleted_post_retention_days")]
    pub deleted_post_retention_days: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            log_retention_days: default_log_retention_days(),
            deleted_post_retention_days: default_deleted_post_retention_days(),
        }
    }
}

/// Mobile push delivery configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushConfig {
    /// Deliver through the Expo push service. When off, pushes are only logged.
    #[serde(default)]
    pub expo_enabled: bool,
    /// Optional Expo access token for projects with enhanced security.
    #[serde(default)]
    pub expo_access_token: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    4000
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

const fn default_token_ttl_days() -> i64 {
    30
}

const fn default_password_reset_ttl_minutes() -> i64 {
    60
}

const fn default_subscriber_queue_capacity() -> usize {
    256
}

const fn default_log_retention_days() -> i64 {
    90
}

const fn default_deleted_post_retention_days() -> i64 {
    30
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `CHORUS_ENV`)
    /// 3. Environment variables with `CHORUS_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("CHORUS_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("CHORUS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("CHORUS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Configuration for test harnesses: in-memory `SQLite` and a fixed secret.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
                min_connections: 1,
            },
            auth: AuthConfig {
                jwt_secret: "test-secret-do-not-use-in-production".to_string(),
                token_ttl_days: default_token_ttl_days(),
                password_reset_ttl_minutes: default_password_reset_ttl_minutes(),
                google_client_id: None,
                apple_client_id: None,
            },
            events: EventsConfig::default(),
            maintenance: MaintenanceConfig::default(),
            push: PushConfig::default(),
        }
    }
}
