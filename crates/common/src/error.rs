//! Error types for chorus.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Access Control ===
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Your account has been blocked")]
    AccountBlocked,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Principal not found")]
    PrincipalNotFound,

    // === Domain Rules ===
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Already following this user")]
    AlreadyFollowing,

    #[error("You have already reported this post")]
    AlreadyReported,

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    // === Client Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::AuthenticationRequired | Self::InvalidCredential | Self::PrincipalNotFound => {
                StatusCode::UNAUTHORIZED
            }
            Self::AccountBlocked | Self::InsufficientPermissions => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTarget(_) | Self::BadRequest(_) | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::AlreadyFollowing
            | Self::AlreadyReported
            | Self::ConstraintViolation(_)
            | Self::Conflict(_) => StatusCode::CONFLICT,

            // 5xx Server Errors
            Self::Database(_)
            | Self::Config(_)
            | Self::ExternalService(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::AccountBlocked => "ACCOUNT_BLOCKED",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::PrincipalNotFound => "PRINCIPAL_NOT_FOUND",
            Self::InvalidTarget(_) => "INVALID_TARGET",
            Self::AlreadyFollowing => "ALREADY_FOLLOWING",
            Self::AlreadyReported => "ALREADY_REPORTED",
            Self::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Returns whether this error was raised by the access-control layer.
    #[must_use]
    pub const fn is_access_denied(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRequired
                | Self::AccountBlocked
                | Self::InsufficientPermissions
                | Self::InvalidCredential
                | Self::PrincipalNotFound
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Log server errors
        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else if self.is_access_denied() {
            tracing::info!(code = code, "Access denied");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_errors_map_to_auth_statuses() {
        assert_eq!(
            AppError::AuthenticationRequired.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::AccountBlocked.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::InsufficientPermissions.status_code(),
            StatusCode::FORBIDDEN
        );
        assert!(AppError::InvalidCredential.is_access_denied());
        assert!(!AppError::AlreadyFollowing.is_access_denied());
    }

    #[test]
    fn test_uniqueness_errors_are_conflicts() {
        assert_eq!(AppError::AlreadyFollowing.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::AlreadyReported.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::ConstraintViolation("follow".into()).error_code(),
            "CONSTRAINT_VIOLATION"
        );
    }

    #[test]
    fn test_server_errors() {
        assert!(AppError::Database("boom".into()).is_server_error());
        assert!(!AppError::NotFound("post".into()).is_server_error());
    }
}
