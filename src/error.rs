//! Custom error types and handling
//!
//! This module defines the application's error taxonomy. Submission verdicts
//! are never errors: the judging layer folds every failure into a
//! `JudgeResult`. `AppError` covers the infrastructure around it, split into
//! transient failures (retried by the queue) and fatal ones (refuse to
//! start).

use serde::Serialize;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Resource errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // Intake errors
    #[error("Contest is not accepting submissions")]
    ContestClosed,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Infrastructure errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Sandbox spawn error: {0}")]
    SandboxSpawn(String),

    // Auth errors (realtime gateway)
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    // Internal errors
    #[error("Internal error")]
    Internal(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Error details for wire serialization
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl AppError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::Conflict(_) => "CONFLICT",
            Self::ContestClosed => "CONTEST_CLOSED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::SandboxSpawn(_) => "SANDBOX_SPAWN_ERROR",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Whether the queue may retry the operation that produced this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Redis(_) | Self::SandboxSpawn(_)
        )
    }

    /// Whether the process should refuse to start on this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Wire-serializable details
    pub fn details(&self) -> ErrorDetails {
        ErrorDetails {
            code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }
}

// Implement From for common error types
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    AppError::AlreadyExists("Resource already exists".to_string())
                } else {
                    AppError::Database(db_err.to_string())
                }
            }
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Redis(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidToken,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Database("busy".into()).is_transient());
        assert!(AppError::SandboxSpawn("fork failed".into()).is_transient());
        assert!(!AppError::Validation("bad".into()).is_transient());
        assert!(!AppError::Configuration("missing".into()).is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AppError::Configuration("missing JWT_SECRET".into()).is_fatal());
        assert!(!AppError::Redis("timeout".into()).is_fatal());
    }
}
