//! Application configuration management
//!
//! This module handles loading and validating configuration from environment
//! variables. Configuration is loaded once at startup, validated, and passed
//! by value into the services that need it; there are no globals.

use std::env;

use crate::constants::{
    DEFAULT_COMPILE_TIMEOUT_SECS, DEFAULT_DATABASE_MAX_CONNECTIONS, DEFAULT_GRACE_PERIOD_SECS,
    DEFAULT_LISTEN_ADDR, DEFAULT_MAX_ATTEMPTS, DEFAULT_MEMORY_LIMIT_MB,
    DEFAULT_SANDBOX_CONCURRENCY, DEFAULT_SESSION_TIMEOUT_MINUTES, DEFAULT_STDOUT_CAP_BYTES,
    DEFAULT_TIME_LIMIT_MS, MAX_WORKERS, MIN_WORKERS,
};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub sandbox: SandboxConfig,
    pub queue: QueueConfig,
    pub contest: ContestConfig,
}

/// Server / gateway configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub frontend_url: Option<String>,
    pub log_level: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Token authentication configuration for the realtime gateway
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub session_timeout_minutes: i64,
}

/// Sandbox execution configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Compile step timeout in seconds
    pub compile_timeout_secs: u64,
    /// Fallback per-test time limit in milliseconds
    pub default_time_limit_ms: u64,
    /// Fallback per-test memory limit in megabytes
    pub default_memory_limit_mb: u64,
    /// Cap on captured stdout in bytes
    pub stdout_cap_bytes: u64,
    /// Concurrent sandbox invocation ceiling
    pub max_concurrent: usize,
}

/// Judge queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Initial worker count; bounded by [MIN_WORKERS, MAX_WORKERS]
    pub workers: usize,
    /// Maximum judging attempts before dead-letter
    pub max_attempts: u32,
}

/// Contest lifecycle configuration
#[derive(Debug, Clone)]
pub struct ContestConfig {
    /// Grace period on contest end in seconds
    pub grace_period_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            jwt: JwtConfig::from_env()?,
            sandbox: SandboxConfig::from_env()?,
            queue: QueueConfig::from_env()?,
            contest: ContestConfig::from_env()?,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string()),
            frontend_url: env::var("FRONTEND_URL").ok(),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL".to_string()))?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| DEFAULT_DATABASE_MAX_CONNECTIONS.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS".to_string()))?,
        })
    }
}

impl RedisConfig {
    fn from_env() -> Result<Self, ConfigError> {
        // REDIS_URL wins; otherwise assemble from the HOST/PORT/PASSWORD/DB
        // quartet.
        if let Ok(url) = env::var("REDIS_URL") {
            return Ok(Self { url });
        }

        let host = env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port: u16 = env::var("REDIS_PORT")
            .unwrap_or_else(|_| "6379".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("REDIS_PORT".to_string()))?;
        let db: u8 = env::var("REDIS_DB")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("REDIS_DB".to_string()))?;

        let url = match env::var("REDIS_PASSWORD") {
            Ok(password) if !password.is_empty() => {
                format!("redis://:{}@{}:{}/{}", password, host, port, db)
            }
            _ => format!("redis://{}:{}/{}", host, port, db),
        };

        Ok(Self { url })
    }
}

impl JwtConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret: env::var("JWT_SECRET")
                .map_err(|_| ConfigError::Missing("JWT_SECRET".to_string()))?,
            session_timeout_minutes: env::var("SESSION_TIMEOUT_MINUTES")
                .unwrap_or_else(|_| DEFAULT_SESSION_TIMEOUT_MINUTES.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SESSION_TIMEOUT_MINUTES".to_string()))?,
        })
    }
}

impl SandboxConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            compile_timeout_secs: env::var("COMPILE_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| DEFAULT_COMPILE_TIMEOUT_SECS.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("COMPILE_TIMEOUT_SECONDS".to_string()))?,
            default_time_limit_ms: env::var("DEFAULT_TIME_LIMIT_MS")
                .unwrap_or_else(|_| DEFAULT_TIME_LIMIT_MS.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DEFAULT_TIME_LIMIT_MS".to_string()))?,
            default_memory_limit_mb: env::var("DEFAULT_MEMORY_LIMIT_MB")
                .unwrap_or_else(|_| DEFAULT_MEMORY_LIMIT_MB.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DEFAULT_MEMORY_LIMIT_MB".to_string()))?,
            stdout_cap_bytes: env::var("STDOUT_CAP_BYTES")
                .unwrap_or_else(|_| DEFAULT_STDOUT_CAP_BYTES.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("STDOUT_CAP_BYTES".to_string()))?,
            max_concurrent: env::var("SANDBOX_CONCURRENCY")
                .unwrap_or_else(|_| DEFAULT_SANDBOX_CONCURRENCY.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SANDBOX_CONCURRENCY".to_string()))?,
        })
    }
}

impl QueueConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let workers = match env::var("JUDGE_WORKERS") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("JUDGE_WORKERS".to_string()))?,
            Err(_) => default_worker_count(),
        };

        Ok(Self {
            workers: workers.clamp(MIN_WORKERS, MAX_WORKERS),
            max_attempts: env::var("JUDGE_MAX_ATTEMPTS")
                .unwrap_or_else(|_| DEFAULT_MAX_ATTEMPTS.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("JUDGE_MAX_ATTEMPTS".to_string()))?,
        })
    }
}

impl ContestConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            grace_period_secs: env::var("GRACE_PERIOD_SECONDS")
                .unwrap_or_else(|_| DEFAULT_GRACE_PERIOD_SECS.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("GRACE_PERIOD_SECONDS".to_string()))?,
        })
    }
}

/// Initial pool size: min(4, cpus - 1), never below MIN_WORKERS
pub fn default_worker_count() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    4.min(cpus.saturating_sub(1)).max(MIN_WORKERS)
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_worker_count_bounds() {
        let n = default_worker_count();
        assert!(n >= MIN_WORKERS);
        assert!(n <= 4);
    }
}
