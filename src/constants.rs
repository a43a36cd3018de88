//! Application-wide constants
//!
//! This module contains all constant values used throughout the application.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// SERVER DEFAULTS
// =============================================================================

/// Default listen address for the realtime gateway
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default maximum database connections in the pool
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 20;

/// Default session staleness bound in minutes
pub const DEFAULT_SESSION_TIMEOUT_MINUTES: i64 = 120;

// =============================================================================
// SANDBOX DEFAULTS
// =============================================================================

/// Default compile timeout in seconds (independent of per-test wall limits)
pub const DEFAULT_COMPILE_TIMEOUT_SECS: u64 = 30;

/// Default per-test time limit in milliseconds
pub const DEFAULT_TIME_LIMIT_MS: u64 = 2_000;

/// Default per-test memory limit in megabytes
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 256;

/// Default cap on captured stdout in bytes
pub const DEFAULT_STDOUT_CAP_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum concurrent sandbox invocations per process
pub const DEFAULT_SANDBOX_CONCURRENCY: usize = 8;

/// Interval between /proc samples while a child runs, in milliseconds
pub const PROC_SAMPLE_INTERVAL_MS: u64 = 50;

// =============================================================================
// QUEUE DEFAULTS
// =============================================================================

/// Maximum judging attempts before a job is dead-lettered
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base retry backoff in milliseconds (doubles per attempt)
pub const RETRY_BACKOFF_BASE_MS: u64 = 2_000;

/// Jobs unchanged in the active set longer than this are considered stalled
pub const STALLED_JOB_SECS: i64 = 300;

/// Workers silent longer than this are replaced
pub const WORKER_HEARTBEAT_TIMEOUT_SECS: i64 = 120;

/// Lower bound on the worker pool size
pub const MIN_WORKERS: usize = 2;

/// Upper bound on the worker pool size
pub const MAX_WORKERS: usize = 8;

/// Rolling metrics window in seconds
pub const METRICS_WINDOW_SECS: i64 = 3_600;

// =============================================================================
// PRIORITY FUNCTION
// =============================================================================

/// Maximum recency bonus, decaying linearly over the first hour
pub const PRIORITY_RECENCY_MAX: i64 = 100;

/// Bonus applied when the contest ends within `PRIORITY_URGENCY_WINDOW_MINS`
pub const PRIORITY_URGENCY_BONUS: i64 = 50;

/// Contest-urgency window in minutes
pub const PRIORITY_URGENCY_WINDOW_MINS: i64 = 30;

/// Base of the team-fairness bonus: max(0, base - step * recent_submissions)
pub const PRIORITY_FAIRNESS_BASE: i64 = 25;

/// Per-recent-submission fairness step
pub const PRIORITY_FAIRNESS_STEP: i64 = 5;

/// Admin override bonus
pub const PRIORITY_ADMIN_BONUS: i64 = 1_000;

/// Throughput bump for compiled languages
pub const PRIORITY_COMPILED_BONUS: i64 = 5;

// =============================================================================
// CONTEST LIFECYCLE
// =============================================================================

/// Lifecycle tick period in seconds
pub const LIFECYCLE_TICK_SECS: u64 = 60;

/// Grace period after scheduled contest end for in-flight submissions
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 30;

/// Poll interval while draining pending submissions during the grace period
pub const GRACE_POLL_SECS: u64 = 5;

/// Coalescing window for leaderboard broadcasts in seconds
pub const LEADERBOARD_FLUSH_SECS: u64 = 5;

/// Penalty minutes per wrong attempt before the first accept (ICPC)
pub const ICPC_PENALTY_MINUTES: i64 = 20;

// =============================================================================
// REDIS KEYS
// =============================================================================

/// Key names used by the judge queue
pub mod queue_keys {
    /// Sorted set of waiting jobs (score encodes priority, member carries
    /// the FIFO sequence)
    pub const WAITING: &str = "judge:waiting";
    /// Hash of active jobs: submission id -> claim metadata JSON
    pub const ACTIVE: &str = "judge:active";
    /// Sorted set of delayed retries scored by ready-at epoch millis
    pub const DELAYED: &str = "judge:delayed";
    /// List of dead-lettered job payloads
    pub const DEAD: &str = "judge:dead";
    /// Hash of job payloads keyed by submission id
    pub const JOBS: &str = "judge:jobs";
    /// Hash mapping submission id -> waiting-set member
    pub const MEMBERS: &str = "judge:members";
    /// Monotonic sequence counter for FIFO ordering
    pub const SEQ: &str = "judge:seq";
    /// Pause flag
    pub const PAUSED: &str = "judge:paused";
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Maximum source code size in bytes (1 MB)
pub const MAX_SOURCE_CODE_SIZE: usize = 1024 * 1024;

/// Relative/absolute tolerance for opt-in floating point comparison
pub const FLOAT_COMPARE_TOLERANCE: f64 = 1e-6;
