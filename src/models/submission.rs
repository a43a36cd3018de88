//! Submission model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Submission database model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub team_id: Uuid,
    pub problem_id: Uuid,
    pub contest_id: Uuid,
    pub language: String,
    #[serde(skip_serializing)]
    pub source_code: String,
    pub submission_time: DateTime<Utc>,
    pub status: String,
    pub judged_at: Option<DateTime<Utc>>,
    pub execution_time: Option<i32>,
    pub memory_used: Option<i32>,
    pub points_earned: Option<f64>,
    pub test_cases_passed: Option<i32>,
    pub total_test_cases: Option<i32>,
    /// Serialized per-case detail; re-judges append the previous result to
    /// a `history` array inside this document
    pub judge_output: Option<serde_json::Value>,
}

impl Submission {
    /// Typed status accessor
    pub fn status(&self) -> Option<SubmissionStatus> {
        SubmissionStatus::from_str(&self.status)
    }

    /// Typed language accessor
    pub fn language(&self) -> Option<Language> {
        Language::from_str(&self.language)
    }
}

/// Submission status (wire vocabulary)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Compiling,
    Judging,
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompilationError,
    SystemError,
    PartialCredit,
}

impl SubmissionStatus {
    /// Get status as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Compiling => "compiling",
            Self::Judging => "judging",
            Self::Accepted => "accepted",
            Self::WrongAnswer => "wrong_answer",
            Self::TimeLimitExceeded => "time_limit_exceeded",
            Self::MemoryLimitExceeded => "memory_limit_exceeded",
            Self::RuntimeError => "runtime_error",
            Self::CompilationError => "compilation_error",
            Self::SystemError => "system_error",
            Self::PartialCredit => "partial_credit",
        }
    }

    /// Parse status from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "compiling" => Some(Self::Compiling),
            "judging" => Some(Self::Judging),
            "accepted" => Some(Self::Accepted),
            "wrong_answer" => Some(Self::WrongAnswer),
            "time_limit_exceeded" => Some(Self::TimeLimitExceeded),
            "memory_limit_exceeded" => Some(Self::MemoryLimitExceeded),
            "runtime_error" => Some(Self::RuntimeError),
            "compilation_error" => Some(Self::CompilationError),
            "system_error" => Some(Self::SystemError),
            "partial_credit" => Some(Self::PartialCredit),
            _ => None,
        }
    }

    /// Check if this is a terminal status (judging complete)
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending | Self::Compiling | Self::Judging)
    }

    /// Check if this status means the solution was accepted
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// An attempt is any submission except a compilation error; both
    /// scoring strategies rely on this.
    pub fn counts_as_attempt(&self) -> bool {
        self.is_final() && !matches!(self, Self::CompilationError)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Supported submission languages (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Java,
    Python,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpp => "cpp",
            Self::Java => "java",
            Self::Python => "python",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cpp" | "c++" => Some(Self::Cpp),
            "java" => Some(Self::Java),
            "python" | "py" => Some(Self::Python),
            _ => None,
        }
    }

    /// Interpreted languages get extra wall time
    pub fn time_multiplier(&self) -> f64 {
        match self {
            Self::Cpp => 1.0,
            Self::Java => 2.0,
            Self::Python => 3.0,
        }
    }

    /// Compiled languages get a small queue-priority bump
    pub fn is_compiled(&self) -> bool {
        matches!(self, Self::Cpp | Self::Java)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [
            "pending",
            "compiling",
            "judging",
            "accepted",
            "wrong_answer",
            "time_limit_exceeded",
            "memory_limit_exceeded",
            "runtime_error",
            "compilation_error",
            "system_error",
            "partial_credit",
        ] {
            let status = SubmissionStatus::from_str(s).unwrap();
            assert_eq!(status.as_str(), s);
        }
        assert!(SubmissionStatus::from_str("nope").is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SubmissionStatus::Pending.is_final());
        assert!(!SubmissionStatus::Compiling.is_final());
        assert!(!SubmissionStatus::Judging.is_final());
        assert!(SubmissionStatus::Accepted.is_final());
        assert!(SubmissionStatus::SystemError.is_final());
    }

    #[test]
    fn test_compilation_error_is_not_an_attempt() {
        assert!(!SubmissionStatus::CompilationError.counts_as_attempt());
        assert!(SubmissionStatus::WrongAnswer.counts_as_attempt());
        assert!(SubmissionStatus::Accepted.counts_as_attempt());
        assert!(!SubmissionStatus::Judging.counts_as_attempt());
    }

    #[test]
    fn test_language_multipliers() {
        assert_eq!(Language::Cpp.time_multiplier(), 1.0);
        assert!(Language::Python.time_multiplier() > Language::Java.time_multiplier());
        assert!(Language::Cpp.is_compiled());
        assert!(!Language::Python.is_compiled());
    }
}
