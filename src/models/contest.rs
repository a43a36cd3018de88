//! Contest model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Contest database model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contest {
    pub id: Uuid,
    pub contest_name: String,
    pub registration_code: String,
    pub start_time: DateTime<Utc>,
    /// Contest duration in minutes
    pub duration: i32,
    /// Freeze window in minutes, measured backward from the end
    pub freeze_time: i32,
    pub is_active: bool,
    pub is_frozen: bool,
    pub frozen_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub scoring_type: String,
    /// When set, automatic lifecycle transitions are disabled
    pub manual_control: bool,
}

impl Contest {
    /// Scheduled end instant
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration as i64)
    }

    /// Instant at which the leaderboard freezes (equals end when freeze_time
    /// is zero, i.e. no freeze window)
    pub fn freeze_at(&self) -> DateTime<Utc> {
        self.end_time() - Duration::minutes(self.freeze_time as i64)
    }

    /// Whether the freeze window is configured at all
    pub fn has_freeze_window(&self) -> bool {
        self.freeze_time > 0
    }

    /// Scoring strategy for this contest; fixed for its lifetime
    pub fn scoring_kind(&self) -> ScoringKind {
        ScoringKind::from_str(&self.scoring_type).unwrap_or(ScoringKind::Icpc)
    }

    /// Current lifecycle state at `now`
    pub fn state(&self, now: DateTime<Utc>) -> ContestState {
        if self.ended_at.is_some() {
            ContestState::Ended
        } else if self.is_frozen {
            ContestState::Frozen
        } else if self.is_active && now >= self.start_time {
            if now >= self.end_time() {
                ContestState::Ending
            } else {
                ContestState::Running
            }
        } else {
            ContestState::NotStarted
        }
    }

    /// Whether a new submission is accepted at `now`
    pub fn accepts_submissions(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state(now), ContestState::Running | ContestState::Frozen)
            && now < self.end_time()
    }

    /// Minutes elapsed from contest start to `at`, floored at zero
    pub fn minutes_from_start(&self, at: DateTime<Utc>) -> i64 {
        (at - self.start_time).num_minutes().max(0)
    }
}

/// Contest lifecycle state.
///
/// Transitions are monotone: not_started -> running -> (frozen)? -> ending
/// -> ended. The only backward edge is an explicit admin unfreeze
/// (frozen -> running).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestState {
    NotStarted,
    Running,
    Frozen,
    Ending,
    Ended,
}

impl std::fmt::Display for ContestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Frozen => write!(f, "frozen"),
            Self::Ending => write!(f, "ending"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// Scoring strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringKind {
    Icpc,
    Hackathon,
}

impl ScoringKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Icpc => "icpc",
            Self::Hackathon => "hackathon",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "icpc" => Some(Self::Icpc),
            "hackathon" => Some(Self::Hackathon),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScoringKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contest(start: DateTime<Utc>, duration: i32, freeze: i32) -> Contest {
        Contest {
            id: Uuid::new_v4(),
            contest_name: "Test Round".to_string(),
            registration_code: "TEST1".to_string(),
            start_time: start,
            duration,
            freeze_time: freeze,
            is_active: true,
            is_frozen: false,
            frozen_at: None,
            ended_at: None,
            scoring_type: "icpc".to_string(),
            manual_control: false,
        }
    }

    #[test]
    fn test_derived_times() {
        let start = Utc::now();
        let c = contest(start, 60, 10);
        assert_eq!(c.end_time(), start + Duration::minutes(60));
        assert_eq!(c.freeze_at(), start + Duration::minutes(50));
        assert!(c.has_freeze_window());
    }

    #[test]
    fn test_state_progression() {
        let start = Utc::now();
        let mut c = contest(start - Duration::minutes(30), 60, 0);

        assert_eq!(c.state(Utc::now()), ContestState::Running);
        assert!(c.accepts_submissions(Utc::now()));

        c.is_frozen = true;
        assert_eq!(c.state(Utc::now()), ContestState::Frozen);
        assert!(c.accepts_submissions(Utc::now()));

        c.is_frozen = false;
        c.ended_at = Some(Utc::now());
        assert_eq!(c.state(Utc::now()), ContestState::Ended);
        assert!(!c.accepts_submissions(Utc::now()));
    }

    #[test]
    fn test_not_started_before_start() {
        let c = contest(Utc::now() + Duration::minutes(5), 60, 0);
        assert_eq!(c.state(Utc::now()), ContestState::NotStarted);
        assert!(!c.accepts_submissions(Utc::now()));
    }

    #[test]
    fn test_no_submissions_after_scheduled_end() {
        let c = contest(Utc::now() - Duration::minutes(90), 60, 0);
        assert!(!c.accepts_submissions(Utc::now()));
    }
}
