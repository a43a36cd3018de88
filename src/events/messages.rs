//! Wire messages carried by the event bus
//!
//! Every message serializes to JSON with a `type` discriminator, an
//! ISO-8601 `timestamp`, and a type-specific payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Contest, Leaderboard, Submission};

/// Envelope adding the timestamp to a typed payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventMessage {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Wire discriminator, as serialized into `type`
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            EventPayload::Queued { .. } => "queued",
            EventPayload::VerdictUpdate { .. } => "verdict_update",
            EventPayload::SubmissionResult(_) => "submission_result",
            EventPayload::LeaderboardUpdate { .. } => "leaderboard_update",
            EventPayload::ContestStarted { .. } => "contest_started",
            EventPayload::ContestFrozen { .. } => "contest_frozen",
            EventPayload::ContestUnfrozen { .. } => "contest_unfrozen",
            EventPayload::ContestEnded { .. } => "contest_ended",
        }
    }
}

/// Typed payloads, discriminated by `type` on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Queued {
        submission_id: Uuid,
        position: u64,
        eta_seconds: u64,
    },
    VerdictUpdate {
        submission_id: Uuid,
        status: String,
        current: i32,
        total: i32,
    },
    SubmissionResult(SubmissionResultPayload),
    LeaderboardUpdate {
        contest_id: Uuid,
        leaderboard: Leaderboard,
        contest_state: String,
    },
    ContestStarted {
        contest: ContestSnapshot,
    },
    ContestFrozen {
        contest: ContestSnapshot,
    },
    ContestUnfrozen {
        contest: ContestSnapshot,
    },
    ContestEnded {
        contest: ContestSnapshot,
    },
}

/// Submission result as broadcast. The public variant (contest room)
/// hides per-case detail; the full variant (team, admins) carries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResultPayload {
    pub submission_id: Uuid,
    pub team_id: Uuid,
    pub problem_id: Uuid,
    pub contest_id: Uuid,
    pub status: String,
    pub execution_time_ms: Option<i32>,
    pub memory_used_mb: Option<i32>,
    pub points_earned: Option<f64>,
    pub test_cases_passed: Option<i32>,
    pub total_test_cases: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl SubmissionResultPayload {
    /// Full view for the owning team and admins
    pub fn full(submission: &Submission) -> Self {
        Self {
            submission_id: submission.id,
            team_id: submission.team_id,
            problem_id: submission.problem_id,
            contest_id: submission.contest_id,
            status: submission.status.clone(),
            execution_time_ms: submission.execution_time,
            memory_used_mb: submission.memory_used,
            points_earned: submission.points_earned,
            test_cases_passed: submission.test_cases_passed,
            total_test_cases: submission.total_test_cases,
            detail: submission.judge_output.clone(),
        }
    }

    /// Public view for the contest room: no source, no per-case detail
    pub fn public(submission: &Submission) -> Self {
        let mut payload = Self::full(submission);
        payload.detail = None;
        payload
    }
}

/// Contest state as carried by lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestSnapshot {
    pub id: Uuid,
    pub contest_name: String,
    pub state: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub freeze_at: DateTime<Utc>,
    pub is_frozen: bool,
}

impl ContestSnapshot {
    pub fn of(contest: &Contest) -> Self {
        Self {
            id: contest.id,
            contest_name: contest.contest_name.clone(),
            state: contest.state(Utc::now()).to_string(),
            start_time: contest.start_time,
            end_time: contest.end_time(),
            freeze_at: contest.freeze_at(),
            is_frozen: contest.is_frozen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let msg = EventMessage::new(EventPayload::Queued {
            submission_id: Uuid::new_v4(),
            position: 3,
            eta_seconds: 45,
        });

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "queued");
        assert_eq!(value["position"], 3);
        assert!(value["timestamp"].is_string());
        assert_eq!(msg.kind(), "queued");
    }

    #[test]
    fn test_verdict_update_fields() {
        let msg = EventMessage::new(EventPayload::VerdictUpdate {
            submission_id: Uuid::new_v4(),
            status: "judging".to_string(),
            current: 2,
            total: 10,
        });

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "verdict_update");
        assert_eq!(value["current"], 2);
        assert_eq!(value["total"], 10);
    }
}
