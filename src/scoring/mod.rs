//! Scoring strategies
//!
//! One interface, two implementations selected per contest by its
//! scoring_type. Strategies recompute score rows from the full submission
//! history rather than incrementing counters, so re-applying a finalized
//! submission (re-judge, queue re-delivery) cannot double-count. They
//! mutate only team_scores and contest_results.

pub mod hackathon;
pub mod icpc;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::{Contest, ContestResult, ScoringKind, Submission};

pub use hackathon::HackathonScoring;
pub use icpc::IcpcScoring;

/// Strategy interface. Implementations are stateless; everything is
/// derived from the stored submission history.
#[async_trait]
pub trait ScoringStrategy: Send + Sync {
    fn kind(&self) -> ScoringKind;

    /// Apply one finalized submission: upsert the affected TeamScore row
    /// and refresh the contest's ranked results. Idempotent.
    async fn on_submission_finalized(
        &self,
        pool: &PgPool,
        contest: &Contest,
        submission: &Submission,
    ) -> AppResult<()>;

    /// Recompute the full ranked result set of a contest
    async fn compute_contest_results(
        &self,
        pool: &PgPool,
        contest: &Contest,
    ) -> AppResult<Vec<ContestResult>>;

    /// Rank a result set with the strategy's lexicographic key. Ties share
    /// rank numbers; the next distinct team's rank equals its index + 1.
    fn rank(&self, results: Vec<ContestResult>) -> Vec<ContestResult>;
}

/// Resolve the strategy for a contest's scoring kind
pub fn strategy_for(kind: ScoringKind) -> Arc<dyn ScoringStrategy> {
    match kind {
        ScoringKind::Icpc => Arc::new(IcpcScoring),
        ScoringKind::Hackathon => Arc::new(HackathonScoring),
    }
}

/// Shared rank assignment: `sorted` must already be in key order;
/// `tied` reports whether two adjacent rows share a rank.
pub(crate) fn assign_ranks<F>(mut sorted: Vec<ContestResult>, tied: F) -> Vec<ContestResult>
where
    F: Fn(&ContestResult, &ContestResult) -> bool,
{
    let mut last_rank = 1;
    for index in 0..sorted.len() {
        if index == 0 {
            last_rank = 1;
        } else if !tied(&sorted[index - 1], &sorted[index]) {
            last_rank = (index + 1) as i32;
        }
        sorted[index].rank = last_rank;
    }
    sorted
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    use crate::models::{Contest, Submission, SubmissionStatus, Team};

    pub fn contest(scoring_type: &str, start: DateTime<Utc>, duration: i32) -> Contest {
        Contest {
            id: Uuid::new_v4(),
            contest_name: "Qualifier".to_string(),
            registration_code: "QUAL".to_string(),
            start_time: start,
            duration,
            freeze_time: 0,
            is_active: true,
            is_frozen: false,
            frozen_at: None,
            ended_at: None,
            scoring_type: scoring_type.to_string(),
            manual_control: false,
        }
    }

    pub fn team(name: &str) -> Team {
        Team {
            id: Uuid::new_v4(),
            team_name: name.to_string(),
            contest_code: "QUAL".to_string(),
            session_token: None,
            is_active: true,
            last_activity: Utc::now(),
        }
    }

    pub fn submission(
        contest: &Contest,
        team_id: Uuid,
        problem_id: Uuid,
        minutes_from_start: i64,
        status: SubmissionStatus,
        points: Option<f64>,
        passed: i32,
        total: i32,
    ) -> Submission {
        Submission {
            id: Uuid::new_v4(),
            team_id,
            problem_id,
            contest_id: contest.id,
            language: "cpp".to_string(),
            source_code: String::new(),
            submission_time: contest.start_time + Duration::minutes(minutes_from_start),
            status: status.as_str().to_string(),
            judged_at: Some(contest.start_time + Duration::minutes(minutes_from_start)),
            execution_time: Some(10),
            memory_used: Some(16),
            points_earned: points,
            test_cases_passed: Some(passed),
            total_test_cases: Some(total),
            judge_output: None,
        }
    }
}
