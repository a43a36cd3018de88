//! Scoring and leaderboard models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per (contest, team, problem) score row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TeamScore {
    pub contest_id: Uuid,
    pub team_id: Uuid,
    pub problem_id: Uuid,
    pub solved: bool,
    /// Attempts up to and including the first accept; compilation errors
    /// never count
    pub attempts: i32,
    /// Minutes from contest start, inclusive of wrong-attempt penalty
    pub solve_time: Option<i32>,
    /// Wrong-attempt penalty minutes alone
    pub penalty: i32,
    pub first_solve: bool,
    pub updated_at: DateTime<Utc>,
}

/// Per (contest, team) aggregate row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ContestResult {
    pub contest_id: Uuid,
    pub team_id: Uuid,
    pub team_name: String,
    pub problems_solved: i32,
    /// ICPC: sum of per-problem solve times (penalty inclusive)
    pub penalty_time: i32,
    /// Hackathon: sum of best per-problem points
    pub total_points: f64,
    pub rank: i32,
    pub last_submission_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Frozen leaderboard snapshot, captured at the freeze instant
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FrozenLeaderboard {
    pub contest_id: Uuid,
    /// Ranked rows as captured at freeze time
    pub snapshot: serde_json::Value,
    pub frozen_at: DateTime<Utc>,
}

/// One display row of a leaderboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub rank: i32,
    pub team_id: Uuid,
    pub team_name: String,
    pub problems_solved: i32,
    pub penalty_time: i32,
    pub total_points: f64,
    pub last_submission_time: Option<DateTime<Utc>>,
}

impl From<&ContestResult> for LeaderboardRow {
    fn from(r: &ContestResult) -> Self {
        Self {
            rank: r.rank,
            team_id: r.team_id,
            team_name: r.team_name.clone(),
            problems_solved: r.problems_solved,
            penalty_time: r.penalty_time,
            total_points: r.total_points,
            last_submission_time: r.last_submission_time,
        }
    }
}

/// A display leaderboard, either live or a frozen snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaderboard {
    pub contest_id: Uuid,
    pub rows: Vec<LeaderboardRow>,
    pub is_frozen: bool,
    pub frozen_at: Option<DateTime<Utc>>,
    pub generated_at: DateTime<Utc>,
}

impl Leaderboard {
    /// Build a live leaderboard from ranked contest results
    pub fn live(contest_id: Uuid, results: &[ContestResult]) -> Self {
        Self {
            contest_id,
            rows: results.iter().map(LeaderboardRow::from).collect(),
            is_frozen: false,
            frozen_at: None,
            generated_at: Utc::now(),
        }
    }

    /// Rehydrate a frozen snapshot
    pub fn from_snapshot(frozen: &FrozenLeaderboard) -> Self {
        let rows: Vec<LeaderboardRow> =
            serde_json::from_value(frozen.snapshot.clone()).unwrap_or_default();
        Self {
            contest_id: frozen.contest_id,
            rows,
            is_frozen: true,
            frozen_at: Some(frozen.frozen_at),
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(team_name: &str, solved: i32, rank: i32) -> ContestResult {
        ContestResult {
            contest_id: Uuid::nil(),
            team_id: Uuid::new_v4(),
            team_name: team_name.to_string(),
            problems_solved: solved,
            penalty_time: 40,
            total_points: 0.0,
            rank,
            last_submission_time: Some(Utc::now()),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_snapshot_survives_later_score_changes() {
        // A snapshot captured at freeze time still shows the old standings
        // after the real rows move on
        let contest_id = Uuid::new_v4();
        let at_freeze = vec![result("gamma", 2, 3)];

        let frozen = FrozenLeaderboard {
            contest_id,
            snapshot: serde_json::to_value(
                Leaderboard::live(contest_id, &at_freeze).rows,
            )
            .unwrap(),
            frozen_at: Utc::now(),
        };

        // The real rows update during the freeze window
        let live_now = vec![result("gamma", 3, 1)];
        let display = Leaderboard::from_snapshot(&frozen);
        let real = Leaderboard::live(contest_id, &live_now);

        assert!(display.is_frozen);
        assert_eq!(display.rows[0].problems_solved, 2);
        assert_eq!(display.rows[0].rank, 3);

        assert!(!real.is_frozen);
        assert_eq!(real.rows[0].problems_solved, 3);
    }

    #[test]
    fn test_malformed_snapshot_degrades_to_empty() {
        let frozen = FrozenLeaderboard {
            contest_id: Uuid::new_v4(),
            snapshot: serde_json::json!("not rows"),
            frozen_at: Utc::now(),
        };
        assert!(Leaderboard::from_snapshot(&frozen).rows.is_empty());
    }
}
