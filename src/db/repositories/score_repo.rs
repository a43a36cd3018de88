//! Score repository: team_scores, contest_results and frozen snapshots

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{ContestResult, FrozenLeaderboard, TeamScore},
};

/// Repository for scoring and leaderboard database operations
pub struct ScoreRepository;

impl ScoreRepository {
    /// Upsert one (contest, team, problem) score row. Runs in its own
    /// transaction: the row is replaced wholesale with the recomputed
    /// values, which keeps re-application idempotent.
    pub async fn upsert_team_score(pool: &PgPool, score: &TeamScore) -> AppResult<()> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO team_scores
                (contest_id, team_id, problem_id, solved, attempts,
                 solve_time, penalty, first_solve, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (contest_id, team_id, problem_id)
            DO UPDATE SET
                solved = EXCLUDED.solved,
                attempts = EXCLUDED.attempts,
                solve_time = EXCLUDED.solve_time,
                penalty = EXCLUDED.penalty,
                first_solve = EXCLUDED.first_solve,
                updated_at = NOW()
            "#,
        )
        .bind(score.contest_id)
        .bind(score.team_id)
        .bind(score.problem_id)
        .bind(score.solved)
        .bind(score.attempts)
        .bind(score.solve_time)
        .bind(score.penalty)
        .bind(score.first_solve)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// All score rows of a contest
    pub async fn team_scores_for_contest(
        pool: &PgPool,
        contest_id: &Uuid,
    ) -> AppResult<Vec<TeamScore>> {
        let scores = sqlx::query_as::<_, TeamScore>(
            r#"SELECT * FROM team_scores WHERE contest_id = $1"#,
        )
        .bind(contest_id)
        .fetch_all(pool)
        .await?;

        Ok(scores)
    }

    /// Replace the full ranked result set of a contest in one transaction
    /// (rank-write per the store contract).
    pub async fn write_contest_results(
        pool: &PgPool,
        contest_id: &Uuid,
        results: &[ContestResult],
    ) -> AppResult<()> {
        let mut tx = pool.begin().await?;

        for r in results {
            sqlx::query(
                r#"
                INSERT INTO contest_results
                    (contest_id, team_id, team_name, problems_solved,
                     penalty_time, total_points, rank, last_submission_time,
                     updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                ON CONFLICT (contest_id, team_id)
                DO UPDATE SET
                    team_name = EXCLUDED.team_name,
                    problems_solved = EXCLUDED.problems_solved,
                    penalty_time = EXCLUDED.penalty_time,
                    total_points = EXCLUDED.total_points,
                    rank = EXCLUDED.rank,
                    last_submission_time = EXCLUDED.last_submission_time,
                    updated_at = NOW()
                "#,
            )
            .bind(contest_id)
            .bind(r.team_id)
            .bind(&r.team_name)
            .bind(r.problems_solved)
            .bind(r.penalty_time)
            .bind(r.total_points)
            .bind(r.rank)
            .bind(r.last_submission_time)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Ranked results of a contest (the real, unfrozen view)
    pub async fn contest_results(pool: &PgPool, contest_id: &Uuid) -> AppResult<Vec<ContestResult>> {
        let results = sqlx::query_as::<_, ContestResult>(
            r#"SELECT * FROM contest_results WHERE contest_id = $1 ORDER BY rank, team_name"#,
        )
        .bind(contest_id)
        .fetch_all(pool)
        .await?;

        Ok(results)
    }

    /// Store the frozen snapshot for a contest
    pub async fn save_frozen_snapshot(
        pool: &PgPool,
        contest_id: &Uuid,
        snapshot: &serde_json::Value,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO frozen_leaderboards (contest_id, snapshot, frozen_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (contest_id)
            DO UPDATE SET snapshot = EXCLUDED.snapshot, frozen_at = NOW()
            "#,
        )
        .bind(contest_id)
        .bind(snapshot)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Load the frozen snapshot, if one exists
    pub async fn frozen_snapshot(
        pool: &PgPool,
        contest_id: &Uuid,
    ) -> AppResult<Option<FrozenLeaderboard>> {
        let snapshot = sqlx::query_as::<_, FrozenLeaderboard>(
            r#"SELECT * FROM frozen_leaderboards WHERE contest_id = $1"#,
        )
        .bind(contest_id)
        .fetch_optional(pool)
        .await?;

        Ok(snapshot)
    }

    /// Retire the frozen snapshot (unfreeze or publish)
    pub async fn delete_frozen_snapshot(pool: &PgPool, contest_id: &Uuid) -> AppResult<()> {
        sqlx::query(r#"DELETE FROM frozen_leaderboards WHERE contest_id = $1"#)
            .bind(contest_id)
            .execute(pool)
            .await?;

        Ok(())
    }
}
