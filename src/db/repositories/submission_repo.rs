//! Submission repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{error::AppResult, models::Submission};

/// Repository for submission database operations
pub struct SubmissionRepository;

impl SubmissionRepository {
    /// Create a new submission in `pending` status
    pub async fn create(
        pool: &PgPool,
        team_id: &Uuid,
        problem_id: &Uuid,
        contest_id: &Uuid,
        language: &str,
        source_code: &str,
    ) -> AppResult<Submission> {
        let submission = sqlx::query_as::<_, Submission>(
            r#"
            INSERT INTO submissions (team_id, problem_id, contest_id, language, source_code)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(team_id)
        .bind(problem_id)
        .bind(contest_id)
        .bind(language)
        .bind(source_code)
        .fetch_one(pool)
        .await?;

        Ok(submission)
    }

    /// Find submission by ID
    pub async fn find_by_id(pool: &PgPool, id: &Uuid) -> AppResult<Option<Submission>> {
        let submission =
            sqlx::query_as::<_, Submission>(r#"SELECT * FROM submissions WHERE id = $1"#)
                .bind(id)
                .fetch_optional(pool)
                .await?;

        Ok(submission)
    }

    /// All finalized submissions of a contest in chronological order
    /// (scoring input)
    pub async fn list_finalized_for_contest(
        pool: &PgPool,
        contest_id: &Uuid,
    ) -> AppResult<Vec<Submission>> {
        let submissions = sqlx::query_as::<_, Submission>(
            r#"
            SELECT * FROM submissions
            WHERE contest_id = $1
              AND status NOT IN ('pending', 'compiling', 'judging')
            ORDER BY submission_time
            "#,
        )
        .bind(contest_id)
        .fetch_all(pool)
        .await?;

        Ok(submissions)
    }

    /// Finalized submissions of one team on one problem, chronological
    pub async fn list_finalized_for_team_problem(
        pool: &PgPool,
        team_id: &Uuid,
        problem_id: &Uuid,
    ) -> AppResult<Vec<Submission>> {
        let submissions = sqlx::query_as::<_, Submission>(
            r#"
            SELECT * FROM submissions
            WHERE team_id = $1
              AND problem_id = $2
              AND status NOT IN ('pending', 'compiling', 'judging')
            ORDER BY submission_time
            "#,
        )
        .bind(team_id)
        .bind(problem_id)
        .fetch_all(pool)
        .await?;

        Ok(submissions)
    }

    /// Update a non-terminal progress status (compiling / judging)
    pub async fn update_status(pool: &PgPool, id: &Uuid, status: &str) -> AppResult<()> {
        sqlx::query(r#"UPDATE submissions SET status = $2 WHERE id = $1"#)
            .bind(id)
            .bind(status)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Write the terminal judging result. The submission id is the
    /// idempotency key: a re-delivered job overwrites with identical data
    /// rather than duplicating.
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize(
        pool: &PgPool,
        id: &Uuid,
        status: &str,
        execution_time: Option<i32>,
        memory_used: Option<i32>,
        points_earned: Option<f64>,
        test_cases_passed: Option<i32>,
        total_test_cases: Option<i32>,
        judge_output: Option<&serde_json::Value>,
    ) -> AppResult<Submission> {
        let submission = sqlx::query_as::<_, Submission>(
            r#"
            UPDATE submissions
            SET status = $2,
                execution_time = $3,
                memory_used = $4,
                points_earned = $5,
                test_cases_passed = $6,
                total_test_cases = $7,
                judge_output = $8,
                judged_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(execution_time)
        .bind(memory_used)
        .bind(points_earned)
        .bind(test_cases_passed)
        .bind(total_test_cases)
        .bind(judge_output)
        .fetch_one(pool)
        .await?;

        Ok(submission)
    }

    /// Administrative re-judge: push the current result into the
    /// judge_output history and reset the submission to pending.
    pub async fn reset_for_rejudge(pool: &PgPool, id: &Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE submissions
            SET judge_output = jsonb_set(
                    COALESCE(judge_output, '{}'::jsonb),
                    '{history}',
                    COALESCE(judge_output -> 'history', '[]'::jsonb)
                        || jsonb_build_object(
                               'status', status,
                               'judged_at', judged_at,
                               'detail', judge_output -> 'cases')
                ),
                status = 'pending',
                judged_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Count pending-pipeline submissions scoped to one contest (grace
    /// period drain check)
    pub async fn pending_count_for_contest(pool: &PgPool, contest_id: &Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM submissions
            WHERE contest_id = $1
              AND status IN ('pending', 'compiling', 'judging')
            "#,
        )
        .bind(contest_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Force-finalize every still-pending submission of a contest
    /// (grace-period expiry). Returns the ids affected.
    pub async fn force_finalize_pending(
        pool: &PgPool,
        contest_id: &Uuid,
        status: &str,
        judged_at: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE submissions
            SET status = $2, judged_at = $3
            WHERE contest_id = $1
              AND status IN ('pending', 'compiling', 'judging')
            RETURNING id
            "#,
        )
        .bind(contest_id)
        .bind(status)
        .bind(judged_at)
        .fetch_all(pool)
        .await?;

        Ok(ids)
    }
}
