//! Contest repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{error::AppResult, models::Contest};

/// Repository for contest database operations
pub struct ContestRepository;

impl ContestRepository {
    /// Find contest by ID
    pub async fn find_by_id(pool: &PgPool, id: &Uuid) -> AppResult<Option<Contest>> {
        let contest = sqlx::query_as::<_, Contest>(r#"SELECT * FROM contests WHERE id = $1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(contest)
    }

    /// List contests that are not yet ended (lifecycle scheduler input)
    pub async fn list_unfinished(pool: &PgPool) -> AppResult<Vec<Contest>> {
        let contests = sqlx::query_as::<_, Contest>(
            r#"SELECT * FROM contests WHERE ended_at IS NULL ORDER BY start_time"#,
        )
        .fetch_all(pool)
        .await?;

        Ok(contests)
    }

    /// Mark a contest as started
    pub async fn mark_started(pool: &PgPool, id: &Uuid) -> AppResult<()> {
        sqlx::query(r#"UPDATE contests SET is_active = TRUE WHERE id = $1"#)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Mark a contest as frozen
    pub async fn mark_frozen(
        pool: &PgPool,
        id: &Uuid,
        frozen_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(r#"UPDATE contests SET is_frozen = TRUE, frozen_at = $2 WHERE id = $1"#)
            .bind(id)
            .bind(frozen_at)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Clear the frozen flag (admin unfreeze or contest end)
    pub async fn mark_unfrozen(pool: &PgPool, id: &Uuid) -> AppResult<()> {
        sqlx::query(r#"UPDATE contests SET is_frozen = FALSE, frozen_at = NULL WHERE id = $1"#)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Mark a contest as ended
    pub async fn mark_ended(pool: &PgPool, id: &Uuid, ended_at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE contests
            SET ended_at = $2, is_active = FALSE, is_frozen = FALSE
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ended_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Count problems attached to a contest
    pub async fn problem_count(pool: &PgPool, id: &Uuid) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM problems WHERE contest_id = $1"#)
                .bind(id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    /// Count problems without any test cases (auto-start validation)
    pub async fn problems_missing_test_cases(pool: &PgPool, id: &Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM problems p
            WHERE p.contest_id = $1
              AND NOT EXISTS (SELECT 1 FROM test_cases t WHERE t.problem_id = p.id)
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}
