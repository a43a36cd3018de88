//! Team repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::{error::AppResult, models::Team};

/// Repository for team database operations
pub struct TeamRepository;

impl TeamRepository {
    /// Find team by ID
    pub async fn find_by_id(pool: &PgPool, id: &Uuid) -> AppResult<Option<Team>> {
        let team = sqlx::query_as::<_, Team>(r#"SELECT * FROM teams WHERE id = $1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(team)
    }

    /// List active teams registered to a contest code
    pub async fn list_for_contest_code(pool: &PgPool, code: &str) -> AppResult<Vec<Team>> {
        let teams = sqlx::query_as::<_, Team>(
            r#"SELECT * FROM teams WHERE contest_code = $1 AND is_active ORDER BY team_name"#,
        )
        .bind(code)
        .fetch_all(pool)
        .await?;

        Ok(teams)
    }

    /// Touch the team's last activity timestamp
    pub async fn touch_activity(pool: &PgPool, id: &Uuid) -> AppResult<()> {
        sqlx::query(r#"UPDATE teams SET last_activity = NOW() WHERE id = $1"#)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Count a team's submissions within the trailing window (queue
    /// fairness input)
    pub async fn recent_submission_count(
        pool: &PgPool,
        team_id: &Uuid,
        window_minutes: i64,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM submissions
            WHERE team_id = $1
              AND submission_time > NOW() - ($2 * INTERVAL '1 minute')
            "#,
        )
        .bind(team_id)
        .bind(window_minutes)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}
