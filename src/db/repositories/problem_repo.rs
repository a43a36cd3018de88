//! Problem repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Problem, TestCase},
};

/// Repository for problem and test case database operations
pub struct ProblemRepository;

impl ProblemRepository {
    /// Find problem by ID
    pub async fn find_by_id(pool: &PgPool, id: &Uuid) -> AppResult<Option<Problem>> {
        let problem = sqlx::query_as::<_, Problem>(r#"SELECT * FROM problems WHERE id = $1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(problem)
    }

    /// Get all test cases of a problem in ordinal order
    pub async fn get_test_cases(pool: &PgPool, problem_id: &Uuid) -> AppResult<Vec<TestCase>> {
        let cases = sqlx::query_as::<_, TestCase>(
            r#"SELECT * FROM test_cases WHERE problem_id = $1 ORDER BY ordinal"#,
        )
        .bind(problem_id)
        .fetch_all(pool)
        .await?;

        Ok(cases)
    }
}
