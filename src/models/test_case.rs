//! Test case model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Test case database model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TestCase {
    pub id: Uuid,
    pub problem_id: Uuid,
    /// 1-indexed position within the problem
    pub ordinal: i32,
    pub input: String,
    pub expected_output: String,
    pub is_sample: bool,
    pub is_hidden: bool,
    /// Per-case points (partial-credit problems only)
    pub points: Option<i32>,
}
