//! Problem model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Problem database model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Problem {
    pub id: Uuid,
    pub contest_id: Uuid,
    pub problem_letter: String,
    pub title: String,
    /// Per-test wall-time limit in milliseconds
    pub time_limit: i32,
    /// Per-test memory limit in megabytes
    pub memory_limit: i32,
    /// Points awarded for a full solve (Hackathon scoring only)
    pub points_value: i32,
    /// Opt-in: compare outputs as JSON documents
    pub structured_judging: bool,
    /// Opt-in: numeric comparison with 1e-6 tolerance
    pub float_tolerance: bool,
}

impl Problem {
    /// Time limit in seconds
    pub fn time_limit_seconds(&self) -> f64 {
        self.time_limit as f64 / 1000.0
    }
}
