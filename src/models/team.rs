//! Team model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Team database model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub team_name: String,
    /// Registration code of the contest the team belongs to
    pub contest_code: String,
    #[serde(skip_serializing)]
    pub session_token: Option<String>,
    pub is_active: bool,
    pub last_activity: DateTime<Utc>,
}

impl Team {
    /// Whether the team's session has gone stale
    pub fn session_stale(&self, now: DateTime<Utc>, timeout_minutes: i64) -> bool {
        now - self.last_activity > Duration::minutes(timeout_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_staleness() {
        let team = Team {
            id: Uuid::new_v4(),
            team_name: "rustaceans".to_string(),
            contest_code: "SPRING25".to_string(),
            session_token: None,
            is_active: true,
            last_activity: Utc::now() - Duration::minutes(30),
        };

        assert!(!team.session_stale(Utc::now(), 60));
        assert!(team.session_stale(Utc::now(), 10));
    }
}
