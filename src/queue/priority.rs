//! Queue priority function
//!
//! Higher runs first. The priority is a deterministic nonnegative integer
//! combining recency, contest urgency, team fairness, an admin override and
//! a small throughput bias toward compiled languages.

use crate::constants::{
    PRIORITY_ADMIN_BONUS, PRIORITY_COMPILED_BONUS, PRIORITY_FAIRNESS_BASE,
    PRIORITY_FAIRNESS_STEP, PRIORITY_RECENCY_MAX, PRIORITY_URGENCY_BONUS,
    PRIORITY_URGENCY_WINDOW_MINS,
};
use crate::models::Language;

/// Inputs to the priority function
#[derive(Debug, Clone, Copy)]
pub struct PriorityInputs {
    /// Minutes since the submission was received
    pub age_minutes: i64,
    /// Minutes until the contest's scheduled end, if known
    pub contest_minutes_remaining: Option<i64>,
    /// The team's submissions in the recent window
    pub team_recent_submissions: i64,
    /// Admin re-judge / priority flag
    pub admin_override: bool,
    pub language: Language,
}

/// Compute the queue priority for a submission
pub fn compute_priority(inputs: &PriorityInputs) -> i64 {
    let mut priority: i64 = 0;

    // Recency: +100 fresh, linearly down to 0 after an hour
    let age = inputs.age_minutes.clamp(0, 60);
    priority += PRIORITY_RECENCY_MAX * (60 - age) / 60;

    // Contest urgency: the final stretch judges first
    if let Some(remaining) = inputs.contest_minutes_remaining {
        if (0..=PRIORITY_URGENCY_WINDOW_MINS).contains(&remaining) {
            priority += PRIORITY_URGENCY_BONUS;
        }
    }

    // Team fairness: spamming teams decay toward zero bonus
    priority += (PRIORITY_FAIRNESS_BASE
        - PRIORITY_FAIRNESS_STEP * inputs.team_recent_submissions)
        .max(0);

    if inputs.admin_override {
        priority += PRIORITY_ADMIN_BONUS;
    }

    if inputs.language.is_compiled() {
        priority += PRIORITY_COMPILED_BONUS;
    }

    priority.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PriorityInputs {
        PriorityInputs {
            age_minutes: 0,
            contest_minutes_remaining: Some(120),
            team_recent_submissions: 0,
            admin_override: false,
            language: Language::Python,
        }
    }

    #[test]
    fn test_deterministic() {
        let inputs = base();
        assert_eq!(compute_priority(&inputs), compute_priority(&inputs));
    }

    #[test]
    fn test_recency_decays_linearly() {
        let fresh = compute_priority(&base());
        let half = compute_priority(&PriorityInputs {
            age_minutes: 30,
            ..base()
        });
        let stale = compute_priority(&PriorityInputs {
            age_minutes: 90,
            ..base()
        });

        assert_eq!(fresh - half, 50);
        assert_eq!(fresh - stale, 100);
    }

    #[test]
    fn test_contest_urgency_window() {
        let urgent = compute_priority(&PriorityInputs {
            contest_minutes_remaining: Some(15),
            ..base()
        });
        let calm = compute_priority(&PriorityInputs {
            contest_minutes_remaining: Some(45),
            ..base()
        });
        assert_eq!(urgent - calm, PRIORITY_URGENCY_BONUS);

        // An already-ended contest gets no urgency bonus
        let over = compute_priority(&PriorityInputs {
            contest_minutes_remaining: Some(-5),
            ..base()
        });
        assert_eq!(over, calm);
    }

    #[test]
    fn test_fairness_floors_at_zero() {
        let quiet = compute_priority(&PriorityInputs {
            team_recent_submissions: 0,
            ..base()
        });
        let busy = compute_priority(&PriorityInputs {
            team_recent_submissions: 3,
            ..base()
        });
        let spammy = compute_priority(&PriorityInputs {
            team_recent_submissions: 50,
            ..base()
        });

        assert_eq!(quiet - busy, 15);
        assert_eq!(quiet - spammy, PRIORITY_FAIRNESS_BASE);
    }

    #[test]
    fn test_admin_override_dominates() {
        // Two submissions at the same instant, equal base priority: the
        // flagged one must sort first
        let plain = compute_priority(&base());
        let flagged = compute_priority(&PriorityInputs {
            admin_override: true,
            ..base()
        });

        assert_eq!(flagged - plain, PRIORITY_ADMIN_BONUS);
        assert!(flagged > plain);
    }

    #[test]
    fn test_compiled_language_bias() {
        let py = compute_priority(&base());
        let cpp = compute_priority(&PriorityInputs {
            language: Language::Cpp,
            ..base()
        });
        assert_eq!(cpp - py, PRIORITY_COMPILED_BONUS);
    }
}
