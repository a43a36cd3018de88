//! Contest lifecycle scheduler
//!
//! A single periodic ticker drives every contest through
//! not_started -> running -> (frozen)? -> ending -> ended, applying at
//! most one transition per contest per tick. Contest end waits out a
//! bounded grace period for the contest's pending submissions before
//! force-finalizing the stragglers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use tokio::time::{interval, sleep, Duration};

use crate::constants::{GRACE_POLL_SECS, LIFECYCLE_TICK_SECS};
use crate::db::repositories::{ContestRepository, ScoreRepository, SubmissionRepository};
use crate::error::AppResult;
use crate::events::{
    ContestSnapshot, EventMessage, EventPayload, EventSink, Room, SubmissionResultPayload,
};
use crate::leaderboard::LeaderboardController;
use crate::models::{Contest, ContestState, SubmissionStatus};
use crate::scoring::strategy_for;

/// The single transition a tick may apply to one contest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Freeze,
    End,
}

/// Decide the next transition for a contest at `now`, if any
pub fn planned_transition(contest: &Contest, now: DateTime<Utc>) -> Option<Transition> {
    if contest.manual_control {
        return None;
    }

    match contest.state(now) {
        ContestState::NotStarted if now >= contest.start_time => Some(Transition::Start),
        ContestState::Running
            if contest.has_freeze_window() && now >= contest.freeze_at() =>
        {
            Some(Transition::Freeze)
        }
        ContestState::Ending => Some(Transition::End),
        ContestState::Frozen if now >= contest.end_time() => Some(Transition::End),
        _ => None,
    }
}

pub struct ContestScheduler {
    pool: PgPool,
    events: Arc<dyn EventSink>,
    leaderboard: Arc<LeaderboardController>,
    grace_period_secs: u64,
}

impl ContestScheduler {
    pub fn new(
        pool: PgPool,
        events: Arc<dyn EventSink>,
        leaderboard: Arc<LeaderboardController>,
        grace_period_secs: u64,
    ) -> Self {
        Self {
            pool,
            events,
            leaderboard,
            grace_period_secs,
        }
    }

    /// Minute ticker; one tick in flight at a time
    pub async fn run(self: Arc<Self>, shutdown: Arc<AtomicBool>) {
        let mut ticker = interval(Duration::from_secs(LIFECYCLE_TICK_SECS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = self.tick().await {
                tracing::error!("lifecycle tick failed: {}", e);
            }
        }

        tracing::info!("contest scheduler shutting down");
    }

    /// Apply at most one transition to every unfinished contest
    pub async fn tick(&self) -> AppResult<()> {
        let contests = ContestRepository::list_unfinished(&self.pool).await?;
        let now = Utc::now();

        for contest in contests {
            let Some(transition) = planned_transition(&contest, now) else {
                continue;
            };

            let result = match transition {
                Transition::Start => self.start_contest(&contest).await,
                Transition::Freeze => self.freeze_contest(&contest).await,
                Transition::End => self.end_contest(&contest).await,
            };

            if let Err(e) = result {
                tracing::warn!(
                    contest_id = %contest.id,
                    transition = ?transition,
                    "contest transition failed: {}",
                    e
                );
            }
        }

        Ok(())
    }

    /// Start a contest, gated on it actually being runnable. Driven by the
    /// ticker, or by an admin when manual_control is set.
    pub async fn start_contest(&self, contest: &Contest) -> AppResult<()> {
        let problems = ContestRepository::problem_count(&self.pool, &contest.id).await?;
        if problems == 0 {
            tracing::warn!(
                contest_id = %contest.id,
                "auto-start skipped: contest has no problems"
            );
            return Ok(());
        }

        let missing =
            ContestRepository::problems_missing_test_cases(&self.pool, &contest.id).await?;
        if missing > 0 {
            tracing::warn!(
                contest_id = %contest.id,
                problems_without_tests = missing,
                "auto-start skipped: problems lack test cases"
            );
            return Ok(());
        }

        ContestRepository::mark_started(&self.pool, &contest.id).await?;

        let mut started = contest.clone();
        started.is_active = true;
        self.emit_contest_event(&started, |snapshot| EventPayload::ContestStarted {
            contest: snapshot,
        });

        tracing::info!(contest_id = %contest.id, name = %contest.contest_name, "contest started");
        Ok(())
    }

    pub async fn freeze_contest(&self, contest: &Contest) -> AppResult<()> {
        self.leaderboard.freeze(contest).await?;

        let mut frozen = contest.clone();
        frozen.is_frozen = true;
        frozen.frozen_at = Some(Utc::now());
        self.emit_contest_event(&frozen, |snapshot| EventPayload::ContestFrozen {
            contest: snapshot,
        });

        tracing::info!(contest_id = %contest.id, "contest frozen");
        Ok(())
    }

    /// Admin unfreeze; the only backward transition
    pub async fn unfreeze_contest(&self, contest: &Contest) -> AppResult<()> {
        self.leaderboard.unfreeze(contest).await?;

        let mut unfrozen = contest.clone();
        unfrozen.is_frozen = false;
        unfrozen.frozen_at = None;
        self.emit_contest_event(&unfrozen, |snapshot| EventPayload::ContestUnfrozen {
            contest: snapshot,
        });

        Ok(())
    }

    /// Contest end: drain in-flight submissions within the grace bound,
    /// force-finalize the rest, publish final ranks.
    pub async fn end_contest(&self, contest: &Contest) -> AppResult<()> {
        // Intake already rejects submissions past end_time; wait for the
        // pipeline to drain this contest's backlog.
        let deadline =
            contest.end_time() + ChronoDuration::seconds(self.grace_period_secs as i64);

        loop {
            let pending =
                SubmissionRepository::pending_count_for_contest(&self.pool, &contest.id).await?;
            if pending == 0 {
                break;
            }

            let now = Utc::now();
            if now >= deadline {
                let forced = SubmissionRepository::force_finalize_pending(
                    &self.pool,
                    &contest.id,
                    SubmissionStatus::TimeLimitExceeded.as_str(),
                    now,
                )
                .await?;
                tracing::warn!(
                    contest_id = %contest.id,
                    forced = forced.len(),
                    "grace period expired; pending submissions force-finalized"
                );
                for id in forced {
                    if let Some(submission) =
                        SubmissionRepository::find_by_id(&self.pool, &id).await?
                    {
                        self.events.emit_many(
                            &[Room::Team(submission.team_id), Room::Admins],
                            EventMessage::new(EventPayload::SubmissionResult(
                                SubmissionResultPayload::full(&submission),
                            )),
                        );
                        self.events.emit(
                            Room::Contest(contest.id),
                            EventMessage::new(EventPayload::SubmissionResult(
                                SubmissionResultPayload::public(&submission),
                            )),
                        );
                    }
                }
                break;
            }

            let remaining = (deadline - now).num_seconds().max(1) as u64;
            sleep(Duration::from_secs(GRACE_POLL_SECS.min(remaining))).await;

            tracing::debug!(
                contest_id = %contest.id,
                pending,
                grace_left = %crate::utils::time::format_duration(deadline - now),
                "waiting for contest pipeline to drain"
            );
        }

        let ended_at = Utc::now();
        ContestRepository::mark_ended(&self.pool, &contest.id, ended_at).await?;

        // Final ranks from the complete submission history, then reveal
        let strategy = strategy_for(contest.scoring_kind());
        let results = strategy.compute_contest_results(&self.pool, contest).await?;
        ScoreRepository::write_contest_results(&self.pool, &contest.id, &results).await?;
        self.leaderboard.publish_final(&contest.id).await?;

        let mut ended = contest.clone();
        ended.ended_at = Some(ended_at);
        ended.is_frozen = false;
        self.emit_contest_event(&ended, |snapshot| EventPayload::ContestEnded {
            contest: snapshot,
        });

        tracing::info!(contest_id = %contest.id, name = %contest.contest_name, "contest ended");
        Ok(())
    }

    fn emit_contest_event<F>(&self, contest: &Contest, payload: F)
    where
        F: Fn(ContestSnapshot) -> EventPayload,
    {
        let snapshot = ContestSnapshot::of(contest);
        self.events.emit_many(
            &[Room::Contest(contest.id), Room::Admins],
            EventMessage::new(payload(snapshot)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn contest(start_offset_mins: i64, duration: i32, freeze: i32) -> Contest {
        Contest {
            id: Uuid::new_v4(),
            contest_name: "Round 1".to_string(),
            registration_code: "R1".to_string(),
            start_time: Utc::now() + ChronoDuration::minutes(start_offset_mins),
            duration,
            freeze_time: freeze,
            is_active: start_offset_mins < 0,
            is_frozen: false,
            frozen_at: None,
            ended_at: None,
            scoring_type: "icpc".to_string(),
            manual_control: false,
        }
    }

    #[test]
    fn test_start_when_due() {
        let mut c = contest(-1, 60, 0);
        c.is_active = false;
        assert_eq!(planned_transition(&c, Utc::now()), Some(Transition::Start));
    }

    #[test]
    fn test_no_start_before_schedule() {
        let mut c = contest(10, 60, 0);
        c.is_active = false;
        assert_eq!(planned_transition(&c, Utc::now()), None);
    }

    #[test]
    fn test_freeze_inside_window() {
        // 60-minute contest with a 15-minute freeze, 50 minutes in
        let c = contest(-50, 60, 15);
        assert_eq!(planned_transition(&c, Utc::now()), Some(Transition::Freeze));
    }

    #[test]
    fn test_no_freeze_without_window() {
        let c = contest(-50, 60, 0);
        assert_eq!(planned_transition(&c, Utc::now()), None);
    }

    #[test]
    fn test_end_after_duration() {
        let c = contest(-90, 60, 0);
        assert_eq!(planned_transition(&c, Utc::now()), Some(Transition::End));
    }

    #[test]
    fn test_frozen_contest_ends() {
        let mut c = contest(-90, 60, 10);
        c.is_frozen = true;
        c.frozen_at = Some(Utc::now() - ChronoDuration::minutes(40));
        assert_eq!(planned_transition(&c, Utc::now()), Some(Transition::End));
    }

    #[test]
    fn test_manual_control_disables_transitions() {
        let mut c = contest(-90, 60, 0);
        c.manual_control = true;
        assert_eq!(planned_transition(&c, Utc::now()), None);
    }

    #[test]
    fn test_one_transition_per_tick() {
        // Due for both freeze and end: end wins because the freeze window
        // has already passed the contest end
        let c = contest(-90, 60, 10);
        assert_eq!(planned_transition(&c, Utc::now()), Some(Transition::End));
    }
}
