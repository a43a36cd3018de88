//! Leaderboard & freeze controller
//!
//! Dirty-marks are coalesced: the flusher emits at most one
//! leaderboard_update per contest per window, built from the latest state
//! at flush time. While a contest is frozen the public read returns the
//! snapshot captured at the freeze instant; the real rows keep updating
//! for the admin view.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use sqlx::PgPool;
use tokio::time::{interval, Duration};
use uuid::Uuid;

use crate::constants::LEADERBOARD_FLUSH_SECS;
use crate::db::repositories::{ContestRepository, ScoreRepository};
use crate::error::{AppError, AppResult};
use crate::events::{EventMessage, EventPayload, EventSink, Room};
use crate::models::{Contest, Leaderboard};
use crate::scoring::strategy_for;

pub struct LeaderboardController {
    pool: PgPool,
    events: Arc<dyn EventSink>,
    dirty: Mutex<HashSet<Uuid>>,
}

impl LeaderboardController {
    pub fn new(pool: PgPool, events: Arc<dyn EventSink>) -> Self {
        Self {
            pool,
            events,
            dirty: Mutex::new(HashSet::new()),
        }
    }

    /// Request that a broadcast be sent soon; cheap and lock-bounded
    pub fn mark_dirty(&self, contest_id: Uuid) {
        self.dirty
            .lock()
            .expect("leaderboard dirty lock poisoned")
            .insert(contest_id);
    }

    /// Take and clear the current dirty set
    fn drain_dirty(&self) -> Vec<Uuid> {
        let mut dirty = self
            .dirty
            .lock()
            .expect("leaderboard dirty lock poisoned");
        dirty.drain().collect()
    }

    /// Coalescing flush loop; one tick per window
    pub async fn run_flusher(self: Arc<Self>, shutdown: Arc<AtomicBool>) {
        let mut ticker = interval(Duration::from_secs(LEADERBOARD_FLUSH_SECS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            for contest_id in self.drain_dirty() {
                if let Err(e) = self.flush(&contest_id).await {
                    tracing::warn!(contest_id = %contest_id, "leaderboard flush failed: {}", e);
                    // Put it back; the next window retries
                    self.mark_dirty(contest_id);
                }
            }
        }

        tracing::info!("leaderboard flusher shutting down");
    }

    /// Recompute, persist and broadcast one contest's leaderboard
    async fn flush(&self, contest_id: &Uuid) -> AppResult<()> {
        let contest = ContestRepository::find_by_id(&self.pool, contest_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Contest not found".to_string()))?;

        let strategy = strategy_for(contest.scoring_kind());
        let results = strategy.compute_contest_results(&self.pool, &contest).await?;
        ScoreRepository::write_contest_results(&self.pool, contest_id, &results).await?;

        let state = contest.state(Utc::now()).to_string();

        // Contest room sees the display view (snapshot while frozen)
        let display = self.get_display_leaderboard(contest_id).await?;
        self.events.emit(
            Room::Contest(*contest_id),
            EventMessage::new(EventPayload::LeaderboardUpdate {
                contest_id: *contest_id,
                leaderboard: display,
                contest_state: state.clone(),
            }),
        );

        // Admins always see the real rows
        self.events.emit(
            Room::Admins,
            EventMessage::new(EventPayload::LeaderboardUpdate {
                contest_id: *contest_id,
                leaderboard: Leaderboard::live(*contest_id, &results),
                contest_state: state,
            }),
        );

        Ok(())
    }

    /// The public read: the frozen snapshot while frozen, else the live
    /// ranked rows
    pub async fn get_display_leaderboard(&self, contest_id: &Uuid) -> AppResult<Leaderboard> {
        let contest = ContestRepository::find_by_id(&self.pool, contest_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Contest not found".to_string()))?;

        if contest.is_frozen {
            if let Some(frozen) = ScoreRepository::frozen_snapshot(&self.pool, contest_id).await? {
                return Ok(Leaderboard::from_snapshot(&frozen));
            }
            tracing::warn!(contest_id = %contest_id, "frozen contest has no snapshot; serving live");
        }

        let results = ScoreRepository::contest_results(&self.pool, contest_id).await?;
        Ok(Leaderboard::live(*contest_id, &results))
    }

    /// Capture the snapshot and mark the contest frozen
    pub async fn freeze(&self, contest: &Contest) -> AppResult<()> {
        let strategy = strategy_for(contest.scoring_kind());
        let results = strategy.compute_contest_results(&self.pool, contest).await?;
        ScoreRepository::write_contest_results(&self.pool, &contest.id, &results).await?;

        let rows = Leaderboard::live(contest.id, &results).rows;
        let snapshot = serde_json::to_value(rows)?;
        ScoreRepository::save_frozen_snapshot(&self.pool, &contest.id, &snapshot).await?;
        ContestRepository::mark_frozen(&self.pool, &contest.id, Utc::now()).await?;

        tracing::info!(contest_id = %contest.id, "leaderboard frozen");
        Ok(())
    }

    /// Retire the snapshot and expose the live rows again
    pub async fn unfreeze(&self, contest: &Contest) -> AppResult<()> {
        ScoreRepository::delete_frozen_snapshot(&self.pool, &contest.id).await?;
        ContestRepository::mark_unfrozen(&self.pool, &contest.id).await?;
        self.mark_dirty(contest.id);

        tracing::info!(contest_id = %contest.id, "leaderboard unfrozen");
        Ok(())
    }

    /// Contest ended with public reveal: the snapshot is retired
    pub async fn publish_final(&self, contest_id: &Uuid) -> AppResult<()> {
        ScoreRepository::delete_frozen_snapshot(&self.pool, contest_id).await?;
        self.mark_dirty(*contest_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MockEventSink;

    fn controller() -> LeaderboardController {
        let pool = PgPool::connect_lazy("postgres://localhost/hackarena_test")
            .expect("lazy pool");
        LeaderboardController::new(pool, Arc::new(MockEventSink::new()))
    }

    #[tokio::test]
    async fn test_dirty_marks_coalesce() {
        let c = controller();
        let contest = Uuid::new_v4();

        c.mark_dirty(contest);
        c.mark_dirty(contest);
        c.mark_dirty(contest);

        assert_eq!(c.drain_dirty(), vec![contest]);
        assert!(c.drain_dirty().is_empty());
    }

    #[tokio::test]
    async fn test_distinct_contests_flush_separately() {
        let c = controller();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        c.mark_dirty(a);
        c.mark_dirty(b);

        let drained: HashSet<Uuid> = c.drain_dirty().into_iter().collect();
        assert_eq!(drained.len(), 2);
        assert!(drained.contains(&a) && drained.contains(&b));
    }
}
