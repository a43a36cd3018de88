//! Application state management
//!
//! The long-lived services are composed once at startup and shared with
//! the gateway handlers through this state value.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::events::{EventBus, TokenVerifier};
use crate::leaderboard::LeaderboardController;
use crate::lifecycle::ContestScheduler;
use crate::queue::{JudgeQueue, QueueMetrics};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db: PgPool,
    config: Config,
    queue: JudgeQueue,
    bus: Arc<EventBus>,
    metrics: Arc<QueueMetrics>,
    leaderboard: Arc<LeaderboardController>,
    scheduler: Arc<ContestScheduler>,
    verifier: TokenVerifier,
    initial_workers: usize,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: PgPool,
        config: Config,
        queue: JudgeQueue,
        bus: Arc<EventBus>,
        metrics: Arc<QueueMetrics>,
        leaderboard: Arc<LeaderboardController>,
        scheduler: Arc<ContestScheduler>,
        verifier: TokenVerifier,
        initial_workers: usize,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                db,
                config,
                queue,
                bus,
                metrics,
                leaderboard,
                scheduler,
                verifier,
                initial_workers,
            }),
        }
    }

    pub fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn queue(&self) -> &JudgeQueue {
        &self.inner.queue
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn metrics(&self) -> &QueueMetrics {
        &self.inner.metrics
    }

    pub fn leaderboard(&self) -> &LeaderboardController {
        &self.inner.leaderboard
    }

    pub fn scheduler(&self) -> &ContestScheduler {
        &self.inner.scheduler
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.inner.verifier
    }

    pub fn initial_workers(&self) -> usize {
        self.inner.initial_workers
    }
}
