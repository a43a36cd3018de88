//! Queue observability
//!
//! A single metrics value owned by the worker pool. All mutation goes
//! through it; readers get a consistent snapshot. Completion records live
//! in a rolling window and stale entries are pruned on every update.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::constants::METRICS_WINDOW_SECS;

#[derive(Debug, Clone)]
struct CompletionRecord {
    at: DateTime<Utc>,
    duration_ms: u64,
    failed: bool,
}

#[derive(Debug, Clone, Default)]
struct WorkerStats {
    processed: u64,
    failed: u64,
    last_heartbeat: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    completions: VecDeque<CompletionRecord>,
    workers: HashMap<String, WorkerStats>,
    dead_letters: u64,
}

/// Point-in-time view of queue metrics
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Completions in the trailing minute
    pub per_minute_rate: u64,
    /// Completions in the trailing hour
    pub per_hour_rate: u64,
    /// Rolling average processing time over the window, milliseconds
    pub avg_processing_ms: f64,
    /// Per-worker (processed, failed) counts
    pub workers: HashMap<String, (u64, u64)>,
    pub dead_letters: u64,
}

/// Rolling-window queue metrics
pub struct QueueMetrics {
    inner: Mutex<MetricsInner>,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsInner::default()),
        }
    }

    /// Record a finished judgment
    pub fn record_completion(&self, worker: &str, duration_ms: u64, failed: bool) {
        self.record_completion_at(Utc::now(), worker, duration_ms, failed);
    }

    pub(crate) fn record_completion_at(
        &self,
        at: DateTime<Utc>,
        worker: &str,
        duration_ms: u64,
        failed: bool,
    ) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");

        inner.completions.push_back(CompletionRecord {
            at,
            duration_ms,
            failed,
        });

        let stats = inner.workers.entry(worker.to_string()).or_default();
        if failed {
            stats.failed += 1;
        } else {
            stats.processed += 1;
        }

        Self::prune(&mut inner, at);
    }

    /// Record a job moved to the dead-letter list
    pub fn record_dead_letter(&self) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        inner.dead_letters += 1;
    }

    /// Record a worker heartbeat
    pub fn heartbeat(&self, worker: &str) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        inner
            .workers
            .entry(worker.to_string())
            .or_default()
            .last_heartbeat = Some(Utc::now());
    }

    /// Workers whose last heartbeat is older than `timeout_secs`
    pub fn stale_workers(&self, timeout_secs: i64) -> Vec<String> {
        let inner = self.inner.lock().expect("metrics lock poisoned");
        let cutoff = Utc::now() - Duration::seconds(timeout_secs);

        inner
            .workers
            .iter()
            .filter(|(_, stats)| matches!(stats.last_heartbeat, Some(hb) if hb < cutoff))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Forget a removed worker
    pub fn remove_worker(&self, worker: &str) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        inner.workers.remove(worker);
    }

    /// Consistent point-in-time snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        let now = Utc::now();
        Self::prune(&mut inner, now);

        let minute_cutoff = now - Duration::seconds(60);
        let per_minute_rate = inner
            .completions
            .iter()
            .filter(|r| r.at >= minute_cutoff)
            .count() as u64;
        let per_hour_rate = inner.completions.len() as u64;

        let successes: Vec<u64> = inner
            .completions
            .iter()
            .filter(|r| !r.failed)
            .map(|r| r.duration_ms)
            .collect();
        let avg_processing_ms = if successes.is_empty() {
            0.0
        } else {
            successes.iter().sum::<u64>() as f64 / successes.len() as f64
        };

        MetricsSnapshot {
            per_minute_rate,
            per_hour_rate,
            avg_processing_ms,
            workers: inner
                .workers
                .iter()
                .map(|(name, s)| (name.clone(), (s.processed, s.failed)))
                .collect(),
            dead_letters: inner.dead_letters,
        }
    }

    fn prune(inner: &mut MetricsInner, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(METRICS_WINDOW_SECS);
        while inner
            .completions
            .front()
            .is_some_and(|r| r.at < cutoff)
        {
            inner.completions.pop_front();
        }
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_and_average() {
        let metrics = QueueMetrics::new();
        let now = Utc::now();

        metrics.record_completion_at(now - Duration::seconds(10), "worker-1", 100, false);
        metrics.record_completion_at(now - Duration::seconds(20), "worker-1", 300, false);
        metrics.record_completion_at(now - Duration::seconds(600), "worker-2", 900, false);

        let snap = metrics.snapshot();
        assert_eq!(snap.per_minute_rate, 2);
        assert_eq!(snap.per_hour_rate, 3);
        assert!((snap.avg_processing_ms - (100.0 + 300.0 + 900.0) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stale_entries_pruned() {
        let metrics = QueueMetrics::new();
        let now = Utc::now();

        metrics.record_completion_at(
            now - Duration::seconds(METRICS_WINDOW_SECS + 60),
            "worker-1",
            100,
            false,
        );
        metrics.record_completion_at(now, "worker-1", 200, false);

        let snap = metrics.snapshot();
        assert_eq!(snap.per_hour_rate, 1);
    }

    #[test]
    fn test_per_worker_counts() {
        let metrics = QueueMetrics::new();

        metrics.record_completion("worker-1", 50, false);
        metrics.record_completion("worker-1", 60, true);
        metrics.record_completion("worker-2", 70, false);
        metrics.record_dead_letter();

        let snap = metrics.snapshot();
        assert_eq!(snap.workers["worker-1"], (1, 1));
        assert_eq!(snap.workers["worker-2"], (1, 0));
        assert_eq!(snap.dead_letters, 1);
    }

    #[test]
    fn test_stale_worker_detection() {
        let metrics = QueueMetrics::new();
        metrics.heartbeat("worker-1");

        assert!(metrics.stale_workers(60).is_empty());
        assert_eq!(metrics.stale_workers(-1), vec!["worker-1".to_string()]);

        metrics.remove_worker("worker-1");
        assert!(metrics.stale_workers(-1).is_empty());
    }
}
