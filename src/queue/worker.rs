//! Worker pool
//!
//! Each worker claims one job at a time and runs a full judgment. A
//! supervisor task promotes delayed retries, recovers stalled jobs,
//! replaces silent workers, and scales the pool between MIN_WORKERS and
//! MAX_WORKERS from queue load.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::constants::{MAX_WORKERS, MIN_WORKERS, WORKER_HEARTBEAT_TIMEOUT_SECS};
use crate::db::repositories::{
    ContestRepository, ProblemRepository, SubmissionRepository,
};
use crate::error::{AppError, AppResult};
use crate::events::{EventMessage, EventPayload, EventSink, Room, SubmissionResultPayload};
use crate::judge::JudgingEngine;
use crate::leaderboard::LeaderboardController;
use crate::models::{Submission, SubmissionStatus};
use crate::scoring::strategy_for;

use super::metrics::QueueMetrics;
use super::queue::{JudgeQueue, QueueJob};

/// Supervisor cadence
const SUPERVISE_INTERVAL_SECS: u64 = 15;

/// Idle poll between dequeue attempts
const DEQUEUE_IDLE_MS: u64 = 500;

struct WorkerHandle {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct PoolInner {
    pool: PgPool,
    queue: JudgeQueue,
    engine: JudgingEngine,
    events: Arc<dyn EventSink>,
    leaderboard: Arc<LeaderboardController>,
    metrics: Arc<QueueMetrics>,
    max_attempts: u32,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<HashMap<String, WorkerHandle>>,
    next_worker: AtomicUsize,
}

/// Judge worker pool with dynamic scaling
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        queue: JudgeQueue,
        engine: JudgingEngine,
        events: Arc<dyn EventSink>,
        leaderboard: Arc<LeaderboardController>,
        metrics: Arc<QueueMetrics>,
        max_attempts: u32,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                pool,
                queue,
                engine,
                events,
                leaderboard,
                metrics,
                max_attempts,
                shutdown,
                workers: Mutex::new(HashMap::new()),
                next_worker: AtomicUsize::new(1),
            }),
        }
    }

    /// Spawn the initial workers and the supervisor task
    pub fn start(&self, initial_workers: usize) -> JoinHandle<()> {
        let count = initial_workers.clamp(MIN_WORKERS, MAX_WORKERS);
        for _ in 0..count {
            Self::spawn_worker(&self.inner);
        }
        tracing::info!(workers = count, "worker pool started");

        let inner = self.inner.clone();
        tokio::spawn(async move { supervise(inner).await })
    }

    /// Current pool size
    pub fn worker_count(&self) -> usize {
        self.inner
            .workers
            .lock()
            .expect("worker pool lock poisoned")
            .len()
    }

    fn spawn_worker(inner: &Arc<PoolInner>) {
        let id = format!(
            "worker-{}",
            inner.next_worker.fetch_add(1, Ordering::SeqCst)
        );
        let stop = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(worker_loop(inner.clone(), id.clone(), stop.clone()));

        inner
            .workers
            .lock()
            .expect("worker pool lock poisoned")
            .insert(id, WorkerHandle { stop, handle });
    }

    /// Ask the newest worker to stop after its current judgment
    fn retire_one(inner: &Arc<PoolInner>) {
        let workers = inner.workers.lock().expect("worker pool lock poisoned");
        // Newest drains first; in-flight work is never interrupted
        if let Some(name) = workers.keys().max().cloned() {
            if let Some(handle) = workers.get(&name) {
                handle.stop.store(true, Ordering::SeqCst);
                tracing::info!(worker = %name, "worker retiring");
            }
        }
    }
}

async fn worker_loop(inner: Arc<PoolInner>, id: String, stop: Arc<AtomicBool>) {
    tracing::info!(worker = %id, "judge worker started");

    while !stop.load(Ordering::SeqCst) && !inner.shutdown.load(Ordering::SeqCst) {
        inner.metrics.heartbeat(&id);

        match inner.queue.dequeue(&id).await {
            Ok(Some(job)) => {
                if let Err(e) = process_job(&inner, &id, &job).await {
                    tracing::error!(
                        worker = %id,
                        submission_id = %job.submission_id,
                        "job processing failed: {}",
                        e
                    );
                }
            }
            Ok(None) => sleep(Duration::from_millis(DEQUEUE_IDLE_MS)).await,
            Err(e) => {
                tracing::warn!(worker = %id, "dequeue failed: {}", e);
                sleep(Duration::from_secs(1)).await;
            }
        }
    }

    // Deregister so counts stay honest after a retire
    inner
        .workers
        .lock()
        .expect("worker pool lock poisoned")
        .remove(&id);
    inner.metrics.remove_worker(&id);

    tracing::info!(worker = %id, "judge worker stopped");
}

/// Process one claimed job end-to-end
async fn process_job(inner: &Arc<PoolInner>, worker: &str, job: &QueueJob) -> AppResult<()> {
    let started = Instant::now();

    let Some(submission) =
        SubmissionRepository::find_by_id(&inner.pool, &job.submission_id).await?
    else {
        tracing::warn!(submission_id = %job.submission_id, "queued submission vanished");
        inner.queue.complete(&job.submission_id).await?;
        return Ok(());
    };

    // The queue does not promise exactly-once delivery; a submission that
    // is already terminal was judged by another claim.
    if submission.status().is_some_and(|s| s.is_final()) {
        inner.queue.complete(&job.submission_id).await?;
        return Ok(());
    }

    let problem = ProblemRepository::find_by_id(&inner.pool, &submission.problem_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Problem not found".to_string()))?;
    let contest = ContestRepository::find_by_id(&inner.pool, &submission.contest_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Contest not found".to_string()))?;
    let test_cases = ProblemRepository::get_test_cases(&inner.pool, &problem.id).await?;

    SubmissionRepository::update_status(
        &inner.pool,
        &submission.id,
        SubmissionStatus::Compiling.as_str(),
    )
    .await?;

    let outcome = inner
        .engine
        .judge(&submission, &problem, &test_cases, contest.scoring_kind())
        .await;

    match outcome {
        Ok(result) => {
            let judge_output = result.to_judge_output();
            let updated = SubmissionRepository::finalize(
                &inner.pool,
                &submission.id,
                result.status.as_str(),
                Some(result.total_time_ms as i32),
                Some(result.max_memory_mb as i32),
                result.points_earned,
                Some(result.test_cases_passed),
                Some(result.total_test_cases),
                Some(&judge_output),
            )
            .await?;

            emit_submission_result(inner, &updated);

            // A compilation error is not an attempt; scoring never sees it
            if result.status != SubmissionStatus::CompilationError {
                let strategy = strategy_for(contest.scoring_kind());
                if let Err(e) = strategy
                    .on_submission_finalized(&inner.pool, &contest, &updated)
                    .await
                {
                    // The verdict stands; the leaderboard is recomputable
                    // from submissions on the next flush
                    tracing::error!(
                        submission_id = %submission.id,
                        "scoring failed: {}",
                        e
                    );
                }
                inner.leaderboard.mark_dirty(contest.id);
            }

            inner.queue.complete(&submission.id).await?;
            inner
                .metrics
                .record_completion(worker, started.elapsed().as_millis() as u64, false);

            tracing::info!(
                worker = %worker,
                submission_id = %submission.id,
                status = %result.status,
                passed = result.test_cases_passed,
                total = result.total_test_cases,
                took = %crate::utils::time::format_milliseconds(started.elapsed().as_millis() as i64),
                "submission judged"
            );
        }
        Err(e) => {
            inner
                .metrics
                .record_completion(worker, started.elapsed().as_millis() as u64, true);

            let retryable = e.is_transient() && job.attempt + 1 < inner.max_attempts;
            if retryable {
                let delay_ms = inner.queue.retry_later(job).await?;
                tracing::warn!(
                    submission_id = %submission.id,
                    attempt = job.attempt + 1,
                    delay_ms,
                    "judging failed, retrying: {}",
                    e
                );
            } else {
                inner.queue.dead_letter(job, &e.to_string()).await?;
                inner.metrics.record_dead_letter();
                finalize_system_error(inner, &submission, &e.to_string()).await?;
                tracing::error!(
                    submission_id = %submission.id,
                    "judging failed terminally: {}",
                    e
                );
            }
        }
    }

    Ok(())
}

/// Finalize as system_error so the submission is never silently dropped:
/// every accepted submission answers with exactly one submission_result.
async fn finalize_system_error(
    inner: &Arc<PoolInner>,
    submission: &Submission,
    error: &str,
) -> AppResult<()> {
    let detail = serde_json::json!({ "error": error });
    let updated = SubmissionRepository::finalize(
        &inner.pool,
        &submission.id,
        SubmissionStatus::SystemError.as_str(),
        None,
        None,
        None,
        None,
        None,
        Some(&detail),
    )
    .await?;

    emit_submission_result(inner, &updated);
    Ok(())
}

fn emit_submission_result(inner: &Arc<PoolInner>, submission: &Submission) {
    let full = EventMessage::new(EventPayload::SubmissionResult(
        SubmissionResultPayload::full(submission),
    ));
    inner.events.emit_many(
        &[Room::Team(submission.team_id), Room::Admins],
        full,
    );

    let public = EventMessage::new(EventPayload::SubmissionResult(
        SubmissionResultPayload::public(submission),
    ));
    inner.events.emit(Room::Contest(submission.contest_id), public);
}

/// Supervisor: retry promotion, stalled recovery, heartbeat policing and
/// load-based scaling
async fn supervise(inner: Arc<PoolInner>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(SUPERVISE_INTERVAL_SECS));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if inner.shutdown.load(Ordering::SeqCst) {
            break;
        }

        match inner.queue.promote_due().await {
            Ok(0) => {}
            Ok(n) => tracing::debug!(promoted = n, "delayed retries promoted"),
            Err(e) => tracing::warn!("retry promotion failed: {}", e),
        }

        match inner.queue.recover_stalled().await {
            Ok(0) => {}
            Ok(n) => tracing::warn!(recovered = n, "stalled jobs recovered"),
            Err(e) => tracing::warn!("stalled recovery failed: {}", e),
        }

        replace_silent_workers(&inner);

        if let Err(e) = rebalance(&inner).await {
            tracing::warn!("worker scaling check failed: {}", e);
        }
    }

    // Drain: workers observe the shutdown flag between jobs
    let handles: Vec<WorkerHandle> = {
        let mut workers = inner.workers.lock().expect("worker pool lock poisoned");
        workers.drain().map(|(_, handle)| handle).collect()
    };
    let results = futures::future::join_all(handles.into_iter().map(|w| w.handle)).await;
    for result in results {
        if result.is_err() {
            tracing::warn!("worker task panicked during drain");
        }
    }
    tracing::info!("worker pool drained");
}

fn replace_silent_workers(inner: &Arc<PoolInner>) {
    for name in inner.metrics.stale_workers(WORKER_HEARTBEAT_TIMEOUT_SECS) {
        tracing::warn!(worker = %name, "worker heartbeat lost; replacing");

        let removed = {
            let mut workers = inner.workers.lock().expect("worker pool lock poisoned");
            workers.remove(&name)
        };
        if let Some(worker) = removed {
            worker.handle.abort();
        }
        inner.metrics.remove_worker(&name);
        WorkerPool::spawn_worker(inner);
    }
}

async fn rebalance(inner: &Arc<PoolInner>) -> AppResult<()> {
    let waiting = inner.queue.waiting().await?;
    let active = inner.queue.active().await?;
    let current = inner
        .workers
        .lock()
        .expect("worker pool lock poisoned")
        .len();

    if waiting > (3 * current) as u64 && current < MAX_WORKERS {
        tracing::info!(waiting, workers = current, "scaling worker pool up");
        WorkerPool::spawn_worker(inner);
    } else if waiting == 0 && active < (current / 2) as u64 && current > MIN_WORKERS {
        tracing::info!(active, workers = current, "scaling worker pool down");
        WorkerPool::retire_one(inner);
    }

    Ok(())
}
