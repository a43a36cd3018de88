//! Submission intake
//!
//! Accepts a submission, persists it as pending, computes its queue
//! priority and enqueues it, then answers the team with its queue position
//! and ETA.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::constants::MAX_SOURCE_CODE_SIZE;
use crate::db::repositories::{
    ContestRepository, ProblemRepository, SubmissionRepository, TeamRepository,
};
use crate::error::{AppError, AppResult};
use crate::events::{EventMessage, EventPayload, EventSink, Room};
use crate::models::{Language, Submission};
use crate::queue::{
    compute_priority, JudgeQueue, PriorityInputs, QueueJob, QueueMetrics, QueuePosition,
};

/// Window for the team-fairness priority input, minutes
const FAIRNESS_WINDOW_MINUTES: i64 = 15;

/// Fallback per-job estimate before the rolling average warms up
const DEFAULT_JOB_ESTIMATE_MS: f64 = 15_000.0;

/// Submission intake parameters
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub team_id: Uuid,
    pub problem_id: Uuid,
    pub language: String,
    pub source_code: String,
    pub admin_override: bool,
}

/// Submission service for intake business logic
pub struct SubmissionService;

impl SubmissionService {
    /// Accept a submission: validate, persist pending, enqueue, announce.
    pub async fn create_submission(
        pool: &PgPool,
        queue: &JudgeQueue,
        events: &Arc<dyn EventSink>,
        metrics: &QueueMetrics,
        worker_count: usize,
        payload: NewSubmission,
    ) -> AppResult<Submission> {
        if payload.source_code.is_empty() {
            return Err(AppError::Validation("Source code is empty".to_string()));
        }
        if payload.source_code.len() > MAX_SOURCE_CODE_SIZE {
            return Err(AppError::Validation(format!(
                "Source code exceeds {} bytes",
                MAX_SOURCE_CODE_SIZE
            )));
        }

        let language = Language::from_str(&payload.language).ok_or_else(|| {
            AppError::Validation(format!("Unsupported language: {}", payload.language))
        })?;

        let problem = ProblemRepository::find_by_id(pool, &payload.problem_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Problem not found".to_string()))?;

        let contest = ContestRepository::find_by_id(pool, &problem.contest_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Contest not found".to_string()))?;

        let now = Utc::now();
        if !contest.accepts_submissions(now) {
            return Err(AppError::ContestClosed);
        }

        let team = TeamRepository::find_by_id(pool, &payload.team_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Team not found".to_string()))?;
        if !team.is_active {
            return Err(AppError::Forbidden("Team is deactivated".to_string()));
        }
        if team.contest_code != contest.registration_code {
            return Err(AppError::Forbidden(
                "Team is not registered for this contest".to_string(),
            ));
        }

        let recent =
            TeamRepository::recent_submission_count(pool, &team.id, FAIRNESS_WINDOW_MINUTES)
                .await?;

        let submission = SubmissionRepository::create(
            pool,
            &team.id,
            &problem.id,
            &contest.id,
            language.as_str(),
            &payload.source_code,
        )
        .await?;

        let priority = compute_priority(&PriorityInputs {
            age_minutes: 0,
            contest_minutes_remaining: Some((contest.end_time() - now).num_minutes()),
            team_recent_submissions: recent,
            admin_override: payload.admin_override,
            language,
        });

        queue
            .enqueue(&QueueJob {
                submission_id: submission.id,
                contest_id: contest.id,
                priority,
                attempt: 0,
                enqueued_at: now,
            })
            .await?;

        let (position, eta_seconds) =
            Self::position_and_eta(queue, metrics, worker_count, &submission.id).await?;

        events.emit_many(
            &[Room::Team(team.id), Room::Admins],
            EventMessage::new(EventPayload::Queued {
                submission_id: submission.id,
                position,
                eta_seconds,
            }),
        );

        TeamRepository::touch_activity(pool, &team.id).await?;

        tracing::info!(
            submission_id = %submission.id,
            team_id = %team.id,
            problem = %problem.problem_letter,
            language = %language,
            priority,
            "submission accepted"
        );

        Ok(submission)
    }

    /// Current queue position and a rolling-average ETA
    pub async fn position_and_eta(
        queue: &JudgeQueue,
        metrics: &QueueMetrics,
        worker_count: usize,
        submission_id: &Uuid,
    ) -> AppResult<(u64, u64)> {
        let position = match queue.position(submission_id).await? {
            QueuePosition::Queued { position } => position,
            QueuePosition::Processing => 0,
            QueuePosition::Unknown => 0,
        };

        let snapshot = metrics.snapshot();
        let per_job_ms = if snapshot.avg_processing_ms > 0.0 {
            snapshot.avg_processing_ms
        } else {
            DEFAULT_JOB_ESTIMATE_MS
        };
        let workers = worker_count.max(1) as f64;
        let eta_seconds = (position as f64 * per_job_ms / workers / 1000.0).ceil() as u64;

        Ok((position, eta_seconds))
    }

    /// Cancel a queued submission. In-flight judgments are not cancelled;
    /// returns whether anything was removed.
    pub async fn cancel_submission(
        pool: &PgPool,
        queue: &JudgeQueue,
        team_id: &Uuid,
        submission_id: &Uuid,
    ) -> AppResult<bool> {
        let submission = SubmissionRepository::find_by_id(pool, submission_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

        if submission.team_id != *team_id {
            return Err(AppError::Forbidden(
                "Cannot cancel another team's submission".to_string(),
            ));
        }

        queue.cancel(submission_id).await
    }

    /// Administrative re-judge: preserve the old result as a revision and
    /// requeue at admin priority.
    pub async fn rejudge_submission(
        pool: &PgPool,
        queue: &JudgeQueue,
        submission_id: &Uuid,
    ) -> AppResult<()> {
        let submission = SubmissionRepository::find_by_id(pool, submission_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

        let language = submission.language().ok_or_else(|| {
            AppError::Validation(format!("Unsupported language: {}", submission.language))
        })?;

        SubmissionRepository::reset_for_rejudge(pool, submission_id).await?;

        let priority = compute_priority(&PriorityInputs {
            age_minutes: 0,
            contest_minutes_remaining: None,
            team_recent_submissions: 0,
            admin_override: true,
            language,
        });

        queue
            .enqueue(&QueueJob {
                submission_id: *submission_id,
                contest_id: submission.contest_id,
                priority,
                attempt: 0,
                enqueued_at: Utc::now(),
            })
            .await?;

        tracing::info!(submission_id = %submission_id, "submission requeued for re-judge");
        Ok(())
    }
}
