//! Gateway routes
//!
//! Submission intake, queue position, the public leaderboard read, queue
//! observability and the websocket attach point. The wider platform API
//! (registration, problem CRUD, admin console) lives in a separate
//! service.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use std::sync::Arc;

use crate::db::repositories::{ContestRepository, ScoreRepository};
use crate::error::AppError;
use crate::events::{EventSink, Principal};
use crate::models::ContestState;
use crate::services::submission_service::{NewSubmission, SubmissionService};
use crate::state::AppState;

use super::ws::ws_handler;

/// Build the gateway router with CORS pinned to the configured frontend
pub fn build_router(state: AppState) -> Router {
    let cors = match state.config().server.frontend_url.as_deref() {
        Some(origin) => match origin.parse::<axum::http::HeaderValue>() {
            Ok(origin) => CorsLayer::new()
                .allow_origin([origin])
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
            Err(_) => {
                tracing::warn!("invalid FRONTEND_URL; CORS left permissive");
                CorsLayer::permissive()
            }
        },
        None => CorsLayer::permissive(),
    };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .route("/submissions", post(create_submission))
        .route("/submissions/{submission_id}/position", get(submission_position))
        .route("/submissions/{submission_id}/cancel", post(cancel_submission))
        .route("/submissions/{submission_id}/rejudge", post(rejudge_submission))
        .route("/contests/{contest_id}/leaderboard", get(display_leaderboard))
        .route("/contests/{contest_id}/transition/{transition}", post(contest_transition))
        .route("/contests/{contest_id}/scores", get(contest_scores))
        .route("/queue/stats", get(queue_stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Resolve the caller from its bearer token
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, AppError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidToken)?;

    state.verifier().verify(token)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    problem_id: Uuid,
    language: String,
    source_code: String,
}

async fn create_submission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let Principal::Team { team_id, .. } = authenticate(&state, &headers)? else {
        return Err(AppError::Forbidden("Only teams may submit".to_string()));
    };

    let events: Arc<dyn EventSink> = state.bus().clone();
    let submission = SubmissionService::create_submission(
        state.db(),
        state.queue(),
        &events,
        state.metrics(),
        state.initial_workers(),
        NewSubmission {
            team_id,
            problem_id: payload.problem_id,
            language: payload.language,
            source_code: payload.source_code,
            admin_override: false,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(submission)))
}

async fn submission_position(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(submission_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    authenticate(&state, &headers)?;

    let (position, eta_seconds) = SubmissionService::position_and_eta(
        state.queue(),
        state.metrics(),
        state.initial_workers(),
        &submission_id,
    )
    .await?;

    Ok(Json(serde_json::json!({
        "submission_id": submission_id,
        "position": position,
        "eta_seconds": eta_seconds,
    })))
}

async fn cancel_submission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(submission_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let Principal::Team { team_id, .. } = authenticate(&state, &headers)? else {
        return Err(AppError::Forbidden(
            "Only the owning team may cancel".to_string(),
        ));
    };

    let cancelled =
        SubmissionService::cancel_submission(state.db(), state.queue(), &team_id, &submission_id)
            .await?;

    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}

async fn rejudge_submission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(submission_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let Principal::Admin { .. } = authenticate(&state, &headers)? else {
        return Err(AppError::Forbidden("Admin token required".to_string()));
    };

    SubmissionService::rejudge_submission(state.db(), state.queue(), &submission_id).await?;

    Ok(Json(serde_json::json!({ "requeued": true })))
}

/// Explicit lifecycle transitions for manually controlled contests.
/// State monotonicity holds: the only backward edge is unfreeze.
async fn contest_transition(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((contest_id, transition)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    let Principal::Admin { .. } = authenticate(&state, &headers)? else {
        return Err(AppError::Forbidden("Admin token required".to_string()));
    };

    let contest = ContestRepository::find_by_id(state.db(), &contest_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Contest not found".to_string()))?;

    let now = chrono::Utc::now();
    let scheduler = state.scheduler();

    match (transition.as_str(), contest.state(now)) {
        ("start", ContestState::NotStarted) => scheduler.start_contest(&contest).await?,
        ("freeze", ContestState::Running) => scheduler.freeze_contest(&contest).await?,
        ("unfreeze", ContestState::Frozen) => scheduler.unfreeze_contest(&contest).await?,
        ("end", ContestState::Running | ContestState::Frozen | ContestState::Ending) => {
            scheduler.end_contest(&contest).await?
        }
        ("start" | "freeze" | "unfreeze" | "end", current) => {
            return Err(AppError::Conflict(format!(
                "Cannot {} a contest in state {}",
                transition, current
            )));
        }
        _ => {
            return Err(AppError::InvalidInput(format!(
                "Unknown transition: {}",
                transition
            )));
        }
    }

    Ok(Json(serde_json::json!({ "applied": transition })))
}

/// The public leaderboard: the frozen snapshot while frozen, else live
async fn display_leaderboard(
    State(state): State<AppState>,
    Path(contest_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let leaderboard = state
        .leaderboard()
        .get_display_leaderboard(&contest_id)
        .await?;
    Ok(Json(leaderboard))
}

/// Per-problem score rows for the admin scoreboard
async fn contest_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(contest_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let Principal::Admin { .. } = authenticate(&state, &headers)? else {
        return Err(AppError::Forbidden("Admin token required".to_string()));
    };

    let scores = ScoreRepository::team_scores_for_contest(state.db(), &contest_id).await?;
    Ok(Json(scores))
}

/// Queue observability snapshot
async fn queue_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let Principal::Admin { .. } = authenticate(&state, &headers)? else {
        return Err(AppError::Forbidden("Admin token required".to_string()));
    };

    let snapshot = state.metrics().snapshot();
    let queue = state.queue();

    Ok(Json(serde_json::json!({
        "waiting": queue.waiting().await?,
        "active": queue.active().await?,
        "delayed": queue.delayed().await?,
        "dead_letters": queue.failed().await?,
        "metrics": snapshot,
    })))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyExists(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ContestClosed => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::InvalidToken | AppError::TokenExpired => StatusCode::UNAUTHORIZED,
            AppError::Database(_)
            | AppError::Redis(_)
            | AppError::SandboxSpawn(_)
            | AppError::Internal(_)
            | AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal details stay in the logs
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("gateway error: {}", self);
        }

        (status, Json(serde_json::json!({ "error": self.details() }))).into_response()
    }
}
