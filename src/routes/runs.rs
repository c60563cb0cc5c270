//! Run API Routes
//!
//! Submission, audit listing and read-only replay of runs.

use crate::audit::ReplayOutcome;
use crate::error::{validation_error, ApiResult};
use crate::models::{SubmitRunRequest, SubmitRunResponse, SuccessResponse};
use crate::pipeline::{Run, RunSummary, StaticConfirmer};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::debug;
use validator::Validate;

/// Submit one statement. The caller's `approve` flag answers the
/// confirmation gate if the statement reaches it.
pub async fn submit_run(
    State(state): State<SharedState>,
    Json(payload): Json<SubmitRunRequest>,
) -> ApiResult<Json<SuccessResponse<SubmitRunResponse>>> {
    // Validate input
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    debug!("Submitting statement (approve={})", payload.approve);
    let confirmer = StaticConfirmer::new(payload.approve);
    let (run_id, summary) = state.orchestrator.submit(&payload.sql, &confirmer).await?;

    Ok(Json(SuccessResponse::with_data(
        summary.summary.clone(),
        SubmitRunResponse { run_id, summary },
    )))
}

/// List recorded runs, newest first
pub async fn list_runs(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<Vec<RunSummary>>>> {
    let runs = state.runs.list().await?;
    Ok(Json(SuccessResponse::with_data(
        format!("{} runs recorded", runs.len()),
        runs,
    )))
}

/// Full record of one run including its audit steps
pub async fn get_run(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<SuccessResponse<Run>>> {
    let run = state.runs.load(&run_id).await?;
    Ok(Json(SuccessResponse::with_data("Run loaded", run)))
}

/// Replay a recorded run if it is read-only
pub async fn replay_run(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<ReplayOutcome>> {
    let outcome = state.replay.replay(&run_id).await?;
    Ok(Json(outcome))
}
