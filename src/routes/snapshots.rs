//! Snapshot and Rollback API Routes

use crate::error::{validation_error, ApiResult};
use crate::models::{
    CreateSnapshotRequest, RollbackRequest, RollbackResponse, SuccessResponse,
};
use crate::snapshot::{Snapshot, SnapshotSummary};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;
use validator::Validate;

/// Capture a snapshot on demand
pub async fn create_snapshot(
    State(state): State<SharedState>,
    Json(payload): Json<CreateSnapshotRequest>,
) -> ApiResult<Json<SuccessResponse<SnapshotSummary>>> {
    // Validate input
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let snapshot = state.snapshots.create(payload.id, payload.label).await?;
    let summary = SnapshotSummary::from(&snapshot);

    Ok(Json(SuccessResponse::with_data(
        format!("Snapshot {} created", snapshot.snapshot_id),
        summary,
    )))
}

/// List snapshots, newest first
pub async fn list_snapshots(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<Vec<SnapshotSummary>>>> {
    let snapshots = state.snapshots.list().await?;
    Ok(Json(SuccessResponse::with_data(
        format!("{} snapshots available", snapshots.len()),
        snapshots,
    )))
}

/// Full snapshot record
pub async fn get_snapshot(
    State(state): State<SharedState>,
    Path(snapshot_id): Path<String>,
) -> ApiResult<Json<SuccessResponse<Snapshot>>> {
    let snapshot = state.snapshots.get(&snapshot_id).await?;
    Ok(Json(SuccessResponse::with_data("Snapshot loaded", snapshot)))
}

/// Restore the database to a snapshot; requires `{"confirm": true}`
pub async fn rollback_snapshot(
    State(state): State<SharedState>,
    Path(snapshot_id): Path<String>,
    Json(payload): Json<RollbackRequest>,
) -> ApiResult<Json<RollbackResponse>> {
    info!("Rollback to {} requested (confirm={})", snapshot_id, payload.confirm);
    let report = state.snapshots.restore(&snapshot_id, payload.confirm).await?;

    let mut message = format!(
        "Restored {} tables and {} rows from {}",
        report.restored_tables.len(),
        report.rows_inserted,
        report.snapshot_id
    );
    if !report.truncated_tables.is_empty() {
        message.push_str(&format!(
            "; only a sample was restored for: {}",
            report.truncated_tables.join(", ")
        ));
    }

    Ok(Json(RollbackResponse {
        status: "success".to_string(),
        message,
        report,
    }))
}
