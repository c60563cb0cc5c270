//! Snapshot and rollback DTOs

use crate::snapshot::RestoreReport;
use crate::storage::validate_key;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to capture a snapshot on demand
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotRequest {
    /// Caller-chosen id; generated from the clock when absent
    #[validate(length(min = 1, max = 128, message = "Snapshot id must be between 1 and 128 characters"))]
    #[validate(custom(function = "validate_record_id"))]
    pub id: Option<String>,
    #[validate(length(max = 200, message = "Label must be at most 200 characters"))]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResponse {
    pub status: String,
    pub message: String,
    pub report: RestoreReport,
}

fn validate_record_id(id: &str) -> Result<(), validator::ValidationError> {
    validate_key(id).map_err(|_| {
        let mut err = validator::ValidationError::new("invalid_id");
        err.message = Some("Id may contain only letters, digits, '_', '-' and '.'".into());
        err
    })
}
