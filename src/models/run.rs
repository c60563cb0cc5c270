//! Run submission DTOs

use crate::pipeline::RunSummary;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to push one statement through the pipeline
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRunRequest {
    #[validate(length(min = 1, max = 100000, message = "SQL must be between 1 and 100000 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub sql: String,
    /// Operator decision applied if the statement needs confirmation
    #[serde(default)]
    pub approve: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRunResponse {
    pub run_id: String,
    pub summary: RunSummary,
}

fn validate_not_blank(sql: &str) -> Result<(), validator::ValidationError> {
    if sql.trim().is_empty() {
        let mut err = validator::ValidationError::new("blank_sql");
        err.message = Some("SQL must not be blank".into());
        return Err(err);
    }
    Ok(())
}
