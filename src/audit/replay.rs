//! Replay engine
//!
//! Re-executes a recorded statement only when analysis proves it is a pure
//! SELECT. Replays reuse the pipeline's execution path but skip the risk
//! gate and never take a snapshot.

use super::store::RunStore;
use crate::db::Database;
use crate::error::AppError;
use crate::pipeline::orchestrator::execute_statement;
use crate::pipeline::types::{ExecutionResult, Run, StepAction};
use crate::simulation::StatementAnalyzer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayStatus {
    Replayed,
    Blocked,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub run_id: String,
    pub status: ReplayStatus,
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReplayOutcome {
    fn without_result(run_id: &str, status: ReplayStatus, sql: Option<String>, message: String) -> Self {
        Self {
            run_id: run_id.to_string(),
            status,
            sql,
            result: None,
            row_count: None,
            message: Some(message),
        }
    }
}

pub struct ReplayEngine {
    db: Arc<dyn Database>,
    runs: Arc<RunStore>,
}

impl ReplayEngine {
    pub fn new(db: Arc<dyn Database>, runs: Arc<RunStore>) -> Self {
        Self { db, runs }
    }

    /// Statement of a run: the stored text, or the input of its execute step
    pub fn recover_sql(run: &Run) -> Option<String> {
        if !run.sql.trim().is_empty() {
            return Some(run.sql.clone());
        }

        run.audit_steps
            .iter()
            .filter(|step| step.action == StepAction::Execute)
            .find_map(|step| step.inputs.get("sql").and_then(|v| v.as_str()))
            .map(str::to_string)
    }

    /// Replay a recorded run. Loading errors propagate; everything after
    /// that is reported in the outcome.
    pub async fn replay(&self, run_id: &str) -> Result<ReplayOutcome, AppError> {
        let run = self.runs.load(run_id).await?;

        let Some(sql) = Self::recover_sql(&run) else {
            return Ok(ReplayOutcome::without_result(
                run_id,
                ReplayStatus::Error,
                None,
                "No SQL found in run record".to_string(),
            ));
        };

        let stmt = StatementAnalyzer::analyze(&sql);
        if !stmt.is_read_only() {
            warn!("Replay of {} blocked: {} is not read-only", run_id, stmt.kind);
            return Ok(ReplayOutcome::without_result(
                run_id,
                ReplayStatus::Blocked,
                Some(sql),
                format!(
                    "Only SELECT statements can be replayed; this run was {}",
                    stmt.kind
                ),
            ));
        }

        match execute_statement(self.db.as_ref(), &stmt).await {
            Ok(result) => {
                info!("Replayed {}: {} rows", run_id, result.row_count());
                Ok(ReplayOutcome {
                    run_id: run_id.to_string(),
                    status: ReplayStatus::Replayed,
                    sql: Some(sql),
                    row_count: Some(result.row_count()),
                    result: Some(result),
                    message: None,
                })
            }
            Err(e) => Ok(ReplayOutcome::without_result(
                run_id,
                ReplayStatus::Error,
                Some(sql),
                e.to_string(),
            )),
        }
    }
}
