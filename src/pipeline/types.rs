//! Types for the safety pipeline

use crate::db::Row;
use crate::simulation::StatementKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordinal risk tier. `Unknown` sits outside the order and always refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// Transaction control, no data impact
    Info,
    /// Reads within the row threshold
    Low,
    /// Bounded writes, large reads
    Medium,
    /// Structural changes and unfiltered writes
    High,
    /// Irreversible object loss
    Critical,
    /// Could not be reasoned about
    Unknown,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Info => "INFO",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
            RiskLevel::Unknown => "UNKNOWN",
        }
    }

    pub fn requires_confirmation(&self) -> bool {
        matches!(self, RiskLevel::Medium | RiskLevel::High | RiskLevel::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub reason: String,
    pub statement_kind: StatementKind,
}

/// Pipeline stage an audit step belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Analyze,
    DryRun,
    RiskCheck,
    Confirmation,
    Snapshot,
    Execute,
    Refuse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Success,
    Error,
    Cancelled,
}

/// One timestamped record of a pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStep {
    pub step_id: usize,
    pub action: StepAction,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub inputs: serde_json::Value,
    pub outputs: serde_json::Value,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What running a statement produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionResult {
    Rows {
        #[serde(rename = "rowCount")]
        row_count: usize,
        rows: Vec<Row>,
    },
    Affected {
        #[serde(rename = "rowsAffected")]
        rows_affected: u64,
    },
}

impl ExecutionResult {
    /// Rows returned for reads, rows touched for writes
    pub fn row_count(&self) -> u64 {
        match self {
            ExecutionResult::Rows { row_count, .. } => *row_count as u64,
            ExecutionResult::Affected { rows_affected } => *rows_affected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    /// Execution was attempted and the database rejected it
    Failed,
    /// The operator declined
    Cancelled,
    /// Risk could not be determined
    Refused,
    /// Approved, but no snapshot could be taken under a blocking policy
    Blocked,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Refused => "refused",
            RunStatus::Blocked => "blocked",
        }
    }
}

/// Complete record of one submission. Written once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub sql: String,
    pub statement_kind: StatementKind,
    pub estimated_rows: i64,
    pub risk_level: RiskLevel,
    pub risk_reason: String,
    pub snapshot_id: Option<String>,
    pub execution_result: Option<ExecutionResult>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub audit_steps: Vec<AuditStep>,
    pub summary: String,
}

/// What a caller gets back from a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub statement_kind: StatementKind,
    pub risk_level: RiskLevel,
    pub estimated_rows: i64,
    pub snapshot_id: Option<String>,
    pub row_count: Option<u64>,
    pub summary: String,
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.run_id.clone(),
            timestamp: run.timestamp,
            status: run.status,
            statement_kind: run.statement_kind,
            risk_level: run.risk_level,
            estimated_rows: run.estimated_rows,
            snapshot_id: run.snapshot_id.clone(),
            row_count: run.execution_result.as_ref().map(ExecutionResult::row_count),
            summary: run.summary.clone(),
        }
    }
}

/// Result of a best-effort stage. A warning never aborts the pipeline by
/// itself; callers decide what it means.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Completed(T),
    Warning(String),
}
