//! Execution Orchestrator
//!
//! Drives one submitted statement through
//! `ANALYZE -> DRY_RUN -> RISK_CHECK -> {EXECUTE_DIRECT | AWAIT_CONFIRMATION
//! -> {SNAPSHOT -> EXECUTE | CANCELLED}} -> SUMMARIZE -> DONE`, with
//! `REFUSED` for statements that cannot be classified. Each visited stage
//! appends exactly one audit step. Stage failures are recorded, never
//! raised; only persisting the finished run can fail the call.

use crate::audit::RunStore;
use crate::config::{SafetyConfig, SnapshotFailurePolicy};
use crate::db::Database;
use crate::error::AppError;
use crate::pipeline::confirm::{ConfirmationRequest, Confirmer};
use crate::pipeline::risk::RiskClassifier;
use crate::pipeline::types::*;
use crate::simulation::{DryRunResult, DryRunner, Statement, StatementAnalyzer, StatementKind};
use crate::snapshot::SnapshotManager;
use crate::storage::timestamped_key;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Analyze,
    DryRun,
    RiskCheck,
    Refuse,
    ExecuteDirect,
    AwaitConfirmation,
    Snapshot,
    Execute,
    Summarize,
    Done,
    Cancelled,
    Refused,
}

impl PipelineState {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Refused)
    }
}

/// Hands out timestamps that never go backwards within one run
struct StepClock {
    last: DateTime<Utc>,
}

impl StepClock {
    fn starting_at(at: DateTime<Utc>) -> Self {
        Self { last: at }
    }

    fn now(&mut self) -> DateTime<Utc> {
        let now = Utc::now().max(self.last);
        self.last = now;
        now
    }
}

/// Mutable state of one run while the machine is moving
struct RunContext {
    run_id: String,
    timestamp: DateTime<Utc>,
    sql: String,
    statement: Option<Statement>,
    dry_run: Option<DryRunResult>,
    risk: Option<RiskAssessment>,
    snapshot_id: Option<String>,
    execution_result: Option<ExecutionResult>,
    status: RunStatus,
    error: Option<String>,
    summary: String,
    steps: Vec<AuditStep>,
    clock: StepClock,
}

impl RunContext {
    fn new(sql: &str) -> Self {
        let timestamp = Utc::now();
        Self {
            run_id: timestamped_key("RUN", timestamp),
            timestamp,
            sql: sql.to_string(),
            statement: None,
            dry_run: None,
            risk: None,
            snapshot_id: None,
            execution_result: None,
            status: RunStatus::Completed,
            error: None,
            summary: String::new(),
            steps: Vec::new(),
            clock: StepClock::starting_at(timestamp),
        }
    }

    fn record(
        &mut self,
        action: StepAction,
        started_at: DateTime<Utc>,
        inputs: Value,
        outputs: Value,
        status: StepStatus,
        error: Option<String>,
    ) {
        let ended_at = self.clock.now();
        self.steps.push(AuditStep {
            step_id: self.steps.len() + 1,
            action,
            started_at,
            ended_at,
            inputs,
            outputs,
            status,
            error,
        });
    }

    fn estimated_rows(&self) -> i64 {
        self.dry_run
            .as_ref()
            .map(|d| d.estimated_rows)
            .unwrap_or(crate::simulation::ESTIMATE_UNAVAILABLE)
    }

    fn into_run(self) -> Run {
        let estimated_rows = self.estimated_rows();
        let (risk_level, risk_reason) = match self.risk {
            Some(risk) => (risk.level, risk.reason),
            None => (RiskLevel::Unknown, "Risk was not assessed".to_string()),
        };

        Run {
            run_id: self.run_id,
            timestamp: self.timestamp,
            sql: self.sql,
            statement_kind: self
                .statement
                .as_ref()
                .map(|s| s.kind)
                .unwrap_or(StatementKind::Unknown),
            estimated_rows,
            risk_level,
            risk_reason,
            snapshot_id: self.snapshot_id,
            execution_result: self.execution_result,
            status: self.status,
            error: self.error,
            audit_steps: self.steps,
            summary: self.summary,
        }
    }
}

/// Run a statement through the shared execution path. Reads come back as
/// rows, everything else as an affected-row count.
pub async fn execute_statement(db: &dyn Database, stmt: &Statement) -> Result<ExecutionResult, AppError> {
    if stmt.kind == StatementKind::Unknown {
        return Err(AppError::BadRequest(
            "Refusing to execute a statement that could not be analyzed".to_string(),
        ));
    }

    let sql = stmt
        .canonical_sql()
        .ok_or_else(|| AppError::Internal("Analyzed statement has no syntax tree".to_string()))?;

    if stmt.kind == StatementKind::Select {
        let rows = db.fetch_rows(&sql).await?;
        Ok(ExecutionResult::Rows {
            row_count: rows.len(),
            rows,
        })
    } else {
        let rows_affected = db.execute(&sql).await?;
        Ok(ExecutionResult::Affected { rows_affected })
    }
}

pub struct Orchestrator {
    db: Arc<dyn Database>,
    snapshots: Arc<SnapshotManager>,
    runs: Arc<RunStore>,
    classifier: RiskClassifier,
    snapshot_policy: SnapshotFailurePolicy,
}

impl Orchestrator {
    pub fn new(
        db: Arc<dyn Database>,
        snapshots: Arc<SnapshotManager>,
        runs: Arc<RunStore>,
        safety: &SafetyConfig,
    ) -> Self {
        Self {
            db,
            snapshots,
            runs,
            classifier: RiskClassifier::new(safety.row_escalation_threshold),
            snapshot_policy: safety.snapshot_failure_policy,
        }
    }

    /// Run one statement through the pipeline and persist the record.
    /// Fails only when the run cannot be persisted.
    pub async fn submit(
        &self,
        sql: &str,
        confirmer: &dyn Confirmer,
    ) -> Result<(String, RunSummary), AppError> {
        let run = self.run(sql, confirmer).await;
        self.runs.save(&run).await?;
        Ok((run.run_id.clone(), RunSummary::from(&run)))
    }

    /// Run one statement through the pipeline without persisting it
    pub async fn run(&self, sql: &str, confirmer: &dyn Confirmer) -> Run {
        let mut ctx = RunContext::new(sql);
        info!("Run {} started", ctx.run_id);

        let mut state = PipelineState::Analyze;
        while !state.is_terminal() {
            debug!("Run {} entering {:?}", ctx.run_id, state);
            state = match state {
                PipelineState::Analyze => self.analyze(&mut ctx),
                PipelineState::DryRun => self.dry_run(&mut ctx).await,
                PipelineState::RiskCheck => self.risk_check(&mut ctx),
                PipelineState::Refuse => self.refuse(&mut ctx),
                PipelineState::AwaitConfirmation => self.await_confirmation(&mut ctx, confirmer).await,
                PipelineState::Snapshot => self.snapshot(&mut ctx).await,
                PipelineState::ExecuteDirect | PipelineState::Execute => self.execute(&mut ctx).await,
                PipelineState::Summarize => self.summarize(&mut ctx),
                terminal => terminal,
            };
        }

        info!("Run {} finished: {}", ctx.run_id, ctx.status.as_str());
        ctx.into_run()
    }

    fn analyze(&self, ctx: &mut RunContext) -> PipelineState {
        let started = ctx.clock.now();
        let stmt = StatementAnalyzer::analyze(&ctx.sql);

        let status = if stmt.parse_error.is_some() {
            StepStatus::Error
        } else {
            StepStatus::Success
        };
        ctx.record(
            StepAction::Analyze,
            started,
            json!({ "sql": ctx.sql }),
            json!({
                "statementKind": stmt.kind,
                "tables": stmt.tables,
                "hasPredicate": stmt.has_predicate,
            }),
            status,
            stmt.parse_error.clone(),
        );

        ctx.statement = Some(stmt);
        PipelineState::DryRun
    }

    async fn dry_run(&self, ctx: &mut RunContext) -> PipelineState {
        let started = ctx.clock.now();
        let result = match &ctx.statement {
            Some(stmt) => DryRunner::estimate(self.db.as_ref(), stmt).await,
            None => DryRunResult {
                estimated_rows: crate::simulation::ESTIMATE_UNAVAILABLE,
                probe_statement: None,
                note: Some("No statement".to_string()),
            },
        };

        if !result.is_available() {
            debug!("Estimate unavailable for run {}: {:?}", ctx.run_id, result.note);
        }

        ctx.record(
            StepAction::DryRun,
            started,
            json!({ "probeStatement": result.probe_statement }),
            json!(result),
            StepStatus::Success,
            None,
        );

        ctx.dry_run = Some(result);
        PipelineState::RiskCheck
    }

    fn risk_check(&self, ctx: &mut RunContext) -> PipelineState {
        let started = ctx.clock.now();
        let estimated_rows = ctx.estimated_rows();

        let assessment = match &ctx.statement {
            Some(stmt) => self.classifier.classify(stmt, estimated_rows),
            None => RiskAssessment {
                level: RiskLevel::Unknown,
                reason: "Statement was not analyzed".to_string(),
                statement_kind: StatementKind::Unknown,
            },
        };

        ctx.record(
            StepAction::RiskCheck,
            started,
            json!({ "estimatedRows": estimated_rows }),
            json!(assessment),
            StepStatus::Success,
            None,
        );

        info!(
            "Run {} risk {}: {}",
            ctx.run_id, assessment.level, assessment.reason
        );

        let next = if assessment.level == RiskLevel::Unknown {
            PipelineState::Refuse
        } else if assessment.level.requires_confirmation() {
            PipelineState::AwaitConfirmation
        } else {
            PipelineState::ExecuteDirect
        };
        ctx.risk = Some(assessment);
        next
    }

    fn refuse(&self, ctx: &mut RunContext) -> PipelineState {
        let started = ctx.clock.now();
        let reason = ctx
            .risk
            .as_ref()
            .map(|r| r.reason.clone())
            .unwrap_or_else(|| "Unknown risk".to_string());

        warn!("Run {} refused: {}", ctx.run_id, reason);
        ctx.record(
            StepAction::Refuse,
            started,
            json!({ "riskLevel": RiskLevel::Unknown }),
            json!({ "refused": true }),
            StepStatus::Cancelled,
            Some(reason.clone()),
        );

        ctx.status = RunStatus::Refused;
        ctx.error = Some(reason);
        PipelineState::Summarize
    }

    async fn await_confirmation(&self, ctx: &mut RunContext, confirmer: &dyn Confirmer) -> PipelineState {
        let started = ctx.clock.now();
        let request = match (&ctx.statement, &ctx.risk) {
            (Some(stmt), Some(risk)) => Some(ConfirmationRequest {
                sql: ctx.sql.clone(),
                risk: risk.clone(),
                estimated_rows: ctx.estimated_rows(),
                tables: stmt.tables.iter().cloned().collect(),
            }),
            _ => None,
        };
        let Some(request) = request else {
            ctx.status = RunStatus::Cancelled;
            ctx.error = Some("Nothing to confirm".to_string());
            return PipelineState::Summarize;
        };

        let (approved, error) = match confirmer.confirm(&request).await {
            Ok(approved) => (approved, None),
            Err(e) => {
                warn!("Confirmation for run {} failed, treating as denial: {}", ctx.run_id, e);
                (false, Some(e.to_string()))
            }
        };

        let status = match (&error, approved) {
            (Some(_), _) => StepStatus::Error,
            (None, true) => StepStatus::Success,
            (None, false) => StepStatus::Cancelled,
        };
        ctx.record(
            StepAction::Confirmation,
            started,
            json!(request),
            json!({ "approved": approved }),
            status,
            error.clone(),
        );

        if approved {
            info!("Run {} approved", ctx.run_id);
            PipelineState::Snapshot
        } else {
            info!("Run {} cancelled by operator", ctx.run_id);
            ctx.status = RunStatus::Cancelled;
            ctx.error = Some(match error {
                Some(e) => format!("Confirmation failed: {}", e),
                None => "Operator declined".to_string(),
            });
            PipelineState::Summarize
        }
    }

    /// Best effort: a failure becomes a warning and the policy decides
    async fn take_snapshot(&self, label: String) -> StageOutcome<String> {
        match self.snapshots.create(None, Some(label)).await {
            Ok(snapshot) => StageOutcome::Completed(snapshot.snapshot_id),
            Err(e) => StageOutcome::Warning(e.to_string()),
        }
    }

    async fn snapshot(&self, ctx: &mut RunContext) -> PipelineState {
        let started = ctx.clock.now();
        let label = match &ctx.statement {
            Some(stmt) => format!("before {}: {}", stmt.kind, stmt.preview(120)),
            None => "before execution".to_string(),
        };

        match self.take_snapshot(label.clone()).await {
            StageOutcome::Completed(snapshot_id) => {
                ctx.record(
                    StepAction::Snapshot,
                    started,
                    json!({ "label": label }),
                    json!({ "snapshotId": snapshot_id }),
                    StepStatus::Success,
                    None,
                );
                ctx.snapshot_id = Some(snapshot_id);
                PipelineState::Execute
            }
            StageOutcome::Warning(message) => {
                warn!("Snapshot for run {} failed: {}", ctx.run_id, message);
                ctx.record(
                    StepAction::Snapshot,
                    started,
                    json!({ "label": label, "policy": self.snapshot_policy }),
                    json!({ "snapshotId": Value::Null }),
                    StepStatus::Error,
                    Some(message.clone()),
                );

                match self.snapshot_policy {
                    SnapshotFailurePolicy::Proceed => PipelineState::Execute,
                    SnapshotFailurePolicy::Block => {
                        ctx.status = RunStatus::Blocked;
                        ctx.error = Some(format!("Snapshot failed: {}", message));
                        PipelineState::Summarize
                    }
                }
            }
        }
    }

    async fn execute(&self, ctx: &mut RunContext) -> PipelineState {
        let started = ctx.clock.now();
        let Some(stmt) = ctx.statement.clone() else {
            ctx.status = RunStatus::Failed;
            ctx.error = Some("No analyzed statement to execute".to_string());
            return PipelineState::Summarize;
        };
        let executed_sql = stmt.canonical_sql();

        match execute_statement(self.db.as_ref(), &stmt).await {
            Ok(result) => {
                info!("Run {} executed: {} rows", ctx.run_id, result.row_count());
                ctx.record(
                    StepAction::Execute,
                    started,
                    json!({ "sql": executed_sql }),
                    json!({ "rowCount": result.row_count() }),
                    StepStatus::Success,
                    None,
                );
                ctx.execution_result = Some(result);
            }
            Err(e) => {
                warn!("Run {} execution failed: {}", ctx.run_id, e);
                ctx.record(
                    StepAction::Execute,
                    started,
                    json!({ "sql": executed_sql }),
                    Value::Null,
                    StepStatus::Error,
                    Some(e.to_string()),
                );
                ctx.status = RunStatus::Failed;
                ctx.error = Some(e.to_string());
            }
        }

        PipelineState::Summarize
    }

    fn summarize(&self, ctx: &mut RunContext) -> PipelineState {
        ctx.summary = Self::summary_text(ctx);

        match ctx.status {
            RunStatus::Completed | RunStatus::Failed => PipelineState::Done,
            RunStatus::Cancelled | RunStatus::Blocked => PipelineState::Cancelled,
            RunStatus::Refused => PipelineState::Refused,
        }
    }

    fn summary_text(ctx: &RunContext) -> String {
        let kind = ctx
            .statement
            .as_ref()
            .map(|s| s.kind)
            .unwrap_or(StatementKind::Unknown);
        let level = ctx.risk.as_ref().map(|r| r.level).unwrap_or(RiskLevel::Unknown);

        let outcome = match (ctx.status, &ctx.execution_result) {
            (RunStatus::Completed, Some(ExecutionResult::Rows { row_count, .. })) => {
                format!("completed, {} rows returned", row_count)
            }
            (RunStatus::Completed, Some(ExecutionResult::Affected { rows_affected })) => {
                format!("completed, {} rows affected", rows_affected)
            }
            (status, _) => match &ctx.error {
                Some(e) => format!("{}: {}", status.as_str(), e),
                None => status.as_str().to_string(),
            },
        };

        let mut summary = format!(
            "[{}] {} (risk {}, estimated rows {}) {}",
            ctx.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            kind,
            level,
            ctx.estimated_rows(),
            outcome
        );
        if let Some(snapshot_id) = &ctx.snapshot_id {
            summary.push_str(&format!("; snapshot {}", snapshot_id));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::ColumnInfo;
    use crate::storage::{MemoryStorage, Storage};
    use crate::testing::{MockDatabase, ScriptedConfirmer};
    use pretty_assertions::assert_eq;

    struct Harness {
        db: Arc<MockDatabase>,
        snapshot_storage: Arc<MemoryStorage>,
        runs: Arc<RunStore>,
        orchestrator: Orchestrator,
    }

    fn harness(policy: SnapshotFailurePolicy) -> Harness {
        let db = Arc::new(MockDatabase::new());
        db.create_table(
            "person",
            vec![ColumnInfo::new("id", "integer"), ColumnInfo::new("location_id", "integer")],
            vec![json!({"id": 1, "location_id": 1}), json!({"id": 4, "location_id": 2})],
        );

        let snapshot_storage = Arc::new(MemoryStorage::new());
        let snapshots = Arc::new(SnapshotManager::new(db.clone(), snapshot_storage.clone(), 1000));
        let runs = Arc::new(RunStore::new(Arc::new(MemoryStorage::new())));
        let safety = SafetyConfig {
            snapshot_failure_policy: policy,
            ..SafetyConfig::default()
        };
        let orchestrator = Orchestrator::new(db.clone(), snapshots, runs.clone(), &safety);

        Harness {
            db,
            snapshot_storage,
            runs,
            orchestrator,
        }
    }

    fn actions(run: &Run) -> Vec<StepAction> {
        run.audit_steps.iter().map(|s| s.action).collect()
    }

    #[tokio::test]
    async fn test_select_runs_without_confirmation() {
        let h = harness(SnapshotFailurePolicy::Proceed);
        h.db.respond_to("COUNT(*)", vec![json!({"estimated_rows": 2})]);
        h.db.respond_to("FROM person", vec![json!({"id": 1}), json!({"id": 4})]);
        let confirmer = ScriptedConfirmer::approving();

        let run = h.orchestrator.run("SELECT * FROM person;", &confirmer).await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.risk_level, RiskLevel::Low);
        assert_eq!(run.estimated_rows, 2);
        assert_eq!(
            actions(&run),
            vec![StepAction::Analyze, StepAction::DryRun, StepAction::RiskCheck, StepAction::Execute]
        );
        assert_eq!(confirmer.requests().len(), 0);
        assert_eq!(run.execution_result.as_ref().map(|r| r.row_count()), Some(2));
        assert!(run.snapshot_id.is_none());
        assert!(h.db.executed().is_empty());
    }

    #[tokio::test]
    async fn test_unfiltered_update_denied_is_cancelled() {
        let h = harness(SnapshotFailurePolicy::Proceed);
        h.db.respond_to("COUNT(*)", vec![json!({"estimated_rows": 2})]);
        let before = h.db.table_rows("person");
        let confirmer = ScriptedConfirmer::denying();

        let run = h.orchestrator.run("UPDATE person SET location_id = 999;", &confirmer).await;

        assert_eq!(run.risk_level, RiskLevel::High);
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(confirmer.requests().len(), 1);
        assert_eq!(confirmer.requests()[0].risk.level, RiskLevel::High);
        assert_eq!(
            actions(&run),
            vec![StepAction::Analyze, StepAction::DryRun, StepAction::RiskCheck, StepAction::Confirmation]
        );
        assert_eq!(run.audit_steps[3].status, StepStatus::Cancelled);
        assert!(h.db.executed().is_empty());
        assert_eq!(h.db.table_rows("person"), before);
        assert!(h.snapshot_storage.list().await.unwrap().is_empty());
        assert!(run.summary.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_drop_snapshots_before_executing() {
        let h = harness(SnapshotFailurePolicy::Proceed);
        let confirmer = ScriptedConfirmer::approving();

        let run = h.orchestrator.run("DROP TABLE person;", &confirmer).await;

        assert_eq!(run.risk_level, RiskLevel::Critical);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(
            actions(&run),
            vec![
                StepAction::Analyze,
                StepAction::DryRun,
                StepAction::RiskCheck,
                StepAction::Confirmation,
                StepAction::Snapshot,
                StepAction::Execute,
            ]
        );

        let snapshot_id = run.snapshot_id.clone().unwrap();
        assert!(h.snapshot_storage.get(&snapshot_id).await.unwrap().is_some());

        let events = h.db.events();
        let captured = events.iter().position(|e| e == "capture").unwrap();
        let dropped = events.iter().position(|e| e.starts_with("execute:DROP TABLE person")).unwrap();
        assert!(captured < dropped);
        assert!(run.summary.contains(&snapshot_id));
    }

    #[tokio::test]
    async fn test_unknown_statements_are_never_executed() {
        let h = harness(SnapshotFailurePolicy::Proceed);
        let confirmer = ScriptedConfirmer::approving();

        for sql in ["DELETE FROM person WHERE","SELECT 1; DROP TABLE person", "", "EXPLAIN SELECT 1"] {
            let run = h.orchestrator.run(sql, &confirmer).await;
            assert_eq!(run.status, RunStatus::Refused, "{}", sql);
            assert_eq!(run.risk_level, RiskLevel::Unknown);
            assert_eq!(run.audit_steps.last().map(|s| s.action), Some(StepAction::Refuse));
            assert!(run.execution_result.is_none());
        }

        assert!(h.db.executed().is_empty());
        assert!(h.db.fetched().is_empty());
        assert!(confirmer.requests().is_empty());
    }

    #[tokio::test]
    async fn test_writes_wrapped_in_queries_are_refused() {
        let h = harness(SnapshotFailurePolicy::Proceed);
        let before = h.db.table_rows("person");
        let confirmer = ScriptedConfirmer::denying();

        for sql in [
            "WITH x AS (SELECT 1) DELETE FROM person",
            "WITH d AS (DELETE FROM person RETURNING *) SELECT * FROM d",
            "SELECT * INTO person_copy FROM person",
        ] {
            let run = h.orchestrator.run(sql, &confirmer).await;
            assert_eq!(run.status, RunStatus::Refused, "{}", sql);
            assert_eq!(run.statement_kind, StatementKind::Unknown);
            assert_eq!(run.risk_level, RiskLevel::Unknown);
            assert_eq!(
                actions(&run),
                vec![StepAction::Analyze, StepAction::DryRun, StepAction::RiskCheck, StepAction::Refuse]
            );
        }

        assert!(confirmer.requests().is_empty());
        assert!(h.db.fetched().is_empty());
        assert!(h.db.executed().is_empty());
        assert_eq!(h.db.table_rows("person"), before);
    }

    #[tokio::test]
    async fn test_snapshot_failure_proceeds_by_default() {
        let h = harness(SnapshotFailurePolicy::Proceed);
        h.db.respond_to("COUNT(*)", vec![json!({"estimated_rows": 1})]);
        h.db.affect("DELETE FROM person", 1);
        h.db.fail_capture();

        let run = h
            .orchestrator
            .run("DELETE FROM person WHERE id = 4", &ScriptedConfirmer::approving())
            .await;

        assert_eq!(run.risk_level, RiskLevel::Medium);
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.snapshot_id.is_none());
        assert_eq!(run.audit_steps[4].action, StepAction::Snapshot);
        assert_eq!(run.audit_steps[4].status, StepStatus::Error);
        assert_eq!(run.execution_result, Some(ExecutionResult::Affected { rows_affected: 1 }));
        assert_eq!(h.db.executed(), vec!["DELETE FROM person WHERE id = 4".to_string()]);
    }

    #[tokio::test]
    async fn test_snapshot_failure_blocks_under_block_policy() {
        let h = harness(SnapshotFailurePolicy::Block);
        h.db.fail_capture();

        let run = h
            .orchestrator
            .run("DROP TABLE person", &ScriptedConfirmer::approving())
            .await;

        assert_eq!(run.status, RunStatus::Blocked);
        assert!(h.db.executed().is_empty());
        assert_eq!(run.audit_steps.last().map(|s| s.action), Some(StepAction::Snapshot));
        assert!(run.error.unwrap().starts_with("Snapshot failed"));
    }

    #[tokio::test]
    async fn test_confirmer_error_is_a_denial() {
        let h = harness(SnapshotFailurePolicy::Proceed);

        let run = h
            .orchestrator
            .run("TRUNCATE person", &ScriptedConfirmer::failing("console closed"))
            .await;

        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.audit_steps[3].status, StepStatus::Error);
        assert!(h.db.executed().is_empty());
    }

    #[tokio::test]
    async fn test_execution_failure_is_recorded() {
        let h = harness(SnapshotFailurePolicy::Proceed);
        h.db.fail_execute_on("INSERT INTO person");

        let run = h
            .orchestrator
            .run("INSERT INTO person VALUES (9, 9)", &ScriptedConfirmer::approving())
            .await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.estimated_rows, 1);
        let execute = run.audit_steps.last().unwrap();
        assert_eq!(execute.action, StepAction::Execute);
        assert_eq!(execute.status, StepStatus::Error);
        assert!(execute.error.as_ref().unwrap().contains("injected"));
        assert!(run.summary.contains("failed"));
    }

    #[tokio::test]
    async fn test_steps_are_ordered_in_time() {
        let h = harness(SnapshotFailurePolicy::Proceed);
        let run = h
            .orchestrator
            .run("DROP TABLE person", &ScriptedConfirmer::approving())
            .await;

        let mut previous_end = run.timestamp;
        for (i, step) in run.audit_steps.iter().enumerate() {
            assert_eq!(step.step_id, i + 1);
            assert!(step.started_at >= previous_end);
            assert!(step.ended_at >= step.started_at);
            previous_end = step.ended_at;
        }
    }

    #[tokio::test]
    async fn test_submit_persists_run() {
        let h = harness(SnapshotFailurePolicy::Proceed);
        h.db.respond_to("COUNT(*)", vec![json!({"estimated_rows": 0})]);

        let (run_id, summary) = h
            .orchestrator
            .submit("SELECT id FROM person WHERE id = 7", &ScriptedConfirmer::denying())
            .await
            .unwrap();

        assert_eq!(summary.run_id, run_id);
        assert_eq!(summary.status, RunStatus::Completed);
        let stored = h.runs.load(&run_id).await.unwrap();
        assert_eq!(stored.sql, "SELECT id FROM person WHERE id = 7");
        assert_eq!(stored.audit_steps.len(), 4);
    }
}
