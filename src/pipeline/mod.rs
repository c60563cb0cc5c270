//! Safety Pipeline Module
//!
//! Every submitted statement passes through the same stages:
//!
//! 1. **Analyze**: parse once, derive kind, tables and predicate presence
//! 2. **Dry run**: estimate affected rows with a read-only counting probe
//! 3. **Risk check**: map the statement to a risk tier
//! 4. **Confirmation**: operator approval for anything above LOW
//! 5. **Snapshot**: best-effort capture before an approved mutation
//! 6. **Execute**: run it and record the whole trail as one audit run

pub mod confirm;
pub mod orchestrator;
pub mod risk;
pub mod types;

// Re-export main types for convenient access
pub use confirm::{
    ConfirmationRequest, Confirmer, ConsoleConfirmer, PolicyConfirmer, StaticConfirmer,
};
pub use orchestrator::{execute_statement, Orchestrator};
pub use risk::RiskClassifier;
pub use types::{
    AuditStep, ExecutionResult, RiskAssessment, RiskLevel, Run, RunStatus, RunSummary,
    StageOutcome, StepAction, StepStatus,
};
