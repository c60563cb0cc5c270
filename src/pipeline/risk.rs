//! Risk classification
//!
//! Statement kind is the primary key of the decision table; predicate
//! presence refines UPDATE/DELETE and the estimated row count can only
//! escalate a LOW read. Structural statements are ranked regardless of how
//! many rows they touch.

use crate::pipeline::types::{RiskAssessment, RiskLevel};
use crate::simulation::{Statement, StatementKind};

#[derive(Debug, Clone)]
pub struct RiskClassifier {
    row_escalation_threshold: i64,
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl RiskClassifier {
    pub fn new(row_escalation_threshold: i64) -> Self {
        Self { row_escalation_threshold }
    }

    pub fn classify(&self, stmt: &Statement, estimated_rows: i64) -> RiskAssessment {
        let (level, reason) = match stmt.kind {
            StatementKind::Drop => (
                RiskLevel::Critical,
                "DROP removes objects and their data irreversibly".to_string(),
            ),
            StatementKind::Alter
            | StatementKind::Create
            | StatementKind::Merge
            | StatementKind::Grant
            | StatementKind::Revoke => (
                RiskLevel::High,
                format!("{} changes schema or privileges", stmt.kind),
            ),
            StatementKind::Truncate => (
                RiskLevel::High,
                "TRUNCATE removes every row of the table".to_string(),
            ),
            StatementKind::Update | StatementKind::Delete if !stmt.has_predicate => (
                RiskLevel::High,
                format!("{} without WHERE affects the whole table", stmt.kind),
            ),
            StatementKind::Update | StatementKind::Delete => (
                RiskLevel::Medium,
                format!("{} limited by a WHERE predicate", stmt.kind),
            ),
            StatementKind::Insert => (RiskLevel::Medium, "INSERT adds rows".to_string()),
            StatementKind::Analyze => (
                RiskLevel::Medium,
                "Maintenance statement".to_string(),
            ),
            StatementKind::Select | StatementKind::Comment => {
                if estimated_rows > self.row_escalation_threshold {
                    (
                        RiskLevel::Medium,
                        format!(
                            "Large result: {} estimated rows exceeds {}",
                            estimated_rows, self.row_escalation_threshold
                        ),
                    )
                } else {
                    (RiskLevel::Low, format!("Read-only {}", stmt.kind))
                }
            }
            StatementKind::Commit | StatementKind::Rollback => {
                (RiskLevel::Info, "Transaction control".to_string())
            }
            StatementKind::Unknown => (
                RiskLevel::Unknown,
                match &stmt.parse_error {
                    Some(e) => format!("Statement could not be analyzed: {}", e),
                    None => "Statement could not be analyzed".to_string(),
                },
            ),
        };

        RiskAssessment {
            level,
            reason,
            statement_kind: stmt.kind,
        }
    }
}
