//! Statement simulation
//!
//! Analysis of submitted SQL and dry-run estimation of its row impact.

mod analyzer;
mod dry_run;

pub use analyzer::{Statement, StatementAnalyzer, StatementKind};
pub use dry_run::{DryRunResult, DryRunner, Probe, ESTIMATE_UNAVAILABLE};
