//! Audit Module
//!
//! Persisted run records and the read-only replay of recorded statements.

pub mod replay;
pub mod store;

pub use replay::{ReplayEngine, ReplayOutcome, ReplayStatus};
pub use store::RunStore;
