//! SafeDB - Guarded SQL Execution Layer
//!
//! Sits between a caller and a PostgreSQL database. Every statement is
//! analyzed, dry-run for its row impact, risk-classified, optionally
//! confirmed by an operator, snapshotted before risky mutation, executed,
//! and recorded as a replayable audit run.

pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod introspection;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod simulation;
pub mod snapshot;
pub mod state;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ApiResult, AppError};
pub use pipeline::{Confirmer, Orchestrator, RunSummary};
