//! Snapshot Module
//!
//! Point-in-time captures of table structure and data, and the restore
//! engine that rolls the database back to them.

pub mod manager;
pub mod types;

pub use manager::SnapshotManager;
pub use types::{RestoreReport, Snapshot, SnapshotSummary, TableSnapshot};
