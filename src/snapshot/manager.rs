//! Snapshot Manager
//!
//! Captures every visible table (structure, total row count and a bounded
//! row sample) from one consistent read and restores that state later. A restore first drops tables
//! that did not exist at capture time, then drops and recreates every
//! captured table and reloads its sample. The whole restore is handed to
//! the driver as one transactional unit.
//!
//! Tables whose row count exceeded the sample cap can only be restored to
//! the retained sample. The report lists them explicitly. A partitioned
//! table comes back as one plain table holding all of its rows; the
//! partition layout itself is not recreated.

use super::types::{RestoreReport, Snapshot, SnapshotSummary, TableSnapshot};
use crate::db::{Database, RestoreOp};
use crate::error::{not_found_error, AppError};
use crate::storage::{timestamped_key, validate_key, Storage};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

pub struct SnapshotManager {
    db: Arc<dyn Database>,
    storage: Arc<dyn Storage>,
    sample_cap: usize,
}

impl SnapshotManager {
    pub fn new(db: Arc<dyn Database>, storage: Arc<dyn Storage>, sample_cap: usize) -> Self {
        Self {
            db,
            storage,
            sample_cap,
        }
    }

    /// Capture and persist a snapshot of the current schema
    pub async fn create(
        &self,
        snapshot_id: Option<String>,
        label: Option<String>,
    ) -> Result<Snapshot, AppError> {
        let timestamp = Utc::now();
        let snapshot_id = snapshot_id.unwrap_or_else(|| timestamped_key("SNAP", timestamp));
        validate_key(&snapshot_id)?;

        if self.storage.get(&snapshot_id).await?.is_some() {
            return Err(AppError::BadRequest(format!(
                "Snapshot '{}' already exists",
                snapshot_id
            )));
        }

        let mut tables = BTreeMap::new();
        for captured in self.db.capture(self.sample_cap).await? {
            let truncated = captured.row_count > captured.sample.len() as i64;

            if truncated {
                warn!(
                    "Table {} has {} rows; snapshot keeps only {}",
                    captured.table,
                    captured.row_count,
                    captured.sample.len()
                );
            }

            tables.insert(
                captured.table,
                TableSnapshot {
                    structure: captured.columns,
                    row_count: captured.row_count,
                    data_sample: captured.sample,
                    truncated,
                },
            );
        }

        let snapshot = Snapshot {
            checksum: Snapshot::compute_checksum(&tables),
            snapshot_id,
            timestamp,
            label,
            tables,
        };

        let location = self
            .storage
            .put(&snapshot.snapshot_id, &serde_json::to_value(&snapshot)?)
            .await?;

        info!(
            "Snapshot {} saved to {} ({} tables)",
            snapshot.snapshot_id,
            location,
            snapshot.tables.len()
        );
        Ok(snapshot)
    }

    /// Load one snapshot
    pub async fn get(&self, snapshot_id: &str) -> Result<Snapshot, AppError> {
        let value = self
            .storage
            .get(snapshot_id)
            .await?
            .ok_or_else(|| not_found_error(format!("Snapshot '{}' not found", snapshot_id)))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Summaries of every readable snapshot, newest first
    pub async fn list(&self) -> Result<Vec<SnapshotSummary>, AppError> {
        let mut summaries = Vec::new();

        for key in self.storage.list().await? {
            match self.get(&key).await {
                Ok(snapshot) => summaries.push(SnapshotSummary::from(&snapshot)),
                Err(e) => warn!("Skipping unreadable snapshot {}: {}", key, e),
            }
        }

        summaries.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.snapshot_id.cmp(&a.snapshot_id))
        });
        Ok(summaries)
    }

    /// Restore the database to a snapshot. Refuses without `confirm`.
    pub async fn restore(&self, snapshot_id: &str, confirm: bool) -> Result<RestoreReport, AppError> {
        if !confirm {
            return Err(AppError::BadRequest(
                "Rollback requires explicit confirmation (confirm=true)".to_string(),
            ));
        }

        let snapshot = self.get(snapshot_id).await?;
        if !snapshot.verify_checksum() {
            return Err(AppError::RollbackFailed(format!(
                "Snapshot '{}' failed checksum verification",
                snapshot_id
            )));
        }

        let current: BTreeSet<String> = self.db.list_tables().await?.into_iter().collect();
        let ops = Self::restore_ops(&snapshot, &current);

        self.db
            .apply_restore(&ops)
            .await
            .map_err(|e| AppError::RollbackFailed(format!("Restore of '{}' rolled back: {}", snapshot_id, e)))?;

        let dropped_tables: Vec<String> = current
            .iter()
            .filter(|t| !snapshot.tables.contains_key(*t))
            .cloned()
            .collect();
        let report = RestoreReport {
            snapshot_id: snapshot.snapshot_id.clone(),
            dropped_tables,
            restored_tables: snapshot.tables.keys().cloned().collect(),
            rows_inserted: snapshot.tables.values().map(|t| t.data_sample.len()).sum(),
            truncated_tables: snapshot.truncated_tables(),
        };

        info!(
            "Restored snapshot {}: {} tables restored, {} dropped, {} rows",
            report.snapshot_id,
            report.restored_tables.len(),
            report.dropped_tables.len(),
            report.rows_inserted
        );
        if !report.truncated_tables.is_empty() {
            warn!(
                "Restore of {} is partial for sampled tables: {:?}",
                report.snapshot_id, report.truncated_tables
            );
        }

        Ok(report)
    }

    /// Ordered operations that bring `current` back to `snapshot`
    pub fn restore_ops(snapshot: &Snapshot, current: &BTreeSet<String>) -> Vec<RestoreOp> {
        let mut ops: Vec<RestoreOp> = current
            .iter()
            .filter(|t| !snapshot.tables.contains_key(*t))
            .map(|t| RestoreOp::DropTable { table: t.clone() })
            .collect();

        for (name, table) in &snapshot.tables {
            ops.push(RestoreOp::DropTable { table: name.clone() });
            ops.push(RestoreOp::CreateTable {
                table: name.clone(),
                columns: table.structure.clone(),
            });
            if !table.data_sample.is_empty() {
                ops.push(RestoreOp::InsertRows {
                    table: name.clone(),
                    columns: table.structure.iter().map(|c| c.name.clone()).collect(),
                    rows: table.data_sample.clone(),
                });
            }
        }

        ops
    }
}
