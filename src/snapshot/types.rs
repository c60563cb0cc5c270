//! Snapshot records

use crate::db::Row;
use crate::introspection::ColumnInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Captured structure and data of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub structure: Vec<ColumnInfo>,
    /// Total rows at capture time, not just the sampled ones
    pub row_count: i64,
    pub data_sample: Vec<Row>,
    /// The sample holds fewer rows than the table did
    pub truncated: bool,
}

/// Point-in-time copy of every visible table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub snapshot_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub tables: BTreeMap<String, TableSnapshot>,
    pub checksum: String,
}

impl Snapshot {
    /// Compute checksum from table content
    pub fn compute_checksum(tables: &BTreeMap<String, TableSnapshot>) -> String {
        let mut hasher = Sha256::new();

        // BTreeMap iteration is sorted, so the digest is stable
        for (name, table) in tables {
            hasher.update(format!("T:{}:{}:{}", name, table.row_count, table.truncated).as_bytes());
            for col in &table.structure {
                hasher.update(format!("C:{}:{}", col.name, col.data_type).as_bytes());
            }
            for row in &table.data_sample {
                hasher.update(serde_json::Value::Object(row.clone()).to_string().as_bytes());
            }
        }

        format!("{:x}", hasher.finalize())
    }

    pub fn verify_checksum(&self) -> bool {
        Self::compute_checksum(&self.tables) == self.checksum
    }

    /// Tables whose restore can only reproduce the retained sample
    pub fn truncated_tables(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter(|(_, t)| t.truncated)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub snapshot_id: String,
    pub timestamp: DateTime<Utc>,
    pub label: Option<String>,
    pub table_count: usize,
    pub total_rows: i64,
    pub truncated_tables: Vec<String>,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            snapshot_id: snapshot.snapshot_id.clone(),
            timestamp: snapshot.timestamp,
            label: snapshot.label.clone(),
            table_count: snapshot.tables.len(),
            total_rows: snapshot.tables.values().map(|t| t.row_count).sum(),
            truncated_tables: snapshot.truncated_tables(),
        }
    }
}

/// What a restore did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub snapshot_id: String,
    /// Tables created after the snapshot and dropped by the restore
    pub dropped_tables: Vec<String>,
    pub restored_tables: Vec<String>,
    pub rows_inserted: usize,
    /// Restored from a partial sample only
    pub truncated_tables: Vec<String>,
}
