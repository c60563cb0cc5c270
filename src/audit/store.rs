//! Run store
//!
//! One record per run, keyed by run id. Records are written once when the
//! pipeline finishes and never rewritten.

use crate::error::{not_found_error, AppError};
use crate::pipeline::types::{Run, RunSummary};
use crate::storage::Storage;
use std::sync::Arc;
use tracing::{info, warn};

pub struct RunStore {
    storage: Arc<dyn Storage>,
}

impl RunStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Persist a finished run and return where it was written
    pub async fn save(&self, run: &Run) -> Result<String, AppError> {
        if self.storage.get(&run.run_id).await?.is_some() {
            return Err(AppError::Storage(format!(
                "Run '{}' is already recorded",
                run.run_id
            )));
        }

        let location = self.storage.put(&run.run_id, &serde_json::to_value(run)?).await?;
        info!("Run {} saved to {}", run.run_id, location);
        Ok(location)
    }

    pub async fn load(&self, run_id: &str) -> Result<Run, AppError> {
        let value = self
            .storage
            .get(run_id)
            .await?
            .ok_or_else(|| not_found_error(format!("Run '{}' not found", run_id)))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Summaries of every readable run, newest first
    pub async fn list(&self) -> Result<Vec<RunSummary>, AppError> {
        let mut summaries = Vec::new();
        for key in self.storage.list().await? {
            match self.load(&key).await {
                Ok(run) => summaries.push(RunSummary::from(&run)),
                Err(e) => warn!("Skipping unreadable run {}: {}", key, e),
            }
        }

        summaries.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.run_id.cmp(&a.run_id))
        });
        Ok(summaries)
    }
}
