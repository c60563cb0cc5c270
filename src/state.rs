//! Application state management
//!
//! Contains shared state accessible across all handlers. Every component
//! receives its database and storage handles here, once, at startup.

use crate::audit::{ReplayEngine, RunStore};
use crate::config::SafetyConfig;
use crate::db::Database;
use crate::pipeline::Orchestrator;
use crate::snapshot::SnapshotManager;
use crate::storage::Storage;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Pipeline entry point for submitted statements
    pub orchestrator: Orchestrator,

    /// Snapshot capture and rollback
    pub snapshots: Arc<SnapshotManager>,

    /// Persisted run records
    pub runs: Arc<RunStore>,

    /// Read-only replay of recorded runs
    pub replay: ReplayEngine,
}

impl AppState {
    pub fn new(
        db: Arc<dyn Database>,
        snapshot_storage: Arc<dyn Storage>,
        run_storage: Arc<dyn Storage>,
        safety: &SafetyConfig,
    ) -> Self {
        let snapshots = Arc::new(SnapshotManager::new(
            db.clone(),
            snapshot_storage,
            safety.snapshot_sample_cap,
        ));
        let runs = Arc::new(RunStore::new(run_storage));
        let orchestrator = Orchestrator::new(db.clone(), snapshots.clone(), runs.clone(), safety);
        let replay = ReplayEngine::new(db, runs.clone());

        Self {
            orchestrator,
            snapshots,
            runs,
            replay,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{RunStatus, StaticConfirmer};
    use crate::storage::MemoryStorage;
    use crate::testing::MockDatabase;

    #[tokio::test]
    async fn test_components_share_handles() {
        let db = Arc::new(MockDatabase::new());
        let state = AppState::new(
            db.clone(),
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
            &SafetyConfig::default(),
        );

        let (run_id, summary) = state
            .orchestrator
            .submit("DROP TABLE person", &StaticConfirmer::new(true))
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(state.runs.load(&run_id).await.unwrap().run_id, run_id);
        assert_eq!(state.snapshots.list().await.unwrap().len(), 1);
        assert_eq!(db.executed(), vec!["DROP TABLE person".to_string()]);
    }
}
