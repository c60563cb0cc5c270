//! Record Storage
//!
//! Injected persistence handle shared by the snapshot manager and the audit
//! store. One JSON document per key; writes are all-or-nothing.

use crate::error::{validation_error, AppError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

static KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").expect("valid key pattern"));

/// Reject keys that could escape the storage directory
pub fn validate_key(key: &str) -> Result<(), AppError> {
    if !KEY_PATTERN.is_match(key) || key.contains("..") {
        return Err(validation_error(format!(
            "Invalid record id '{}': use letters, digits, '_', '-' and '.'",
            key
        )));
    }
    Ok(())
}

/// Time-ordered record id, e.g. `RUN_20260101_120000_000001`
pub fn timestamped_key(prefix: &str, at: chrono::DateTime<chrono::Utc>) -> String {
    format!("{}_{}", prefix, at.format("%Y%m%d_%H%M%S_%6f"))
}

/// Key-value persistence for JSON records
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store a record, returning where it was written
    async fn put(&self, key: &str, value: &serde_json::Value) -> Result<String, AppError>;

    /// Load a record, `None` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, AppError>;

    /// All stored keys
    async fn list(&self) -> Result<Vec<String>, AppError>;
}

/// One `<key>.json` file per record inside a directory
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn put(&self, key: &str, value: &serde_json::Value) -> Result<String, AppError> {
        validate_key(key)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.path_for(key);
        let tmp = self.root.join(format!(".{}.json.tmp", key));
        let body = serde_json::to_vec_pretty(value)?;

        // Write aside then rename, so readers never observe a partial record
        tokio::fs::write(&tmp, &body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Storage(format!(
                "Failed to persist {}: {}",
                path.display(),
                e
            )));
        }

        debug!("Wrote {} bytes to {}", body.len(), path.display());
        Ok(path.display().to_string())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, AppError> {
        validate_key(key)?;
        let path = self.path_for(key);

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, AppError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = name.strip_suffix(".json") {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-process storage for tests and ephemeral deployments
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, value: &serde_json::Value) -> Result<String, AppError> {
        validate_key(key)?;
        let mut records = self.records.write().await;
        records.insert(key.to_string(), value.clone());
        Ok(format!("memory://{}", key))
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, AppError> {
        validate_key(key)?;
        let records = self.records.read().await;
        Ok(records.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<String>, AppError> {
        let records = self.records.read().await;
        Ok(records.keys().cloned().collect())
    }
}
