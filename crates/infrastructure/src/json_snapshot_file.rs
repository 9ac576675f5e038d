use std::path::{Path, PathBuf};

use changeflow_application::Snapshot;
use changeflow_core::{AppError, AppResult};
use tracing::info;

/// Snapshot persisted as one JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonSnapshotFile {
    path: PathBuf,
}

impl JsonSnapshotFile {
    /// Creates a handle for the snapshot file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Reads and parses the snapshot.
    ///
    /// Records are validated while parsing, so a malformed role, resource,
    /// or pattern fails the whole load with a validation error.
    pub async fn load(&self) -> AppResult<Snapshot> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to read snapshot '{}': {error}",
                    self.path.display()
                ))
            })?;

        let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|error| {
            AppError::Validation(format!(
                "invalid snapshot '{}': {error}",
                self.path.display()
            ))
        })?;

        info!(
            path = %self.path.display(),
            roles = snapshot.roles.len(),
            resources = snapshot.resources.len(),
            change_patterns = snapshot.change_patterns.len(),
            "snapshot loaded"
        );

        Ok(snapshot)
    }

    /// Serializes the snapshot and replaces the file contents.
    pub async fn save(&self, snapshot: &Snapshot) -> AppResult<()> {
        let raw = serde_json::to_string_pretty(snapshot)
            .map_err(|error| AppError::Internal(format!("failed to encode snapshot: {error}")))?;

        tokio::fs::write(&self.path, raw).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to write snapshot '{}': {error}",
                self.path.display()
            ))
        })
    }
}
