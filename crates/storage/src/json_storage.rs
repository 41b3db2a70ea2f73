//! JSON state file.
//!
//! The CLI keeps the whole store in one pretty-printed JSON document between
//! invocations. It is loaded into a [`MemoryStorage`] on start and written
//! back after a command changes anything.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use super::{MemoryStorage, Result, State};

/// A state file on disk.
#[derive(Debug, Clone)]
pub struct JsonStateFile {
    path: PathBuf,
}

impl JsonStateFile {
    /// Point at a state file. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store. A missing file is an empty store.
    pub async fn load(&self) -> Result<MemoryStorage> {
        let state: State = read_json(&self.path).await?.unwrap_or_default();
        debug!("Loaded state from {}", self.path.display());
        Ok(MemoryStorage::from_state(state))
    }

    /// Write the store back, replacing the file atomically.
    pub async fn save(&self, storage: &MemoryStorage) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let state = storage.export_state().await;
        let json = serde_json::to_string_pretty(&state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CheckStore, PipelineStore, StorageError, VersionStore};
    use ratchet_core::{Checkable, DiscoveredVersion, Resource, ResourceId, VersionContent};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let file = JsonStateFile::new(dir.path().join("state.json"));
        let store = file.load().await.unwrap();
        assert!(store.list_pipelines().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_survives_save_and_load() {
        let dir = TempDir::new().unwrap();
        let file = JsonStateFile::new(dir.path().join("nested").join("state.json"));

        let store = MemoryStorage::new();
        let pipeline = store.save_pipeline("main").await.unwrap();
        let resource = store
            .save_resource(Resource::new(ResourceId(0), pipeline.id, "repo", "git").with_source(json!({"uri": "x"})))
            .await
            .unwrap();
        let scope = store.find_or_create_scope(resource.config_scope()).await.unwrap();
        store.set_checkable_scope(&resource.reference(), &scope.id).await.unwrap();
        let version: VersionContent = [("ref".to_string(), "a".to_string())].into();
        store.record_versions(&scope.id, &[DiscoveredVersion::from(version)]).await.unwrap();
        file.save(&store).await.unwrap();

        let reloaded = file.load().await.unwrap();
        let found = reloaded.find_pipeline("main").await.unwrap().unwrap();
        assert_eq!(found.id, pipeline.id);
        assert_eq!(reloaded.latest_versions(&scope.id).await.unwrap().len(), 1);

        // Ids keep counting from where they left off.
        let other = reloaded.save_pipeline("other").await.unwrap();
        assert!(other.id.get() > resource.id.get());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let err = JsonStateFile::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StorageError::Json(_)));
    }
}
