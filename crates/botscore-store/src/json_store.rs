//! JSON file store
//!
//! The whole score map lives in one JSON object keyed by account. Writes go
//! to a temporary file in the same directory which is then renamed over the
//! target, so a crash mid-write leaves the previous file intact.

use std::path::{Path, PathBuf};

use botscore_core::ScoreMap;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{Result, StoreError};

/// Score map persisted as a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar store holding the fresh results of an in-progress merge
    pub fn snapshot(&self) -> Self {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".fresh.json");
        Self::new(self.path.with_file_name(name))
    }

    /// Read the store; a missing file is an empty store
    pub async fn load(&self) -> Result<ScoreMap> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No stored scores yet");
                return Ok(ScoreMap::new());
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
            snapshot: None,
        })
    }

    /// Replace the store with `scores`
    pub async fn save(&self, scores: &ScoreMap) -> Result<()> {
        write_json_atomic(&self.path, scores).await
    }

    /// Delete the store file if it exists
    pub async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(StoreError::io(&self.path, e))
            }
            _ => Ok(()),
        }
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let data =
        serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialize(e.to_string()))?;
    write_atomic(path, &data).await
}

/// Write `data` to a temporary sibling of `path`, then rename it into place
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    let result = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = result {
        tracing::error!(path = %path.display(), error = %e, "Atomic write failed");
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(StoreError::io(path, e));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use botscore_core::{AccountId, ScoreRecord};

    fn sample_map() -> ScoreMap {
        let mut map = ScoreMap::new();
        map.insert(AccountId::from("U1"), ScoreRecord::new(0.2, 1.1, 1.2));
        map.insert(AccountId::from("U2"), ScoreRecord::new(0.87, 4.3, 4.6));
        map
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("botscores.json"));

        assert!(!store.exists().await);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("Users").join("botscores.json"));

        let map = sample_map();
        store.save(&map).await.unwrap();

        assert!(store.exists().await);
        assert_eq!(store.load().await.unwrap(), map);
    }

    #[tokio::test]
    async fn test_save_replaces_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("botscores.json"));

        store.save(&sample_map()).await.unwrap();
        store.save(&ScoreMap::new()).await.unwrap();

        assert!(store.load().await.unwrap().is_empty());
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("botscores.json");
        std::fs::write(&path, b"{\"U1\": {\"cap\": 0.2").unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_snapshot_path() {
        let store = JsonFileStore::new("Users/botscores.json");
        assert_eq!(
            store.snapshot().path(),
            Path::new("Users/botscores.json.fresh.json")
        );
    }

    #[tokio::test]
    async fn test_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(store.remove().await.is_ok());
    }
}
