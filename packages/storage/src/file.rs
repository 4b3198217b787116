//! JSON-file [`ReportStore`].
//!
//! Each key lives in its own `<key>.json` file under the data directory.
//! Writes go to a sibling temp file that is then renamed over the target,
//! so a crash mid-write leaves either the old or the new value.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::paths::{ensure_dir, is_valid_key, key_path};
use crate::{ReportStore, StorageError};

/// A [`ReportStore`] that keeps one JSON file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `dir`. The directory is created on the
    /// first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates a store rooted at [`crate::paths::default_data_dir`].
    #[must_use]
    pub fn open_default() -> Self {
        Self::new(crate::paths::default_data_dir())
    }

    /// Directory holding the key files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(key_path(&self.dir, key))
    }
}

#[async_trait]
impl ReportStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        ensure_dir(&self.dir).await?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;

        log::debug!("wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        std::env::temp_dir().join(format!(
            "clean592-storage-{name}-{}-{nanos}",
            std::process::id()
        ))
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let store = FileStore::new(scratch_dir("missing"));
        assert_eq!(store.load("pending_reports").await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_creates_dir_and_round_trips() {
        let dir = scratch_dir("roundtrip");
        let store = FileStore::new(&dir);

        store.save("history_reports", "[]").await.unwrap();

        assert!(dir.join("history_reports.json").exists());
        assert!(!dir.join("history_reports.json.tmp").exists());
        assert_eq!(
            store.load("history_reports").await.unwrap().as_deref(),
            Some("[]")
        );

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn remove_deletes_file_and_tolerates_missing() {
        let dir = scratch_dir("remove");
        let store = FileStore::new(&dir);

        store.save("pending_reports", "[]").await.unwrap();
        store.remove("pending_reports").await.unwrap();
        store.remove("pending_reports").await.unwrap();

        assert_eq!(store.load("pending_reports").await.unwrap(), None);
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn path_traversal_key_is_rejected() {
        let store = FileStore::new(scratch_dir("invalid"));
        let result = store.save("../escape", "[]").await;
        assert!(matches!(result, Err(StorageError::InvalidKey { .. })));
    }
}
