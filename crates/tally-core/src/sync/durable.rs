//! Crash-safe JSON files for sync bookkeeping.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use super::SyncResult;

/// A JSON document replaced atomically on every save.
///
/// Writes go to a sibling `.tmp` file which is fsynced and renamed over the
/// target, so a crash leaves either the old or the new document.
#[derive(Debug, Clone)]
pub(crate) struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when the file does not exist yet.
    pub(crate) async fn load<T: DeserializeOwned>(&self) -> SyncResult<Option<T>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    pub(crate) async fn save<T: Serialize + Sync>(&self, value: &T) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    pub(crate) async fn remove(&self) -> SyncResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_then_load() {
        let temp = TempDir::new().unwrap();
        let file = JsonFile::new(temp.path().join("nested").join("doc.json"));

        assert_eq!(file.load::<Vec<u32>>().await.unwrap(), None);
        file.save(&vec![1_u32, 2, 3]).await.unwrap();
        assert_eq!(file.load::<Vec<u32>>().await.unwrap(), Some(vec![1, 2, 3]));
        assert!(!file.path().with_extension("json.tmp").exists());

        file.remove().await.unwrap();
        file.remove().await.unwrap();
        assert!(!file.path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json");
        std::fs::write(&path, b"{not json").unwrap();

        let result = JsonFile::new(&path).load::<Vec<u32>>().await;
        assert!(matches!(result, Err(super::super::SyncError::Storage(_))));
    }
}
