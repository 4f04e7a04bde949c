//! Persisted instant of the last successful pull.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::durable::JsonFile;
use super::SyncResult;

#[derive(Debug, Serialize, Deserialize)]
struct WatermarkDocument {
    last_sync_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct WatermarkFile {
    file: JsonFile,
}

impl WatermarkFile {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub(crate) async fn load(&self) -> SyncResult<Option<DateTime<Utc>>> {
        let document: Option<WatermarkDocument> = self.file.load().await?;
        Ok(document.map(|document| document.last_sync_date))
    }

    pub(crate) async fn save(&self, last_sync_date: DateTime<Utc>) -> SyncResult<()> {
        self.file.save(&WatermarkDocument { last_sync_date }).await
    }

    pub(crate) async fn clear(&self) -> SyncResult<()> {
        self.file.remove().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_load_clear() {
        let temp = TempDir::new().unwrap();
        let file = WatermarkFile::new(temp.path().join("sync_watermark.json"));
        assert_eq!(file.load().await.unwrap(), None);

        let now = Utc::now();
        file.save(now).await.unwrap();
        assert_eq!(file.load().await.unwrap(), Some(now));

        file.clear().await.unwrap();
        assert_eq!(file.load().await.unwrap(), None);
    }
}
