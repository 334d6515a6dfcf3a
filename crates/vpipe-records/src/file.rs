//! Record store persisted to a JSON file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use vpipe_models::{VideoId, VideoRecord};

use crate::error::{RecordError, RecordResult};
use crate::repository::{RecordTable, VideoRepository};

/// Record store backed by a single JSON document.
///
/// Every mutation rewrites the document through a sibling temp file and a
/// rename, so a crash leaves either the old or the new table on disk. The
/// write lock is held across the rewrite, which serializes writers.
#[derive(Debug)]
pub struct JsonFileVideoRepository {
    path: PathBuf,
    table: RwLock<RecordTable>,
}

impl JsonFileVideoRepository {
    /// Load the table at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> RecordResult<Self> {
        let path = path.into();
        let table = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<RecordTable>(&bytes)
                .map_err(|e| RecordError::Corrupt(format!("{}: {}", path.display(), e)))?
                .normalize(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                RecordTable::default()
            }
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), "Opened record store");
        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &RecordTable) -> RecordResult<()> {
        let bytes = serde_json::to_vec_pretty(table)?;
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        // Contents must be on disk before the rename makes them visible.
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), size_bytes = bytes.len(), "Persisted records");
        Ok(())
    }
}

#[async_trait]
impl VideoRepository for JsonFileVideoRepository {
    async fn create(&self, original_filename: &str) -> RecordResult<VideoRecord> {
        let mut table = self.table.write().await;
        let mut next = table.clone();
        let record = next.insert(original_filename)?;
        self.persist(&next).await?;
        *table = next;
        metrics::counter!("vpipe_records_created_total").increment(1);
        Ok(record)
    }

    async fn get(&self, id: VideoId) -> RecordResult<Option<VideoRecord>> {
        Ok(self.table.read().await.get(id))
    }

    async fn set_processed(&self, id: VideoId, processed_filename: &str) -> RecordResult<VideoRecord> {
        let mut table = self.table.write().await;
        let mut next = table.clone();
        let record = next.set_processed(id, processed_filename)?;
        self.persist(&next).await?;
        *table = next;
        Ok(record)
    }

    async fn delete(&self, id: VideoId) -> RecordResult<bool> {
        let mut table = self.table.write().await;
        let mut next = table.clone();
        if !next.remove(id) {
            return Ok(false);
        }
        self.persist(&next).await?;
        *table = next;
        Ok(true)
    }

    async fn clear(&self) -> RecordResult<usize> {
        let mut table = self.table.write().await;
        let mut next = table.clone();
        let removed = next.clear();
        self.persist(&next).await?;
        *table = next;
        Ok(removed)
    }

    async fn list(&self) -> RecordResult<Vec<VideoRecord>> {
        Ok(self.table.read().await.list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("db").join("videos.json");

        let repo = JsonFileVideoRepository::open(&path).await.unwrap();
        let a = repo.create("a.mp4").await.unwrap();
        let b = repo.create("b.mp4").await.unwrap();
        repo.set_processed(a.id, "final_processed_a_1.mp4").await.unwrap();
        repo.delete(b.id).await.unwrap();
        drop(repo);

        let reopened = JsonFileVideoRepository::open(&path).await.unwrap();
        let records = reopened.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].processed_filename.as_deref(),
            Some("final_processed_a_1.mp4")
        );
        // The deleted id stays retired.
        assert_eq!(reopened.create("c.mp4").await.unwrap().id, VideoId(3));
    }

    #[tokio::test]
    async fn test_persist_replaces_document_whole() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("videos.json");
        let repo = JsonFileVideoRepository::open(&path).await.unwrap();
        repo.create("a.mp4").await.unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(on_disk.is_object());
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_table_alone() {
        let temp = TempDir::new().unwrap();
        let repo = JsonFileVideoRepository::open(temp.path().join("videos.json"))
            .await
            .unwrap();
        let err = repo.set_processed(VideoId(4), "x.mp4").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("videos.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = JsonFileVideoRepository::open(&path).await.unwrap_err();
        assert!(matches!(err, RecordError::Corrupt(_)));
    }
}
