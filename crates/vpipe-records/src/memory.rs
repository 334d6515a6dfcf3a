//! In-memory record store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use vpipe_models::{VideoId, VideoRecord};

use crate::error::RecordResult;
use crate::repository::{RecordTable, VideoRepository};

/// Record store that lives and dies with the process.
#[derive(Debug, Default)]
pub struct MemoryVideoRepository {
    table: RwLock<RecordTable>,
}

impl MemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoRepository for MemoryVideoRepository {
    async fn create(&self, original_filename: &str) -> RecordResult<VideoRecord> {
        let record = self.table.write().await.insert(original_filename)?;
        metrics::counter!("vpipe_records_created_total").increment(1);
        Ok(record)
    }

    async fn get(&self, id: VideoId) -> RecordResult<Option<VideoRecord>> {
        Ok(self.table.read().await.get(id))
    }

    async fn set_processed(&self, id: VideoId, processed_filename: &str) -> RecordResult<VideoRecord> {
        self.table.write().await.set_processed(id, processed_filename)
    }

    async fn delete(&self, id: VideoId) -> RecordResult<bool> {
        Ok(self.table.write().await.remove(id))
    }

    async fn clear(&self) -> RecordResult<usize> {
        Ok(self.table.write().await.clear())
    }

    async fn list(&self) -> RecordResult<Vec<VideoRecord>> {
        Ok(self.table.read().await.list())
    }
}
