//! Repository trait and the in-process record table both stores share.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use vpipe_models::{VideoId, VideoRecord, MAX_FILENAME_LEN};

use crate::error::{RecordError, RecordResult};

/// Durable store of video records.
///
/// Ids are assigned by the store, start at 1 and are never reused, even
/// after the record they named has been deleted.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Insert a record for a fresh upload.
    async fn create(&self, original_filename: &str) -> RecordResult<VideoRecord>;

    /// Get a record by ID.
    async fn get(&self, id: VideoId) -> RecordResult<Option<VideoRecord>>;

    /// Point the record at its latest finished artifact.
    async fn set_processed(&self, id: VideoId, processed_filename: &str) -> RecordResult<VideoRecord>;

    /// Delete one record. Returns false if there was nothing to delete.
    async fn delete(&self, id: VideoId) -> RecordResult<bool>;

    /// Delete every record. Returns how many were removed.
    async fn clear(&self) -> RecordResult<usize>;

    /// All records ordered by ID.
    async fn list(&self) -> RecordResult<Vec<VideoRecord>>;
}

/// Record table plus the id counter, serialized as-is by the file store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RecordTable {
    next_id: i64,
    videos: BTreeMap<VideoId, VideoRecord>,
}

impl Default for RecordTable {
    fn default() -> Self {
        Self {
            next_id: 1,
            videos: BTreeMap::new(),
        }
    }
}

impl RecordTable {
    /// Repair a loaded table whose counter lags its records.
    pub(crate) fn normalize(mut self) -> Self {
        let floor = self.videos.keys().next_back().map_or(1, |id| id.as_i64() + 1);
        self.next_id = self.next_id.max(floor);
        self
    }

    pub(crate) fn insert(&mut self, original_filename: &str) -> RecordResult<VideoRecord> {
        check_filename(original_filename)?;
        let id = VideoId(self.next_id);
        self.next_id += 1;
        let record = VideoRecord::new(id, original_filename);
        self.videos.insert(id, record.clone());
        Ok(record)
    }

    pub(crate) fn get(&self, id: VideoId) -> Option<VideoRecord> {
        self.videos.get(&id).cloned()
    }

    pub(crate) fn set_processed(
        &mut self,
        id: VideoId,
        processed_filename: &str,
    ) -> RecordResult<VideoRecord> {
        check_filename(processed_filename)?;
        let record = self.videos.get_mut(&id).ok_or(RecordError::NotFound(id))?;
        record.processed_filename = Some(processed_filename.to_string());
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    pub(crate) fn remove(&mut self, id: VideoId) -> bool {
        self.videos.remove(&id).is_some()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let count = self.videos.len();
        self.videos.clear();
        count
    }

    pub(crate) fn list(&self) -> Vec<VideoRecord> {
        self.videos.values().cloned().collect()
    }
}

fn check_filename(name: &str) -> RecordResult<()> {
    if name.is_empty() {
        return Err(RecordError::invalid_filename("filename is empty"));
    }
    if name.len() > MAX_FILENAME_LEN {
        return Err(RecordError::invalid_filename(format!(
            "{} bytes exceeds the {} byte limit",
            name.len(),
            MAX_FILENAME_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_not_reused() {
        let mut table = RecordTable::default();
        let first = table.insert("a.mp4").unwrap();
        assert_eq!(first.id, VideoId(1));
        assert!(table.remove(first.id));
        assert_eq!(table.insert("b.mp4").unwrap().id, VideoId(2));
        table.clear();
        assert_eq!(table.insert("c.mp4").unwrap().id, VideoId(3));
    }

    #[test]
    fn test_filename_limit() {
        let mut table = RecordTable::default();
        assert!(table.insert(&"a".repeat(MAX_FILENAME_LEN)).is_ok());
        let err = table.insert(&"a".repeat(MAX_FILENAME_LEN + 1)).unwrap_err();
        assert!(matches!(err, RecordError::InvalidFilename(_)));
        assert!(matches!(table.insert(""), Err(RecordError::InvalidFilename(_))));
    }

    #[test]
    fn test_set_processed_missing() {
        let mut table = RecordTable::default();
        let err = table.set_processed(VideoId(9), "x.mp4").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_normalize_lifts_counter() {
        let mut table = RecordTable::default();
        table.insert("a.mp4").unwrap();
        table.insert("b.mp4").unwrap();
        table.next_id = 1;
        let table = table.normalize();
        assert_eq!(table.next_id, 3);
    }
}
