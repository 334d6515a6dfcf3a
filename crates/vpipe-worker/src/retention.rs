//! Retention manager.
//!
//! Storage is reclaimed in one of two scopes: a single video's lineage
//! (its upload, every artifact derived from it, and its record), or the
//! whole store. Lineage reclaim follows completed downloads and never runs
//! while another download of the same video is still streaming.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info};

use vpipe_models::VideoId;
use vpipe_records::VideoRepository;
use vpipe_storage::{keys, BlobStore};

use crate::error::WorkerResult;
use crate::locks::RecordLocks;

/// What to reclaim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "video_id", rename_all = "snake_case")]
pub enum ReclaimScope {
    /// One video's upload, artifacts and record
    Lineage(VideoId),
    /// Every upload, artifact and record
    EntireStore,
}

/// Result of a reclaim request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReclaimOutcome {
    Reclaimed {
        records_removed: usize,
        bytes_freed: u64,
    },
    /// Skipped because downloads were still streaming.
    Deferred { in_flight: usize },
}

pub struct RetentionManager {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn VideoRepository>,
    locks: Arc<RecordLocks>,
    in_flight: Mutex<HashMap<VideoId, usize>>,
    reclaim_after_download: bool,
}

impl RetentionManager {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn VideoRepository>,
        locks: Arc<RecordLocks>,
        reclaim_after_download: bool,
    ) -> Self {
        Self {
            blobs,
            records,
            locks,
            in_flight: Mutex::new(HashMap::new()),
            reclaim_after_download,
        }
    }

    /// Downloads of `id` currently streaming.
    pub fn in_flight(&self, id: VideoId) -> usize {
        self.counts().get(&id).copied().unwrap_or(0)
    }

    fn total_in_flight(&self) -> usize {
        self.counts().values().sum()
    }

    fn counts(&self) -> std::sync::MutexGuard<'_, HashMap<VideoId, usize>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a download of `id`. Callers must hold the record's lock.
    pub(crate) fn begin_download(self: &Arc<Self>, id: VideoId) -> DownloadLease {
        let mut counts = self.counts();
        let count = counts.entry(id).or_insert(0);
        *count += 1;
        debug!(video_id = %id, in_flight = *count, "Download started");
        DownloadLease {
            manager: Arc::clone(self),
            id,
            released: false,
        }
    }

    /// Drop one in-flight download, returning how many remain.
    fn end_download(&self, id: VideoId) -> usize {
        let mut counts = self.counts();
        let remaining = match counts.get_mut(&id) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            counts.remove(&id);
        }
        debug!(video_id = %id, in_flight = remaining, "Download ended");
        remaining
    }

    /// Reclaim storage in `scope`.
    ///
    /// Deferred, without deleting anything, while a download the scope
    /// covers is still in flight.
    pub async fn reclaim(&self, scope: ReclaimScope) -> WorkerResult<ReclaimOutcome> {
        match scope {
            ReclaimScope::Lineage(id) => {
                let _guard = self.locks.lock(id).await;
                self.reclaim_lineage(id).await
            }
            ReclaimScope::EntireStore => self.reclaim_store().await,
        }
    }

    /// Lineage reclaim for a caller that already holds the record's lock.
    pub(crate) async fn reclaim_lineage(&self, id: VideoId) -> WorkerResult<ReclaimOutcome> {
        let in_flight = self.in_flight(id);
        if in_flight > 0 {
            info!(video_id = %id, in_flight, "Lineage reclaim deferred");
            return Ok(ReclaimOutcome::Deferred { in_flight });
        }

        // Record before blobs.
        let removed = self.records.delete(id).await?;
        let mut bytes_freed = 0;
        for prefix in keys::lineage_prefixes(id) {
            bytes_freed += self.blobs.delete_tree(&prefix).await?;
        }

        metrics::counter!("vpipe_reclaimed_bytes_total", "scope" => "lineage").increment(bytes_freed);
        info!(video_id = %id, bytes_freed, "Lineage reclaimed");
        Ok(ReclaimOutcome::Reclaimed {
            records_removed: usize::from(removed),
            bytes_freed,
        })
    }

    async fn reclaim_store(&self) -> WorkerResult<ReclaimOutcome> {
        let _gate = self.locks.exclusive().await;

        let in_flight = self.total_in_flight();
        if in_flight > 0 {
            info!(in_flight, "Store reclaim deferred");
            return Ok(ReclaimOutcome::Deferred { in_flight });
        }

        let records_removed = self.records.clear().await?;
        let mut bytes_freed = 0;
        for tree in [keys::UPLOADS_DIR, keys::PROCESSED_DIR] {
            bytes_freed += self.blobs.delete_tree(tree).await?;
        }

        metrics::counter!("vpipe_reclaimed_bytes_total", "scope" => "entire_store")
            .increment(bytes_freed);
        info!(records_removed, bytes_freed, "Store reclaimed");
        Ok(ReclaimOutcome::Reclaimed {
            records_removed,
            bytes_freed,
        })
    }
}

/// One in-flight download.
///
/// Call [`DownloadLease::complete`] once the last byte has been handed to
/// the transport. Dropping the lease instead counts the download as
/// aborted: it stops being in flight but triggers no reclaim.
pub struct DownloadLease {
    manager: Arc<RetentionManager>,
    id: VideoId,
    released: bool,
}

impl std::fmt::Debug for DownloadLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadLease")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

impl DownloadLease {
    /// Mark the transfer finished and reclaim the lineage if it was the last one.
    ///
    /// Returns `None` when no reclaim was attempted.
    pub async fn complete(mut self) -> WorkerResult<Option<ReclaimOutcome>> {
        self.released = true;
        let remaining = self.manager.end_download(self.id);
        if remaining > 0 || !self.manager.reclaim_after_download {
            return Ok(None);
        }
        // Re-checked under the lock: a new download may have started meanwhile.
        self.manager
            .reclaim(ReclaimScope::Lineage(self.id))
            .await
            .map(Some)
    }
}

impl Drop for DownloadLease {
    fn drop(&mut self) {
        if !self.released {
            self.manager.end_download(self.id);
            info!(video_id = %self.id, "Download aborted before completion");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vpipe_records::MemoryVideoRepository;
    use vpipe_storage::LocalBlobStore;

    async fn manager(reclaim: bool) -> (TempDir, Arc<RetentionManager>, Arc<dyn BlobStore>, Arc<dyn VideoRepository>) {
        let temp = TempDir::new().unwrap();
        let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(temp.path()).await.unwrap());
        let records: Arc<dyn VideoRepository> = Arc::new(MemoryVideoRepository::new());
        let manager = Arc::new(RetentionManager::new(
            blobs.clone(),
            records.clone(),
            Arc::new(RecordLocks::new()),
            reclaim,
        ));
        (temp, manager, blobs, records)
    }

    #[tokio::test]
    async fn test_dropped_lease_does_not_reclaim() {
        let (_temp, manager, blobs, records) = manager(true).await;
        let record = records.create("a.mp4").await.unwrap();
        blobs.save(&keys::upload_key(record.id, "a.mp4"), b"123").await.unwrap();

        let lease = manager.begin_download(record.id);
        assert_eq!(manager.in_flight(record.id), 1);
        drop(lease);

        assert_eq!(manager.in_flight(record.id), 0);
        assert!(records.get(record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_last_completed_lease_reclaims() {
        let (_temp, manager, blobs, records) = manager(true).await;
        let record = records.create("a.mp4").await.unwrap();
        blobs.save(&keys::upload_key(record.id, "a.mp4"), b"123").await.unwrap();
        blobs.save(&keys::processed_key(record.id, "lowres_a_1.mp4"), b"45").await.unwrap();

        let first = manager.begin_download(record.id);
        let second = manager.begin_download(record.id);

        assert_eq!(first.complete().await.unwrap(), None);
        assert!(records.get(record.id).await.unwrap().is_some());

        let outcome = second.complete().await.unwrap();
        assert_eq!(
            outcome,
            Some(ReclaimOutcome::Reclaimed {
                records_removed: 1,
                bytes_freed: 5
            })
        );
        assert!(records.get(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reclaim_disabled() {
        let (_temp, manager, _blobs, records) = manager(false).await;
        let record = records.create("a.mp4").await.unwrap();
        let lease = manager.begin_download(record.id);
        assert_eq!(lease.complete().await.unwrap(), None);
        assert!(records.get(record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_reclaim_deferred_while_streaming() {
        let (_temp, manager, _blobs, records) = manager(true).await;
        let record = records.create("a.mp4").await.unwrap();
        let _lease = manager.begin_download(record.id);

        let outcome = manager.reclaim(ReclaimScope::EntireStore).await.unwrap();
        assert_eq!(outcome, ReclaimOutcome::Deferred { in_flight: 1 });
        assert_eq!(records.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_reclaim_clears_everything() {
        let (_temp, manager, blobs, records) = manager(true).await;
        for name in ["a.mp4", "b.mp4"] {
            let record = records.create(name).await.unwrap();
            blobs.save(&keys::upload_key(record.id, name), b"xx").await.unwrap();
        }

        let outcome = manager.reclaim(ReclaimScope::EntireStore).await.unwrap();
        assert_eq!(
            outcome,
            ReclaimOutcome::Reclaimed {
                records_removed: 2,
                bytes_freed: 4
            }
        );
        assert!(records.list().await.unwrap().is_empty());
    }
}
