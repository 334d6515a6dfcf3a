//! Per-video locks under a store-wide gate.
//!
//! Every operation on one video holds that video's mutex plus a shared
//! guard on the gate. Whole-store operations take the gate exclusively,
//! which waits out everything in progress and blocks anything new.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{
    Mutex as AsyncMutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};

use vpipe_models::VideoId;

#[derive(Debug, Default)]
pub struct RecordLocks {
    gate: Arc<RwLock<()>>,
    records: Mutex<HashMap<VideoId, Arc<AsyncMutex<()>>>>,
}

/// Exclusive access to one video. Held for the length of a run.
#[derive(Debug)]
pub struct RecordGuard<'a> {
    locks: &'a RecordLocks,
    id: VideoId,
    guard: Option<OwnedMutexGuard<()>>,
    _gate: OwnedRwLockReadGuard<()>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared hold on the gate, for work that has no video id yet.
    pub async fn shared(&self) -> OwnedRwLockReadGuard<()> {
        self.gate.clone().read_owned().await
    }

    /// Wait for exclusive access to the whole store.
    pub async fn exclusive(&self) -> OwnedRwLockWriteGuard<()> {
        self.gate.clone().write_owned().await
    }

    /// Wait for exclusive access to one video.
    pub async fn lock(&self, id: VideoId) -> RecordGuard<'_> {
        let gate = self.gate.clone().read_owned().await;
        let mutex = {
            let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            records.entry(id).or_default().clone()
        };
        let guard = mutex.lock_owned().await;
        RecordGuard {
            locks: self,
            id,
            guard: Some(guard),
            _gate: gate,
        }
    }

    /// Number of videos with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        let mut records = self.locks.records.lock().unwrap_or_else(|e| e.into_inner());
        // The map and our guard each hold one reference; more means someone is waiting.
        if let Some(mutex) = records.get(&self.id) {
            if Arc::strong_count(mutex) <= 2 {
                records.remove(&self.id);
            }
        }
        self.guard.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_video_is_serialized() {
        let locks = Arc::new(RecordLocks::new());
        let guard = locks.lock(VideoId(1)).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(VideoId(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_other_videos_do_not_wait() {
        let locks = RecordLocks::new();
        let _one = locks.lock(VideoId(1)).await;
        let two = tokio::time::timeout(Duration::from_secs(1), locks.lock(VideoId(2))).await;
        assert!(two.is_ok());
    }

    #[tokio::test]
    async fn test_exclusive_waits_for_record_guards() {
        let locks = Arc::new(RecordLocks::new());
        let guard = locks.lock(VideoId(1)).await;

        let bulk = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _all = locks.exclusive().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!bulk.is_finished());

        drop(guard);
        bulk.await.unwrap();
    }
}
