//! Blob store abstraction.

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::StorageResult;

/// Reader over a stored blob.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// An opened blob and its size at open time.
pub struct OpenedBlob {
    pub reader: BlobReader,
    pub size: u64,
}

impl std::fmt::Debug for OpenedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedBlob").field("size", &self.size).finish()
    }
}

/// Keyed file storage.
///
/// Keys are `/`-separated relative paths. The transcoder works on real
/// files, so every store must be able to hand out a local path for a key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` under `key`, replacing anything already there.
    async fn save(&self, key: &str, data: &[u8]) -> StorageResult<u64>;

    /// Open a stored blob for streaming.
    async fn open(&self, key: &str) -> StorageResult<OpenedBlob>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Move a blob to a new key.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Delete one blob. Returns false if it was already gone.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Delete everything under `prefix`. Returns the number of bytes freed.
    async fn delete_tree(&self, prefix: &str) -> StorageResult<u64>;

    /// Keys of the blobs directly under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Local filesystem path for `key`. The file need not exist.
    fn path(&self, key: &str) -> StorageResult<PathBuf>;
}
