//! Blob store on the local filesystem.

use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::blob::{BlobStore, OpenedBlob};
use crate::error::{StorageError, StorageResult};
use crate::fs_utils::{move_file, tree_size};

/// Blob store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Open a store at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::config_error(format!(
                "Failed to create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    /// Map a key to a path under the root, rejecting anything that could escape it.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains('\\') || key.contains('\0') {
            return Err(StorageError::invalid_key(key));
        }
        let relative = Path::new(key);
        let all_normal = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        let bad_segment = key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
        if !all_normal || bad_segment {
            return Err(StorageError::invalid_key(key));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn save(&self, key: &str, data: &[u8]) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let start = Instant::now();
        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::write_failed(format!("create {}: {}", path.display(), e))
        })?;
        file.write_all(data).await.map_err(|e| {
            StorageError::write_failed(format!("write {}: {}", path.display(), e))
        })?;
        file.sync_all().await.map_err(|e| {
            StorageError::write_failed(format!("sync {}: {}", path.display(), e))
        })?;

        info!(
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Saved blob"
        );
        Ok(data.len() as u64)
    }

    async fn open(&self, key: &str) -> StorageResult<OpenedBlob> {
        let path = self.key_to_path(key)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(key));
            }
            Err(e) => {
                return Err(StorageError::ReadFailed(format!(
                    "open {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let size = file.metadata().await?.len();
        debug!(key = %key, size_bytes = size, "Opened blob");
        Ok(OpenedBlob {
            reader: Box::pin(file),
            size,
        })
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let src = self.key_to_path(from)?;
        let dst = self.key_to_path(to)?;
        move_file(&src, &dst).await?;
        debug!(from = %from, to = %to, "Renamed blob");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::delete_failed(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn delete_tree(&self, prefix: &str) -> StorageResult<u64> {
        let path = self.key_to_path(prefix)?;
        let freed = tree_size(&path).await?;
        match fs::remove_dir_all(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(StorageError::delete_failed(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        }
        info!(prefix = %prefix, freed_bytes = freed, "Deleted blob tree");
        Ok(freed)
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir = self.key_to_path(prefix)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(format!("{}/{}", prefix, name));
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn path(&self, key: &str) -> StorageResult<PathBuf> {
        self.key_to_path(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn store() -> (TempDir, LocalBlobStore) {
        let temp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp.path().join("blobs")).await.unwrap();
        (temp, store)
    }

    #[tokio::test]
    async fn test_save_and_open() {
        let (_temp, store) = store().await;
        store.save("uploads/1/clip.mp4", b"frames").await.unwrap();

        let mut opened = store.open("uploads/1/clip.mp4").await.unwrap();
        assert_eq!(opened.size, 6);
        let mut buf = Vec::new();
        opened.reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"frames");
    }

    #[tokio::test]
    async fn test_open_missing() {
        let (_temp, store) = store().await;
        let err = store.open("uploads/1/none.mp4").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (_temp, store) = store().await;
        for key in ["../etc/passwd", "/etc/passwd", "a//b", "a/./b", "", "a\\b", "a/"] {
            assert!(
                matches!(store.path(key), Err(StorageError::InvalidKey(_))),
                "{key} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let (_temp, store) = store().await;
        store.save("processed/1/temp_a.mp4", b"x").await.unwrap();
        store
            .rename("processed/1/temp_a.mp4", "processed/1/lowres_a.mp4")
            .await
            .unwrap();

        assert!(!store.exists("processed/1/temp_a.mp4").await.unwrap());
        assert!(store.delete("processed/1/lowres_a.mp4").await.unwrap());
        assert!(!store.delete("processed/1/lowres_a.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_tree_spares_siblings() {
        let (_temp, store) = store().await;
        store.save("processed/1/a.mp4", b"1234").await.unwrap();
        store.save("processed/1/b.mp4", b"12").await.unwrap();
        store.save("processed/2/a.mp4", b"keep").await.unwrap();

        assert_eq!(store.delete_tree("processed/1").await.unwrap(), 6);
        assert_eq!(store.delete_tree("processed/1").await.unwrap(), 0);
        assert_eq!(store.list("processed/2").await.unwrap(), vec!["processed/2/a.mp4"]);
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let (_temp, store) = store().await;
        store.save("processed/3/b.mp4", b"").await.unwrap();
        store.save("processed/3/a.mp4", b"").await.unwrap();
        assert_eq!(
            store.list("processed/3").await.unwrap(),
            vec!["processed/3/a.mp4", "processed/3/b.mp4"]
        );
    }
}
