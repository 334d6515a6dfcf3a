//! Filesystem helpers for moving and measuring blobs.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{StorageError, StorageResult};

/// Move a file from `src` to `dst`, falling back to copy+delete across devices.
///
/// The copy lands in a sibling temp file first, then is renamed into place,
/// so `dst` never appears half written.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> StorageResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(StorageError::not_found(src.display().to_string()))
        }
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename, falling back to copy+delete: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(StorageError::from(e)),
    }
}

/// EXDEV is 18 on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> StorageResult<()> {
    let tmp_dst = dst.with_extension("moving");

    if let Err(e) = fs::copy(src, &tmp_dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(StorageError::write_failed(format!(
            "copy {} -> {}: {}",
            src.display(),
            tmp_dst.display(),
            e
        )));
    }

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(StorageError::from(e));
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(
            "Moved {} but failed to remove source: {}",
            src.display(),
            e
        );
    }

    Ok(())
}

/// Total size in bytes of regular files under `root`. Missing roots count as zero.
pub async fn tree_size(root: &Path) -> StorageResult<u64> {
    let mut total = 0;
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let meta = fs::symlink_metadata(entry.path()).await?;
            if meta.is_dir() {
                pending.push(entry.path());
            } else if meta.is_file() {
                total += meta.len();
            }
        }
    }

    Ok(total)
}
