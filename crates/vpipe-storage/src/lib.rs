//! Local blob storage for uploads and pipeline artifacts.
//!
//! This crate provides:
//! - The `BlobStore` seam and a filesystem-backed implementation
//! - The per-video key layout
//! - The artifact namer

pub mod blob;
pub mod error;
pub mod fs_utils;
pub mod keys;
pub mod local;
pub mod naming;

pub use blob::{BlobReader, BlobStore, OpenedBlob};
pub use error::{StorageError, StorageResult};
pub use fs_utils::move_file;
pub use local::LocalBlobStore;
pub use naming::{artifact_name, artifact_name_at};
