//! Pipeline orchestration and file lifecycle for uploaded videos.
//!
//! This crate provides:
//! - The pipeline orchestrator that sequences transcoder stages
//! - Lineage and whole-store retention with download leases
//! - Per-video locking under a store-wide gate
//! - `VideoService`, the context object the HTTP layer holds

pub mod config;
pub mod error;
pub mod locks;
pub mod logging;
pub mod processor;
pub mod retention;
pub mod service;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use locks::RecordLocks;
pub use logging::RunLogger;
pub use processor::{PipelineOrchestrator, RunOutcome, RunPlan};
pub use retention::{DownloadLease, ReclaimOutcome, ReclaimScope, RetentionManager};
pub use service::{Download, VideoService};
