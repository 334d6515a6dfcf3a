//! Video service: the one handle the HTTP layer talks to.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use vpipe_media::{FfmpegTransformer, TransformKind, Transformer};
use vpipe_models::{sanitize_filename, PipelineConfig, VideoId, VideoRecord};
use vpipe_records::{JsonFileVideoRepository, MemoryVideoRepository, VideoRepository};
use vpipe_storage::{keys, BlobReader, BlobStore, LocalBlobStore};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::locks::RecordLocks;
use crate::processor::{PipelineOrchestrator, RunOutcome, RunPlan};
use crate::retention::{DownloadLease, ReclaimOutcome, ReclaimScope, RetentionManager};

/// Key written and removed by the readiness probe.
const PROBE_KEY: &str = ".probe/ready";

/// An opened processed artifact, ready to stream.
pub struct Download {
    /// Artifact name, for the attachment header
    pub filename: String,
    pub size: u64,
    pub reader: BlobReader,
    /// Complete after the last byte is sent
    pub lease: DownloadLease,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("lease", &self.lease)
            .finish()
    }
}

/// Store handles, orchestrator and retention, shared by every request.
pub struct VideoService {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn VideoRepository>,
    orchestrator: PipelineOrchestrator,
    retention: Arc<RetentionManager>,
    locks: Arc<RecordLocks>,
}

impl VideoService {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn VideoRepository>,
        transformer: Arc<dyn Transformer>,
        reclaim_after_download: bool,
    ) -> Self {
        let locks = Arc::new(RecordLocks::new());
        let orchestrator =
            PipelineOrchestrator::new(transformer, Arc::clone(&blobs), Arc::clone(&records));
        let retention = Arc::new(RetentionManager::new(
            Arc::clone(&blobs),
            Arc::clone(&records),
            Arc::clone(&locks),
            reclaim_after_download,
        ));
        Self {
            blobs,
            records,
            orchestrator,
            retention,
            locks,
        }
    }

    /// Build the production service: local blobs, configured records, FFmpeg.
    pub async fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        let blobs = Arc::new(LocalBlobStore::new(config.storage_root.clone()).await?);
        let records: Arc<dyn VideoRepository> = match &config.records_path {
            Some(path) => Arc::new(JsonFileVideoRepository::open(path.clone()).await?),
            None => {
                warn!("RECORDS_PATH is empty, records will not survive a restart");
                Arc::new(MemoryVideoRepository::new())
            }
        };
        let transformer = FfmpegTransformer::new(&config.ffmpeg_path)?
            .with_timeout(config.ffmpeg_timeout.as_secs());
        info!(
            storage_root = %config.storage_root.display(),
            ffmpeg = %transformer.binary().display(),
            "Video service ready"
        );
        Ok(Self::new(
            blobs,
            records,
            Arc::new(transformer),
            config.reclaim_after_download,
        ))
    }

    /// Store an upload and create its record.
    ///
    /// The name is sanitized first. If the blob cannot be written the new
    /// record is removed again.
    pub async fn register_upload(&self, raw_filename: &str, data: &[u8]) -> WorkerResult<VideoRecord> {
        let filename = sanitize_filename(raw_filename)?;
        if data.is_empty() {
            return Err(WorkerError::validation("uploaded file is empty"));
        }

        let _gate = self.locks.shared().await;
        let record = self.records.create(&filename).await?;

        if let Err(e) = self
            .blobs
            .save(&keys::upload_key(record.id, &filename), data)
            .await
        {
            warn!(video_id = %record.id, error = %e, "Upload write failed, removing record");
            if let Err(rollback) = self.records.delete(record.id).await {
                warn!(video_id = %record.id, error = %rollback, "Record rollback failed");
            }
            return Err(e.into());
        }

        metrics::counter!("vpipe_uploads_total").increment(1);
        metrics::counter!("vpipe_upload_bytes_total").increment(data.len() as u64);
        info!(
            video_id = %record.id,
            filename = %filename,
            size_bytes = data.len(),
            "Upload registered"
        );
        Ok(record)
    }

    pub async fn get_video(&self, id: VideoId) -> WorkerResult<VideoRecord> {
        self.records.get(id).await?.ok_or(WorkerError::NotFound(id))
    }

    /// Run every stage, returning the final artifact.
    pub async fn run_pipeline(&self, id: VideoId, config: PipelineConfig) -> WorkerResult<RunOutcome> {
        self.run(id, RunPlan::full(), config).await
    }

    /// Run one stage over the original upload.
    pub async fn run_stage(
        &self,
        id: VideoId,
        kind: TransformKind,
        config: PipelineConfig,
    ) -> WorkerResult<RunOutcome> {
        self.run(id, RunPlan::single(kind), config).await
    }

    async fn run(&self, id: VideoId, plan: RunPlan, config: PipelineConfig) -> WorkerResult<RunOutcome> {
        let config = config.validated()?;
        let _guard = self.locks.lock(id).await;
        let record = self.get_video(id).await?;
        self.orchestrator.run(&record, &plan, &config).await
    }

    /// Local path of the latest processed artifact.
    pub async fn get_download_path(&self, id: VideoId) -> WorkerResult<PathBuf> {
        let (_, key) = self.processed_artifact(id).await?;
        Ok(self.blobs.path(&key)?)
    }

    /// Open the latest processed artifact and register an in-flight download.
    pub async fn open_download(&self, id: VideoId) -> WorkerResult<Download> {
        let _guard = self.locks.lock(id).await;
        let (filename, key) = self.processed_artifact(id).await?;
        let opened = self.blobs.open(&key).await.map_err(|e| match e {
            vpipe_storage::StorageError::NotFound(_) => WorkerError::NoProcessedArtifact(id),
            other => other.into(),
        })?;
        let lease = self.retention.begin_download(id);

        info!(video_id = %id, artifact = %filename, size_bytes = opened.size, "Download opened");
        Ok(Download {
            filename,
            size: opened.size,
            reader: opened.reader,
            lease,
        })
    }

    pub async fn reclaim(&self, scope: ReclaimScope) -> WorkerResult<ReclaimOutcome> {
        self.retention.reclaim(scope).await
    }

    /// Check the blob store accepts writes.
    pub async fn check_storage(&self) -> WorkerResult<()> {
        self.blobs.save(PROBE_KEY, b"ok").await?;
        self.blobs.delete(PROBE_KEY).await?;
        Ok(())
    }

    pub fn retention(&self) -> &RetentionManager {
        &self.retention
    }

    async fn processed_artifact(&self, id: VideoId) -> WorkerResult<(String, String)> {
        let record = self.get_video(id).await?;
        let filename = record
            .processed_filename
            .ok_or(WorkerError::NoProcessedArtifact(id))?;
        let key = keys::processed_key(id, &filename);
        if !self.blobs.exists(&key).await? {
            warn!(video_id = %id, artifact = %filename, "Record names a missing artifact");
            return Err(WorkerError::NoProcessedArtifact(id));
        }
        Ok((filename, key))
    }
}
