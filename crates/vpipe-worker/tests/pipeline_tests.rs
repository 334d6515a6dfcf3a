//! End-to-end tests for the video service over a temp store and a fake transcoder.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

use vpipe_media::{MediaError, MediaResult, Transform, TransformKind, Transformer};
use vpipe_models::{PipelineConfig, VideoId};
use vpipe_records::{MemoryVideoRepository, VideoRepository};
use vpipe_storage::{
    keys, BlobStore, LocalBlobStore, OpenedBlob, StorageError, StorageResult,
};
use vpipe_worker::{ReclaimOutcome, ReclaimScope, VideoService, WorkerError};

/// Writes `{stage}<-{input bytes}` to the output and can fail at one stage.
#[derive(Default)]
struct FakeTransformer {
    fail_at: Option<TransformKind>,
    calls: Mutex<Vec<(TransformKind, PathBuf, PathBuf)>>,
}

impl FakeTransformer {
    fn failing_at(stage: TransformKind) -> Self {
        Self {
            fail_at: Some(stage),
            ..Default::default()
        }
    }

    fn stages(&self) -> Vec<TransformKind> {
        self.calls.lock().unwrap().iter().map(|(k, _, _)| *k).collect()
    }
}

#[async_trait]
impl Transformer for FakeTransformer {
    async fn invoke(&self, transform: &Transform, input: &Path, output: &Path) -> MediaResult<()> {
        let kind = transform.kind();
        self.calls
            .lock()
            .unwrap()
            .push((kind, input.to_path_buf(), output.to_path_buf()));

        if self.fail_at == Some(kind) {
            return Err(MediaError::transform_failed(kind, Some(1), Some("boom".into())));
        }
        let source = tokio::fs::read(input).await?;
        let mut body = format!("{}<-", kind).into_bytes();
        body.extend(source);
        tokio::fs::create_dir_all(output.parent().unwrap()).await?;
        tokio::fs::write(output, body).await?;
        Ok(())
    }
}

/// Local store whose writes always fail.
struct ReadOnlyBlobStore(LocalBlobStore);

#[async_trait]
impl BlobStore for ReadOnlyBlobStore {
    async fn save(&self, key: &str, _data: &[u8]) -> StorageResult<u64> {
        Err(StorageError::write_failed(format!("{key}: read-only store")))
    }

    async fn open(&self, key: &str) -> StorageResult<OpenedBlob> {
        self.0.open(key).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.0.exists(key).await
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        self.0.rename(from, to).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.0.delete(key).await
    }

    async fn delete_tree(&self, prefix: &str) -> StorageResult<u64> {
        self.0.delete_tree(prefix).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.0.list(prefix).await
    }

    fn path(&self, key: &str) -> StorageResult<PathBuf> {
        self.0.path(key)
    }
}

struct Harness {
    _temp: TempDir,
    service: VideoService,
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn VideoRepository>,
    transformer: Arc<FakeTransformer>,
}

async fn harness(transformer: FakeTransformer) -> Harness {
    let temp = TempDir::new().unwrap();
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(temp.path()).await.unwrap());
    let records: Arc<dyn VideoRepository> = Arc::new(MemoryVideoRepository::new());
    let transformer = Arc::new(transformer);
    let service = VideoService::new(blobs.clone(), records.clone(), transformer.clone(), true);
    Harness {
        _temp: temp,
        service,
        blobs,
        records,
        transformer,
    }
}

fn clip_config() -> PipelineConfig {
    PipelineConfig {
        resolution: "-2:240".to_string(),
        codec: "libx264".to_string(),
        volume_gain: 5.0,
        bitrate_kbps: 500,
        crf: 30,
        strip_metadata: true,
    }
}

#[tokio::test]
async fn test_full_pipeline_writes_four_artifacts() {
    let h = harness(FakeTransformer::default()).await;
    let record = h.service.register_upload("clip.mp4", b"raw").await.unwrap();

    let outcome = h.service.run_pipeline(record.id, clip_config()).await.unwrap();

    assert_eq!(outcome.artifacts.len(), 4);
    assert!(outcome.processed_filename.starts_with("final_processed_clip_"));
    assert!(outcome.processed_filename.ends_with(".mp4"));
    assert_eq!(
        h.transformer.stages(),
        TransformKind::PIPELINE_ORDER.to_vec()
    );

    let on_disk = h.blobs.list(&keys::processed_prefix(record.id)).await.unwrap();
    assert_eq!(on_disk.len(), 4);
    for name in &outcome.artifacts {
        assert!(on_disk.contains(&keys::processed_key(record.id, name)));
    }

    let stored = h.service.get_video(record.id).await.unwrap();
    assert_eq!(stored.processed_filename, Some(outcome.processed_filename.clone()));

    // Each stage read the previous stage's output.
    let path = h.service.get_download_path(record.id).await.unwrap();
    let body = tokio::fs::read_to_string(path).await.unwrap();
    assert_eq!(body, "bitrate_encode<-gain<-recode<-scale<-raw");
}

#[tokio::test]
async fn test_failed_stage_stops_run_and_leaves_record() {
    let h = harness(FakeTransformer::failing_at(TransformKind::Gain)).await;
    let record = h.service.register_upload("clip.mp4", b"raw").await.unwrap();

    let err = h
        .service
        .run_pipeline(record.id, clip_config())
        .await
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some(TransformKind::Gain));
    assert_eq!(
        h.transformer.stages(),
        vec![TransformKind::Scale, TransformKind::Recode, TransformKind::Gain]
    );
    assert_eq!(h.service.get_video(record.id).await.unwrap().processed_filename, None);

    // Promoted artifacts from the stages that did succeed stay in place.
    let on_disk = h.blobs.list(&keys::processed_prefix(record.id)).await.unwrap();
    assert_eq!(on_disk.len(), 2);
}

#[tokio::test]
async fn test_failed_rerun_keeps_previous_result() {
    let h = harness(FakeTransformer::failing_at(TransformKind::BitrateEncode)).await;
    let record = h.service.register_upload("clip.mp4", b"raw").await.unwrap();

    let first = h
        .service
        .run_stage(record.id, TransformKind::Scale, clip_config())
        .await
        .unwrap();
    assert!(h.service.run_pipeline(record.id, clip_config()).await.is_err());

    let stored = h.service.get_video(record.id).await.unwrap();
    assert_eq!(stored.processed_filename, Some(first.processed_filename));
}

#[tokio::test]
async fn test_single_stage_reads_original_upload() {
    let h = harness(FakeTransformer::default()).await;
    let record = h.service.register_upload("talk.mov", b"raw").await.unwrap();

    let outcome = h
        .service
        .run_stage(record.id, TransformKind::Gain, PipelineConfig::default())
        .await
        .unwrap();

    assert_eq!(outcome.artifacts.len(), 1);
    assert!(outcome.processed_filename.starts_with("boosted_talk_"));
    assert!(outcome.processed_filename.ends_with(".mov"));
    let calls = h.transformer.calls.lock().unwrap().clone();
    assert_eq!(
        calls[0].1,
        h.blobs.path(&keys::upload_key(record.id, "talk.mov")).unwrap()
    );
}

#[tokio::test]
async fn test_invalid_config_runs_nothing() {
    let h = harness(FakeTransformer::default()).await;
    let record = h.service.register_upload("clip.mp4", b"raw").await.unwrap();
    let config = PipelineConfig {
        crf: 99,
        ..PipelineConfig::default()
    };

    let err = h.service.run_pipeline(record.id, config).await.unwrap_err();
    assert!(matches!(err, WorkerError::Validation(_)));
    assert!(h.transformer.stages().is_empty());
}

#[tokio::test]
async fn test_unknown_video() {
    let h = harness(FakeTransformer::default()).await;
    let err = h
        .service
        .run_pipeline(VideoId(404), PipelineConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::NotFound(VideoId(404))));
}

#[tokio::test]
async fn test_upload_rejects_empty_payload_and_name() {
    let h = harness(FakeTransformer::default()).await;
    assert!(matches!(
        h.service.register_upload("clip.mp4", b"").await,
        Err(WorkerError::Validation(_))
    ));
    assert!(matches!(
        h.service.register_upload("", b"raw").await,
        Err(WorkerError::Validation(_))
    ));
    assert!(h.records.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_upload_write_rolls_back_record() {
    let temp = TempDir::new().unwrap();
    let blobs = Arc::new(ReadOnlyBlobStore(
        LocalBlobStore::new(temp.path()).await.unwrap(),
    ));
    let records: Arc<dyn VideoRepository> = Arc::new(MemoryVideoRepository::new());
    let service = VideoService::new(
        blobs,
        records.clone(),
        Arc::new(FakeTransformer::default()),
        true,
    );

    let err = service.register_upload("clip.mp4", b"raw").await.unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Storage(StorageError::WriteFailed(_))
    ));
    assert!(records.list().await.unwrap().is_empty());

    // The rolled back id is not handed out again.
    let next = records.create("other.mp4").await.unwrap();
    assert_eq!(next.id, VideoId(2));
}

#[tokio::test]
async fn test_upload_name_is_sanitized() {
    let h = harness(FakeTransformer::default()).await;
    let record = h
        .service
        .register_upload("../../my holiday.mp4", b"raw")
        .await
        .unwrap();
    assert_eq!(record.original_filename, "my_holiday.mp4");
    assert!(h
        .blobs
        .exists(&keys::upload_key(record.id, "my_holiday.mp4"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_download_without_processed_artifact() {
    let h = harness(FakeTransformer::default()).await;
    let record = h.service.register_upload("clip.mp4", b"raw").await.unwrap();

    let err = h.service.open_download(record.id).await.unwrap_err();
    assert!(matches!(err, WorkerError::NoProcessedArtifact(_)));
    assert!(matches!(
        h.service.open_download(VideoId(99)).await.unwrap_err(),
        WorkerError::NotFound(_)
    ));

    // Nothing was touched.
    assert_eq!(h.service.get_video(record.id).await.unwrap(), record);
    assert!(h
        .blobs
        .exists(&keys::upload_key(record.id, "clip.mp4"))
        .await
        .unwrap());
    assert_eq!(h.service.retention().in_flight(record.id), 0);
}

#[tokio::test]
async fn test_completed_download_reclaims_only_its_lineage() {
    let h = harness(FakeTransformer::default()).await;
    let kept = h.service.register_upload("keep.mp4", b"keep").await.unwrap();
    let gone = h.service.register_upload("gone.mp4", b"gone").await.unwrap();
    h.service.run_pipeline(kept.id, clip_config()).await.unwrap();
    h.service.run_pipeline(gone.id, clip_config()).await.unwrap();

    let mut download = h.service.open_download(gone.id).await.unwrap();
    let mut body = Vec::new();
    download.reader.read_to_end(&mut body).await.unwrap();
    assert_eq!(body.len() as u64, download.size);

    let outcome = download.lease.complete().await.unwrap();
    assert!(matches!(
        outcome,
        Some(ReclaimOutcome::Reclaimed {
            records_removed: 1,
            ..
        })
    ));

    assert!(matches!(
        h.service.get_video(gone.id).await.unwrap_err(),
        WorkerError::NotFound(_)
    ));
    assert!(h.blobs.list(&keys::processed_prefix(gone.id)).await.unwrap().is_empty());
    assert!(h.blobs.list(&keys::upload_prefix(gone.id)).await.unwrap().is_empty());

    assert!(h.service.get_download_path(kept.id).await.is_ok());
    assert_eq!(h.blobs.list(&keys::processed_prefix(kept.id)).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_aborted_download_keeps_files() {
    let h = harness(FakeTransformer::default()).await;
    let record = h.service.register_upload("clip.mp4", b"raw").await.unwrap();
    h.service.run_pipeline(record.id, clip_config()).await.unwrap();

    let download = h.service.open_download(record.id).await.unwrap();
    drop(download);

    assert!(h.service.get_download_path(record.id).await.is_ok());
    assert_eq!(h.service.retention().in_flight(record.id), 0);
}

#[tokio::test]
async fn test_bulk_cleanup() {
    let h = harness(FakeTransformer::default()).await;
    let a = h.service.register_upload("a.mp4", b"aa").await.unwrap();
    h.service.register_upload("b.mp4", b"bb").await.unwrap();
    h.service.run_stage(a.id, TransformKind::Recode, clip_config()).await.unwrap();

    let outcome = h.service.reclaim(ReclaimScope::EntireStore).await.unwrap();
    assert!(matches!(
        outcome,
        ReclaimOutcome::Reclaimed {
            records_removed: 2,
            ..
        }
    ));
    assert!(h.records.list().await.unwrap().is_empty());

    // Ids keep counting after a cleanup.
    let next = h.service.register_upload("c.mp4", b"cc").await.unwrap();
    assert_eq!(next.id, VideoId(3));
}
