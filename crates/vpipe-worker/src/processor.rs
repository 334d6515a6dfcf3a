//! Pipeline orchestrator.
//!
//! A run is a fixed list of stages. Each stage reads the previous stage's
//! output (the original upload for the first one), writes to a temp
//! artifact, and on success promotes it to its tagged name. Nothing is
//! deleted here: intermediates stay on disk until the video's lineage is
//! reclaimed. The record is only pointed at the result after the last stage.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::Instrument;

use vpipe_media::{Transform, TransformKind, Transformer};
use vpipe_models::{ArtifactStage, PipelineConfig, VideoRecord};
use vpipe_records::VideoRepository;
use vpipe_storage::{artifact_name, keys, BlobStore};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::RunLogger;

/// Ordered stages for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    stages: Vec<TransformKind>,
}

impl RunPlan {
    /// Every stage, in pipeline order.
    pub fn full() -> Self {
        Self {
            stages: TransformKind::PIPELINE_ORDER.to_vec(),
        }
    }

    /// Exactly one stage, reading the original upload.
    pub fn single(kind: TransformKind) -> Self {
        Self { stages: vec![kind] }
    }

    pub fn stages(&self) -> &[TransformKind] {
        &self.stages
    }

    /// Tag for the artifact stage `index` promotes to.
    ///
    /// The last stage of a multi-stage run is tagged `final_processed`
    /// rather than with its own tag.
    pub fn tag_for(&self, index: usize) -> ArtifactStage {
        let is_last = index + 1 == self.stages.len();
        if is_last && self.stages.len() > 1 {
            ArtifactStage::FinalProcessed
        } else {
            self.stages[index].artifact_stage()
        }
    }

    fn operation(&self) -> &'static str {
        match self.stages.as_slice() {
            [single] => single.as_str(),
            _ => "pipeline",
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Name now stored as the record's `processed_filename`
    pub processed_filename: String,
    /// Every artifact the run produced, in stage order
    pub artifacts: Vec<String>,
}

/// Sequences transforms over a video's artifacts.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    transformer: Arc<dyn Transformer>,
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn VideoRepository>,
}

impl PipelineOrchestrator {
    pub fn new(
        transformer: Arc<dyn Transformer>,
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn VideoRepository>,
    ) -> Self {
        Self {
            transformer,
            blobs,
            records,
        }
    }

    /// Run `plan` over `record` with an already validated `config`.
    ///
    /// Callers must hold the record's lock.
    pub async fn run(
        &self,
        record: &VideoRecord,
        plan: &RunPlan,
        config: &PipelineConfig,
    ) -> WorkerResult<RunOutcome> {
        let logger = RunLogger::new(record.id, plan.operation());
        let span = logger.create_span();
        let started = Instant::now();

        let result = self.run_stages(record, plan, config, &logger).instrument(span).await;

        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!("vpipe_pipeline_runs_total", "operation" => plan.operation(), "outcome" => outcome)
            .increment(1);
        metrics::histogram!("vpipe_pipeline_duration_seconds", "operation" => plan.operation())
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(run) => logger.log_completion(&format!(
                "{} artifacts, processed_filename={} in {}ms",
                run.artifacts.len(),
                run.processed_filename,
                started.elapsed().as_millis()
            )),
            Err(e) => logger.log_error(&e.to_string()),
        }
        result
    }

    async fn run_stages(
        &self,
        record: &VideoRecord,
        plan: &RunPlan,
        config: &PipelineConfig,
        logger: &RunLogger,
    ) -> WorkerResult<RunOutcome> {
        logger.log_start(&format!(
            "{} stage(s) over {}",
            plan.stages().len(),
            record.original_filename
        ));

        let mut input = self
            .blobs
            .path(&keys::upload_key(record.id, &record.original_filename))?;
        let mut artifacts = Vec::with_capacity(plan.stages().len());

        for (index, kind) in plan.stages().iter().copied().enumerate() {
            let transform = Transform::from_config(kind, config);

            let temp_key = keys::processed_key(
                record.id,
                &artifact_name(&record.original_filename, ArtifactStage::Temp),
            );
            let name = artifact_name(&record.original_filename, plan.tag_for(index));
            let final_key = keys::processed_key(record.id, &name);
            let output = self.blobs.path(&temp_key)?;

            let stage_started = Instant::now();
            let invoked = self.transformer.invoke(&transform, &input, &output).await;
            let elapsed = stage_started.elapsed();

            metrics::histogram!("vpipe_stage_duration_seconds", "stage" => kind.as_str())
                .record(elapsed.as_secs_f64());

            if let Err(source) = invoked {
                metrics::counter!("vpipe_stage_runs_total", "stage" => kind.as_str(), "outcome" => "failure")
                    .increment(1);
                tracing::warn!(
                    video_id = %record.id,
                    stage = %kind,
                    artifact = %temp_key,
                    duration_ms = elapsed.as_millis() as u64,
                    "Stage failed"
                );
                if let Err(e) = self.blobs.delete(&temp_key).await {
                    logger.log_warning(&format!("could not remove partial output {}: {}", temp_key, e));
                }
                return Err(WorkerError::pipeline_failed(kind, source));
            }
            metrics::counter!("vpipe_stage_runs_total", "stage" => kind.as_str(), "outcome" => "success")
                .increment(1);

            self.blobs.rename(&temp_key, &final_key).await?;
            tracing::info!(
                video_id = %record.id,
                stage = %kind,
                artifact = %name,
                duration_ms = elapsed.as_millis() as u64,
                "Stage finished"
            );
            logger.log_progress(&format!("{}/{} {}", index + 1, plan.stages().len(), kind));

            input = self.blobs.path(&final_key)?;
            artifacts.push(name);
        }

        let processed_filename = artifacts
            .last()
            .cloned()
            .ok_or_else(|| WorkerError::validation("run plan has no stages"))?;

        self.records
            .set_processed(record.id, &processed_filename)
            .await?;
        tracing::info!(
            video_id = %record.id,
            artifact = %processed_filename,
            "Record updated"
        );

        Ok(RunOutcome {
            processed_filename,
            artifacts,
        })
    }
}
