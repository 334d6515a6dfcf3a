//! Upload, processing and download handlers.

use axum::body::{Body, Bytes};
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use vpipe_media::TransformKind;
use vpipe_models::{PipelineConfig, VideoId, VideoRecord};
use vpipe_worker::{Download, DownloadLease, RunOutcome};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying the upload.
const FILE_FIELD: &str = "file";

#[derive(Serialize)]
pub struct UploadResponse {
    pub video_id: VideoId,
    pub filename: String,
}

/// Accept a multipart upload and register it.
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(ApiError::validation("No selected file"));
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        let record = state.service.register_upload(&filename, &data).await?;
        return Ok(Json(UploadResponse {
            video_id: record.id,
            filename: record.original_filename,
        }));
    }

    Err(ApiError::validation("No file part"))
}

pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<VideoId>,
) -> ApiResult<Json<VideoRecord>> {
    Ok(Json(state.service.get_video(id).await?))
}

/// Parse an optional JSON config; an empty body means all defaults.
fn parse_config(body: &Bytes) -> ApiResult<PipelineConfig> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PipelineConfig::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::validation(format!("invalid config: {}", e)))
}

async fn run_stage(
    state: &AppState,
    id: VideoId,
    kind: TransformKind,
    body: &Bytes,
) -> ApiResult<Json<RunOutcome>> {
    let config = parse_config(body)?;
    Ok(Json(state.service.run_stage(id, kind, config).await?))
}

/// Re-encode with the requested codec.
pub async fn process_video(
    State(state): State<AppState>,
    Path(id): Path<VideoId>,
    body: Bytes,
) -> ApiResult<Json<RunOutcome>> {
    run_stage(&state, id, TransformKind::Recode, &body).await
}

pub async fn lower_resolution(
    State(state): State<AppState>,
    Path(id): Path<VideoId>,
    body: Bytes,
) -> ApiResult<Json<RunOutcome>> {
    run_stage(&state, id, TransformKind::Scale, &body).await
}

pub async fn boost_audio(
    State(state): State<AppState>,
    Path(id): Path<VideoId>,
    body: Bytes,
) -> ApiResult<Json<RunOutcome>> {
    run_stage(&state, id, TransformKind::Gain, &body).await
}

pub async fn encode_video(
    State(state): State<AppState>,
    Path(id): Path<VideoId>,
    body: Bytes,
) -> ApiResult<Json<RunOutcome>> {
    run_stage(&state, id, TransformKind::BitrateEncode, &body).await
}

/// Run every stage in order.
pub async fn run_pipeline(
    State(state): State<AppState>,
    Path(id): Path<VideoId>,
    body: Bytes,
) -> ApiResult<Json<RunOutcome>> {
    let config = parse_config(&body)?;
    Ok(Json(state.service.run_pipeline(id, config).await?))
}

/// Stream the latest processed artifact as an attachment.
///
/// With a known length the transport stops polling once `size` bytes are out
/// and drops the body without reading its end. The lease is therefore
/// completed by whichever comes first: end of stream, or the body being
/// dropped after the last byte was handed over. A client that disconnects
/// early drops the body short of `size`, which reclaims nothing.
pub async fn download_video(
    State(state): State<AppState>,
    Path(id): Path<VideoId>,
) -> ApiResult<Response> {
    let download = state.service.open_download(id).await?;
    let Download {
        filename,
        size,
        reader,
        lease,
    } = download;

    let transfer = Transfer {
        id,
        size,
        sent: 0,
        lease: Some(lease),
    };
    let body = futures_util::stream::unfold(
        (ReaderStream::new(reader), transfer),
        |(mut chunks, mut transfer)| async move {
            match chunks.next().await {
                Some(Ok(chunk)) => {
                    transfer.sent += chunk.len() as u64;
                    Some((Ok(chunk), (chunks, transfer)))
                }
                Some(Err(e)) => {
                    warn!(video_id = %transfer.id, error = %e, "Download read failed");
                    metrics::record_download("failed", transfer.sent);
                    // Dropping the lease here counts the transfer as aborted.
                    transfer.lease = None;
                    Some((Err(e), (chunks, transfer)))
                }
                None => {
                    if let Some(lease) = transfer.lease.take() {
                        complete_download(transfer.id, transfer.sent, lease).await;
                    }
                    None
                }
            }
        },
    );

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (header::CONTENT_LENGTH, size.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
    ];
    Ok((headers, Body::from_stream(body)).into_response())
}

/// Progress of one download body.
struct Transfer {
    id: VideoId,
    size: u64,
    sent: u64,
    lease: Option<DownloadLease>,
}

impl Drop for Transfer {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        if self.sent < self.size {
            metrics::record_download("aborted", self.sent);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(complete_download(self.id, self.sent, lease));
            }
            Err(_) => warn!(video_id = %self.id, "No runtime to complete download on"),
        }
    }
}

async fn complete_download(id: VideoId, sent: u64, lease: DownloadLease) {
    metrics::record_download("completed", sent);
    match lease.complete().await {
        Ok(outcome) => info!(video_id = %id, sent, ?outcome, "Download completed"),
        Err(e) => warn!(video_id = %id, error = %e, "Post-download reclaim failed"),
    }
}
