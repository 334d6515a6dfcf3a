//! Administrative handlers.

use axum::extract::State;
use axum::Json;
use tracing::info;

use vpipe_worker::{ReclaimOutcome, ReclaimScope};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Delete every upload, artifact and record.
///
/// Answers 409 without deleting anything while downloads are streaming.
pub async fn cleanup(State(state): State<AppState>) -> ApiResult<Json<ReclaimOutcome>> {
    match state.service.reclaim(ReclaimScope::EntireStore).await? {
        ReclaimOutcome::Deferred { in_flight } => Err(ApiError::conflict(format!(
            "{} download(s) still in flight",
            in_flight
        ))),
        outcome => {
            info!(?outcome, "Bulk cleanup finished");
            Ok(Json(outcome))
        }
    }
}
