//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    boost_audio, cleanup, download_video, encode_video, get_video, health, lower_resolution,
    process_video, ready, run_pipeline, upload_video,
};
use crate::metrics::metrics_middleware;
use crate::middleware::request_logging;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let video_routes = Router::new()
        .route("/upload", post(upload_video))
        .route("/videos/:video_id", get(get_video))
        // Single stages, each reading the original upload
        .route("/process/:video_id", post(process_video))
        .route("/lower_resolution/:video_id", post(lower_resolution))
        .route("/boost_audio/:video_id", post(boost_audio))
        .route("/encode/:video_id", post(encode_video))
        .route("/pipeline/:video_id", post(run_pipeline))
        .route("/download/:video_id", get(download_video));

    let admin_routes = Router::new().route("/admin/cleanup", post(cleanup));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let max_body = state.config.max_upload_bytes;

    Router::new()
        .merge(video_routes)
        .merge(admin_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Multipart reads go through DefaultBodyLimit, so both limits are raised together
        .layer(DefaultBodyLimit::max(max_body))
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
