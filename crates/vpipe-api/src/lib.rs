//! Axum HTTP API for the video pipeline.
//!
//! This crate provides:
//! - Upload, per-stage and full-pipeline processing endpoints
//! - Streaming downloads that reclaim storage once complete
//! - Health, readiness and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
