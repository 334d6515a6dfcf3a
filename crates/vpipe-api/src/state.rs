//! Application state.

use std::sync::Arc;

use vpipe_worker::{VideoService, WorkerConfig, WorkerResult};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub worker_config: WorkerConfig,
    pub service: Arc<VideoService>,
}

impl AppState {
    /// Create new application state with the production service.
    pub async fn new(config: ApiConfig, worker_config: WorkerConfig) -> WorkerResult<Self> {
        let service = VideoService::from_config(&worker_config).await?;
        Ok(Self::with_service(config, worker_config, Arc::new(service)))
    }

    /// Wrap an already built service.
    pub fn with_service(
        config: ApiConfig,
        worker_config: WorkerConfig,
        service: Arc<VideoService>,
    ) -> Self {
        Self {
            config,
            worker_config,
            service,
        }
    }
}
