//! Application state shared across handlers.

use std::sync::Arc;

use ingest::IngestPipeline;
use telemetry::health;
use tracing::warn;
use worker::RetentionScheduler;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    /// Built once in `main`; also handed to the shutdown hook
    pub scheduler: Arc<RetentionScheduler>,
}

impl AppState {
    pub fn new(pipeline: Arc<IngestPipeline>, scheduler: Arc<RetentionScheduler>) -> Self {
        Self {
            pipeline,
            scheduler,
        }
    }

    /// Pings the store and records the result in the health registry.
    pub async fn probe_storage(&self) -> bool {
        match self.pipeline.stores().events.ping().await {
            Ok(()) => {
                health().storage.set_healthy();
                true
            }
            Err(e) => {
                warn!(error = %e, "Storage health probe failed");
                health().storage.set_unhealthy(e.to_string());
                false
            }
        }
    }
}
