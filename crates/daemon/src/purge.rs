//! Daily garbage collection of finished analysis jobs.

use std::sync::Arc;
use std::time::Duration;

use deckd_registry::JobRegistry;
use tokio_util::sync::CancellationToken;

/// How often the purge runs.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Background task deleting terminal jobs past the retention window.
pub struct JobPurger {
    registry: Arc<JobRegistry>,
    retention: chrono::Duration,
}

impl JobPurger {
    pub fn new(registry: Arc<JobRegistry>, retention: chrono::Duration) -> Self {
        Self { registry, retention }
    }

    /// Run until `cancel` fires. The first purge happens immediately.
    pub async fn run(&self, cancel: CancellationToken, every: Duration) {
        let mut interval = tokio::time::interval(every);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job purger cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.registry.purge(self.retention).await {
                        tracing::error!(error = %e, "Failed to purge finished jobs");
                    }
                }
            }
        }
    }
}
