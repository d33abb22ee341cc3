use bookrec_core::{BuildReport, BuildState, Embedder, RecError, Recommender};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerResult;

/// Result of the most recent background rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildOutcome {
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<BuildReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Holds the shared state accessible by all request handlers.
///
/// The recommender is replaced wholesale after a successful rebuild; requests
/// already holding the previous `Arc<Recommender>` finish against it.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub embedder: Arc<dyn Embedder>,
    recommender: Arc<RwLock<Option<Arc<Recommender>>>>,
    rebuilding: Arc<AtomicBool>,
    last_rebuild: Arc<RwLock<Option<RebuildOutcome>>>,
}

impl AppState {
    pub fn new(config: ServerConfig, embedder: Arc<dyn Embedder>) -> Self {
        AppState {
            config: Arc::new(config),
            embedder,
            recommender: Arc::new(RwLock::new(None)),
            rebuilding: Arc::new(AtomicBool::new(false)),
            last_rebuild: Arc::new(RwLock::new(None)),
        }
    }

    /// Loads the index from the data directory if a completed build is there.
    /// Returns whether recommendations are being served.
    pub async fn load_on_startup(&self) -> bool {
        let paths = self.config.paths();
        match BuildState::detect(&paths) {
            Ok(BuildState::Complete) => {}
            Ok(BuildState::Fresh) => {
                warn!(data_path = ?self.config.data_path, "No index found; recommendations unavailable until a rebuild completes");
                return false;
            }
            Ok(BuildState::InProgress(checkpoint)) => {
                warn!(
                    batch_index = checkpoint.batch_index,
                    "Interrupted build found; trigger a rebuild to resume it before serving recommendations"
                );
                return false;
            }
            Err(e) => {
                error!(error = %e, "Could not determine build state");
                return false;
            }
        }

        match Recommender::load(self.embedder.clone(), &paths) {
            Ok(recommender) => {
                info!(count = recommender.len(), "Serving recommendations from persisted index");
                self.swap(recommender).await;
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to load persisted index");
                false
            }
        }
    }

    /// The recommender currently being served.
    pub async fn current(&self) -> ServerResult<Arc<Recommender>> {
        self.recommender
            .read()
            .await
            .clone()
            .ok_or_else(|| RecError::IndexUnavailable("no index has been built yet".to_string()).into())
    }

    pub async fn swap(&self, recommender: Recommender) {
        *self.recommender.write().await = Some(Arc::new(recommender));
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::SeqCst)
    }

    /// Claims the rebuild slot. Returns `None` if a rebuild is already running.
    pub(crate) fn try_begin_rebuild(&self) -> Option<RebuildGuard> {
        self.rebuilding
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RebuildGuard { flag: self.rebuilding.clone() })
    }

    pub async fn last_rebuild(&self) -> Option<RebuildOutcome> {
        self.last_rebuild.read().await.clone()
    }

    pub(crate) async fn record_rebuild(&self, outcome: RebuildOutcome) {
        *self.last_rebuild.write().await = Some(outcome);
    }
}

/// Releases the rebuild slot when dropped, including on panic.
pub(crate) struct RebuildGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RebuildGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
