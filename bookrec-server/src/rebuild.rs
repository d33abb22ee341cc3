//! Background index rebuild with build-then-swap.

use bookrec_core::{IndexBuilder, JsonlSource, RecResult, Recommender};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{ServerError, ServerResult};
use crate::state::{AppState, RebuildGuard, RebuildOutcome};

/// Starts a rebuild on a background task. The served recommender is replaced
/// only after the build completes and the new files load cleanly.
pub fn spawn_rebuild(state: &AppState) -> ServerResult<JoinHandle<()>> {
    let source_path = state
        .config
        .source_path
        .clone()
        .ok_or_else(|| ServerError::BadRequest("no entity source configured (set BOOKREC_SOURCE)".to_string()))?;
    let guard = state
        .try_begin_rebuild()
        .ok_or_else(|| ServerError::Conflict("an index rebuild is already running".to_string()))?;

    let state = state.clone();
    Ok(tokio::spawn(async move {
        let _guard: RebuildGuard = guard;
        info!(source = ?source_path, "Index rebuild started");

        let outcome = match run(&state, source_path).await {
            Ok((report, recommender)) => {
                state.swap(recommender).await;
                info!(total = report.total_entities, "Index rebuild finished; new index is live");
                RebuildOutcome { finished_at: Utc::now(), report: Some(report), error: None }
            }
            Err(e) => {
                error!(error = %e, "Index rebuild failed; previous index stays live");
                RebuildOutcome { finished_at: Utc::now(), report: None, error: Some(e.to_string()) }
            }
        };
        state.record_rebuild(outcome).await;
    }))
}

async fn run(state: &AppState, source_path: std::path::PathBuf) -> RecResult<(bookrec_core::BuildReport, Recommender)> {
    let paths = state.config.paths();
    let builder = IndexBuilder::new(
        state.embedder.clone(),
        Arc::new(JsonlSource::new(source_path)),
        state.config.index,
        state.config.build,
        paths.clone(),
    );
    let report = builder.build().await?;
    let recommender = Recommender::load(state.embedder.clone(), &paths)?;
    Ok((report, recommender))
}
