//! Build checkpoint: the durable record of how many batches are committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::atomic::{remove_if_exists, write_atomic};
use crate::config::{IndexConfig, IndexPaths};
use crate::error::{RecError, RecResult};
use crate::vector::EntityId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Number of fully committed batches. Batch `n` (0-based) is skipped on
    /// resume iff `n < batch_index`.
    pub batch_index: usize,
    /// Every identifier committed so far, in index order.
    pub book_ids: Vec<EntityId>,
    pub model_id: String,
    pub dimensions: Option<usize>,
    pub batch_size: usize,
    pub index_config: IndexConfig,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Checks that the identifier count is consistent with `batch_index` full
    /// batches, the last of which may be short.
    pub fn validate(&self) -> RecResult<()> {
        if self.batch_size == 0 {
            return Err(RecError::InconsistentState("checkpoint has batch_size 0".to_string()));
        }
        let max = self.batch_index.saturating_mul(self.batch_size);
        let min = self.batch_index.saturating_sub(1).saturating_mul(self.batch_size);
        let count = self.book_ids.len();
        let in_range = if self.batch_index == 0 { count == 0 } else { count > min && count <= max };
        if !in_range {
            return Err(RecError::InconsistentState(format!(
                "checkpoint lists {} ids for {} batches of {}",
                count, self.batch_index, self.batch_size
            )));
        }
        Ok(())
    }

    /// Refuses to resume under settings that would change batch boundaries or vectors.
    pub fn ensure_resumable(&self, model_id: &str, batch_size: usize, index_config: &IndexConfig) -> RecResult<()> {
        if self.model_id != model_id {
            return Err(RecError::ModelMismatch { expected: self.model_id.clone(), actual: model_id.to_string() });
        }
        if self.batch_size != batch_size {
            return Err(RecError::InconsistentState(format!(
                "checkpoint was written with batch_size {}, current batch_size is {}; delete the checkpoint to rebuild",
                self.batch_size, batch_size
            )));
        }
        if &self.index_config != index_config {
            return Err(RecError::InconsistentState(
                "checkpoint was written with a different index configuration; delete the checkpoint to rebuild".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads and writes the checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no checkpoint exists. An unreadable checkpoint is an
    /// error rather than a fresh start.
    pub fn load(&self) -> RecResult<Option<Checkpoint>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RecError::io(&self.path, e)),
        };
        let checkpoint: Checkpoint = serde_json::from_slice(&bytes).map_err(|e| RecError::CorruptFile {
            path: self.path.clone(),
            reason: format!("unreadable checkpoint: {}", e),
        })?;
        checkpoint.validate()?;
        debug!(path = ?self.path, batch_index = checkpoint.batch_index, ids = checkpoint.book_ids.len(), "Loaded checkpoint");
        Ok(Some(checkpoint))
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> RecResult<()> {
        let bytes = serde_json::to_vec(checkpoint)
            .map_err(|e| RecError::Serialization(format!("Failed to serialize checkpoint: {}", e)))?;
        write_atomic(&self.path, &bytes)
    }

    pub fn clear(&self) -> RecResult<()> {
        remove_if_exists(&self.path)?;
        info!(path = ?self.path, "Checkpoint removed");
        Ok(())
    }
}

/// Where a build stands, derived from the files on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildState {
    /// Nothing usable on disk; start from batch 0.
    Fresh,
    /// A run was interrupted after committing `Checkpoint::batch_index` batches.
    InProgress(Checkpoint),
    /// A previous run finished: index and ids exist and no checkpoint remains.
    Complete,
}

impl BuildState {
    pub fn detect(paths: &IndexPaths) -> RecResult<Self> {
        if let Some(checkpoint) = CheckpointStore::new(&paths.checkpoint_file).load()? {
            return Ok(BuildState::InProgress(checkpoint));
        }
        if paths.index_file.exists() && paths.ids_file.exists() {
            Ok(BuildState::Complete)
        } else {
            Ok(BuildState::Fresh)
        }
    }
}
