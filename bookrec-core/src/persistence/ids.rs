use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::atomic::write_atomic;
use crate::error::{RecError, RecResult};
use crate::vector::EntityId;

/// Entity identifiers in index insertion order: `ids[i]` names the vector at position `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierArray {
    ids: Vec<EntityId>,
}

impl IdentifierArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        self.ids.get(position).map(String::as_str)
    }

    pub fn as_slice(&self) -> &[EntityId] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityId> {
        self.ids.iter()
    }

    pub fn extend<I: IntoIterator<Item = EntityId>>(&mut self, ids: I) {
        self.ids.extend(ids);
    }

    pub fn into_vec(self) -> Vec<EntityId> {
        self.ids
    }

    /// Writes the array as a JSON list, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> RecResult<()> {
        let bytes = serde_json::to_vec(&self.ids)
            .map_err(|e| RecError::Serialization(format!("Failed to serialize identifier array: {}", e)))?;
        write_atomic(path, &bytes)?;
        debug!(path = ?path, count = self.ids.len(), "Saved identifier array");
        Ok(())
    }

    pub fn load(path: &Path) -> RecResult<Self> {
        let bytes = fs::read(path).map_err(|e| RecError::io(path, e))?;
        let ids: Vec<EntityId> = serde_json::from_slice(&bytes).map_err(|e| RecError::CorruptFile {
            path: path.to_path_buf(),
            reason: format!("identifier array is not a JSON list of strings: {}", e),
        })?;
        Ok(IdentifierArray { ids })
    }
}

impl From<Vec<EntityId>> for IdentifierArray {
    fn from(ids: Vec<EntityId>) -> Self {
        IdentifierArray { ids }
    }
}
