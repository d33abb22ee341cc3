//! Ordered, paginated access to catalog entities.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{RecError, RecResult};
use crate::vector::EntityId;

/// A catalog item as seen by the index builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    #[serde(default)]
    pub description: String,
    /// Vector persisted with the catalog record, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, description: impl Into<String>) -> Self {
        Entity { id: id.into(), description: description.into(), embedding: None }
    }
}

/// Source of entities in a stable enumeration order.
#[async_trait]
pub trait EntitySource: Send + Sync + std::fmt::Debug {
    /// Returns up to `limit` entities starting at `offset`. A page shorter than
    /// `limit` or empty means the enumeration is exhausted.
    async fn page(&self, offset: usize, limit: usize) -> RecResult<Vec<Entity>>;
}

/// Vector-backed source, used in tests and by in-process callers.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    entities: Vec<Entity>,
}

impl MemorySource {
    pub fn new(entities: Vec<Entity>) -> Self {
        MemorySource { entities }
    }
}

#[async_trait]
impl EntitySource for MemorySource {
    async fn page(&self, offset: usize, limit: usize) -> RecResult<Vec<Entity>> {
        Ok(self.entities.iter().skip(offset).take(limit).cloned().collect())
    }
}

struct JsonlCursor {
    lines: Lines<BufReader<File>>,
    /// Entities already returned through this reader.
    consumed: usize,
    /// Physical line number of the last line read, for error messages.
    line_no: usize,
}

/// Reads entities from a file with one JSON object per line. Blank lines are skipped.
///
/// Sequential pages reuse an open reader; any other offset reopens the file.
pub struct JsonlSource {
    path: PathBuf,
    cursor: Mutex<Option<JsonlCursor>>,
}

impl std::fmt::Debug for JsonlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlSource").field("path", &self.path).finish()
    }
}

impl JsonlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonlSource { path: path.into(), cursor: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> RecResult<JsonlCursor> {
        let file = File::open(&self.path).await.map_err(|e| RecError::io(&self.path, e))?;
        Ok(JsonlCursor { lines: BufReader::new(file).lines(), consumed: 0, line_no: 0 })
    }

    async fn next_entity(&self, cursor: &mut JsonlCursor) -> RecResult<Option<Entity>> {
        loop {
            let line = cursor.lines.next_line().await.map_err(|e| RecError::io(&self.path, e))?;
            let Some(line) = line else {
                return Ok(None);
            };
            cursor.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let entity: Entity = serde_json::from_str(&line).map_err(|e| {
                RecError::Source(format!("{}:{}: invalid entity record: {}", self.path.display(), cursor.line_no, e))
            })?;
            cursor.consumed += 1;
            return Ok(Some(entity));
        }
    }
}

#[async_trait]
impl EntitySource for JsonlSource {
    async fn page(&self, offset: usize, limit: usize) -> RecResult<Vec<Entity>> {
        let mut guard = self.cursor.lock().await;
        let reusable = matches!(guard.as_ref(), Some(c) if c.consumed <= offset);
        let mut cursor = match guard.take() {
            Some(c) if reusable => c,
            _ => {
                debug!(path = ?self.path, offset, "Opening entity source");
                self.open().await?
            }
        };

        while cursor.consumed < offset {
            if self.next_entity(&mut cursor).await?.is_none() {
                *guard = Some(cursor);
                return Ok(Vec::new());
            }
        }

        let mut page = Vec::with_capacity(limit.min(4096));
        while page.len() < limit {
            match self.next_entity(&mut cursor).await? {
                Some(entity) => page.push(entity),
                None => break,
            }
        }
        *guard = Some(cursor);
        Ok(page)
    }
}
