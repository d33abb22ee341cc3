//! Vector index backends behind one capability trait.

pub(crate) mod buffer;
pub mod flat;
pub mod format;
pub mod hnsw;

pub use flat::FlatIndex;
pub use format::{load_index, save_index, IndexFileHeader};
pub use hnsw::HnswIndex;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::config::{IndexBackend, IndexConfig};
use crate::distance::DistanceMetric;
use crate::error::{RecError, RecResult};
use crate::vector::Embedding;

/// A search hit: the insertion position of a stored vector and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

impl Eq for Neighbor {}

// Nearer is smaller; equal distances fall back to insertion position so that
// result order is total and reproducible.
impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Flat,
    Hnsw,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Flat => write!(f, "flat"),
            IndexKind::Hnsw => write!(f, "hnsw"),
        }
    }
}

/// An append-only collection of equal-width vectors searchable by distance.
///
/// Positions are assigned in insertion order starting at 0 and are the only
/// link between a stored vector and the identifier array.
pub trait VectorIndex: Send + Sync + fmt::Debug {
    /// Appends `vectors` in order. The first non-empty call fixes the
    /// dimension; a batch containing any mismatched vector is rejected whole.
    fn add(&mut self, vectors: &[Embedding]) -> RecResult<()>;

    /// Returns up to `k` nearest stored vectors, nearest first.
    fn search(&self, query: &Embedding, k: usize) -> RecResult<Vec<Neighbor>>;

    /// Drops every vector at position `len` or later.
    fn truncate(&mut self, len: usize) -> RecResult<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `None` until the first vector is added.
    fn dimensions(&self) -> Option<usize>;

    fn metric(&self) -> DistanceMetric;

    fn kind(&self) -> IndexKind;

    fn config(&self) -> IndexConfig;

    /// Copy of the vector stored at `position`.
    fn vector(&self, position: usize) -> Option<Embedding>;

    /// Borrowed backend state for serialization.
    fn state(&self) -> IndexStateRef<'_>;
}

/// Serialized form of a backend, written by [`save_index`].
#[derive(Debug, Serialize)]
pub enum IndexStateRef<'a> {
    Flat(&'a FlatIndex),
    Hnsw(&'a HnswIndex),
}

/// Owned counterpart of [`IndexStateRef`], read back by [`load_index`].
#[derive(Debug, Deserialize)]
pub enum IndexState {
    Flat(FlatIndex),
    Hnsw(HnswIndex),
}

impl IndexState {
    pub fn into_index(self) -> Box<dyn VectorIndex> {
        match self {
            IndexState::Flat(index) => Box::new(index),
            IndexState::Hnsw(index) => Box::new(index),
        }
    }
}

/// Creates an empty index for `config`.
pub fn build_index(config: &IndexConfig) -> RecResult<Box<dyn VectorIndex>> {
    config.validate()?;
    match config.backend {
        IndexBackend::Flat => Ok(Box::new(FlatIndex::new(config.metric))),
        IndexBackend::Hnsw(params) => Ok(Box::new(HnswIndex::new(params, config.metric)?)),
    }
}

/// Shared query validation. `Ok(false)` means the answer is trivially empty.
pub(crate) fn check_query(index: &dyn VectorIndex, query: &Embedding, k: usize) -> RecResult<bool> {
    let Some(dim) = index.dimensions() else {
        return Ok(false);
    };
    if query.len() != dim {
        return Err(RecError::DimensionMismatch { expected: dim, actual: query.len() });
    }
    Ok(k > 0 && !index.is_empty())
}
