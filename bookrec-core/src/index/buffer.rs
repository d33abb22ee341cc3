use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{RecError, RecResult};
use crate::vector::Embedding;

/// Row-major, append-only vector storage shared by the index backends.
/// Row `i` holds the vector inserted at position `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct VectorBuffer {
    dim: Option<usize>,
    data: Vec<f32>,
}

impl VectorBuffer {
    pub(crate) fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub(crate) fn len(&self) -> usize {
        match self.dim {
            Some(d) if d > 0 => self.data.len() / d,
            _ => 0,
        }
    }

    /// Checks every vector against the fixed (or about-to-be-fixed) dimension
    /// before appending anything, so a bad batch leaves the buffer untouched.
    pub(crate) fn check_batch(&self, vectors: &[Embedding]) -> RecResult<usize> {
        let expected = match (self.dim, vectors.first()) {
            (Some(d), _) => d,
            (None, Some(first)) => first.len(),
            (None, None) => return Ok(0),
        };
        if expected == 0 {
            return Err(RecError::InvalidArgument("Embeddings must have at least one dimension".to_string()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(RecError::DimensionMismatch { expected, actual: bad.len() });
        }
        Ok(expected)
    }

    pub(crate) fn push_all(&mut self, vectors: &[Embedding]) -> RecResult<()> {
        let dim = self.check_batch(vectors)?;
        if vectors.is_empty() {
            return Ok(());
        }
        self.dim = Some(dim);
        self.data.reserve(vectors.len() * dim);
        for v in vectors {
            self.data.extend(v.iter().copied());
        }
        Ok(())
    }

    pub(crate) fn get(&self, position: usize) -> Option<ArrayView1<'_, f32>> {
        let dim = self.dim?;
        let start = position.checked_mul(dim)?;
        let row = self.data.get(start..start + dim)?;
        Some(ArrayView1::from(row))
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        if let Some(dim) = self.dim {
            self.data.truncate(len * dim);
        }
    }
}
