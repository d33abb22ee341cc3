use serde::{Deserialize, Serialize};
use std::collections::BinaryHeap;
use tracing::debug;

use super::buffer::VectorBuffer;
use super::{check_query, IndexKind, IndexStateRef, Neighbor, VectorIndex};
use crate::config::{IndexBackend, IndexConfig};
use crate::distance::{calculate_distance, DistanceMetric};
use crate::error::RecResult;
use crate::vector::Embedding;

/// Exact nearest-neighbour index: every query scans every stored vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    metric: DistanceMetric,
    vectors: VectorBuffer,
}

impl FlatIndex {
    pub fn new(metric: DistanceMetric) -> Self {
        FlatIndex { metric, vectors: VectorBuffer::default() }
    }
}

impl VectorIndex for FlatIndex {
    fn add(&mut self, vectors: &[Embedding]) -> RecResult<()> {
        self.vectors.push_all(vectors)
    }

    fn search(&self, query: &Embedding, k: usize) -> RecResult<Vec<Neighbor>> {
        if !check_query(self, query, k)? {
            return Ok(Vec::new());
        }
        // Max-heap on distance: the top is the worst of the current k best.
        let k = k.min(self.vectors.len());
        let mut best: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k.saturating_add(1));
        for position in 0..self.vectors.len() {
            let Some(row) = self.vectors.get(position) else { break };
            let distance = calculate_distance(self.metric, query.view(), row)?;
            let candidate = Neighbor { position, distance };
            if best.len() < k {
                best.push(candidate);
            } else if best.peek().map_or(false, |worst| candidate < *worst) {
                best.pop();
                best.push(candidate);
            }
        }
        let results = best.into_sorted_vec();
        debug!(k, num_results = results.len(), "Flat search completed");
        Ok(results)
    }

    fn truncate(&mut self, len: usize) -> RecResult<()> {
        self.vectors.truncate(len);
        Ok(())
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimensions(&self) -> Option<usize> {
        self.vectors.dim()
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn config(&self) -> IndexConfig {
        IndexConfig { metric: self.metric, backend: IndexBackend::Flat }
    }

    fn vector(&self, position: usize) -> Option<Embedding> {
        self.vectors.get(position).map(|row| Embedding(row.to_owned()))
    }

    fn state(&self) -> IndexStateRef<'_> {
        IndexStateRef::Flat(self)
    }
}
