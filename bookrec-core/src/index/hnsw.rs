//! In-memory HNSW graph for approximate nearest-neighbour search.
//!
//! Node levels are drawn from an RNG seeded by `(seed, position)`, so the graph
//! depends only on the vectors and their insertion order. Rebuilding from the
//! same prefix (see [`HnswIndex::truncate`]) reproduces the same graph.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use tracing::{debug, trace};

use super::buffer::VectorBuffer;
use super::{check_query, IndexKind, IndexStateRef, Neighbor, VectorIndex};
use crate::config::{HnswParams, IndexBackend, IndexConfig};
use crate::distance::{calculate_distance, DistanceMetric};
use crate::error::{RecError, RecResult};
use crate::utils::{generate_random_level, position_rng};
use crate::vector::Embedding;

const MAX_LEVEL: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswIndex {
    params: HnswParams,
    metric: DistanceMetric,
    vectors: VectorBuffer,
    /// `links[node][layer]` holds the node's neighbours on that layer.
    links: Vec<Vec<Vec<u32>>>,
    entry_point: Option<u32>,
    max_level: usize,
}

impl HnswIndex {
    pub fn new(params: HnswParams, metric: DistanceMetric) -> RecResult<Self> {
        params.validate()?;
        Ok(HnswIndex {
            params,
            metric,
            vectors: VectorBuffer::default(),
            links: Vec::new(),
            entry_point: None,
            max_level: 0,
        })
    }

    pub fn params(&self) -> HnswParams {
        self.params
    }

    fn row(&self, node: u32) -> RecResult<ArrayView1<'_, f32>> {
        self.vectors
            .get(node as usize)
            .ok_or_else(|| RecError::Internal(format!("HNSW node {} has no stored vector", node)))
    }

    fn distance_to(&self, query: ArrayView1<f32>, node: u32) -> RecResult<f32> {
        calculate_distance(self.metric, query, self.row(node)?)
    }

    fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 { self.params.m_max0 } else { self.params.m }
    }

    /// Greedy best-first search restricted to one layer. Returns up to `ef`
    /// candidates sorted nearest first.
    fn search_layer(&self, query: ArrayView1<f32>, entry: u32, ef: usize, layer: usize) -> RecResult<Vec<Neighbor>> {
        let mut visited: HashSet<u32> = HashSet::new();
        // Max-heap: top is the farthest of the current results.
        let mut results: BinaryHeap<Neighbor> = BinaryHeap::new();
        // Min-heap: top is the closest unexplored candidate.
        let mut explore: BinaryHeap<Reverse<Neighbor>> = BinaryHeap::new();

        let first = Neighbor { position: entry as usize, distance: self.distance_to(query, entry)? };
        visited.insert(entry);
        results.push(first);
        explore.push(Reverse(first));

        while let Some(Reverse(current)) = explore.pop() {
            if results.len() >= ef {
                if let Some(worst) = results.peek() {
                    if current.distance > worst.distance {
                        break;
                    }
                }
            }

            let connections = self
                .links
                .get(current.position)
                .and_then(|layers| layers.get(layer))
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            for &neighbor_id in connections {
                if !visited.insert(neighbor_id) {
                    continue;
                }
                let candidate = Neighbor { position: neighbor_id as usize, distance: self.distance_to(query, neighbor_id)? };
                if results.len() < ef {
                    results.push(candidate);
                    explore.push(Reverse(candidate));
                } else if results.peek().map_or(false, |worst| candidate < *worst) {
                    results.pop();
                    results.push(candidate);
                    explore.push(Reverse(candidate));
                }
            }
        }
        Ok(results.into_sorted_vec())
    }

    /// Keeps the `m` closest candidates. `candidates` must be sorted nearest first.
    fn select_neighbors(candidates: &[Neighbor], m: usize) -> Vec<u32> {
        candidates.iter().take(m).map(|n| n.position as u32).collect()
    }

    fn insert_node(&mut self, position: usize) -> RecResult<()> {
        let node = u32::try_from(position)
            .map_err(|_| RecError::InvalidArgument("HNSW index is limited to u32::MAX vectors".to_string()))?;
        let mut rng = position_rng(self.params.seed, position);
        let level = generate_random_level(self.params.ml, &mut rng).min(MAX_LEVEL);
        trace!(node, level, "Inserting HNSW node");

        self.links.push(vec![Vec::new(); level + 1]);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(node);
            self.max_level = level;
            return Ok(());
        };

        let query = self.row(node)?.to_owned();
        let mut current_ep = entry;

        if level < self.max_level {
            for layer in ((level + 1)..=self.max_level).rev() {
                if let Some(best) = self.search_layer(query.view(), current_ep, 1, layer)?.first() {
                    current_ep = best.position as u32;
                }
            }
        }

        for layer in (0..=level.min(self.max_level)).rev() {
            let candidates = self.search_layer(query.view(), current_ep, self.params.ef_construction, layer)?;
            let max_conns = self.max_connections(layer);
            let neighbors = Self::select_neighbors(&candidates, max_conns);
            self.links[position][layer] = neighbors.clone();

            for &neighbor_id in &neighbors {
                let mut connections = self.links[neighbor_id as usize][layer].clone();
                if !connections.contains(&node) {
                    connections.push(node);
                }
                if connections.len() > max_conns {
                    let base = self.row(neighbor_id)?;
                    let mut scored = Vec::with_capacity(connections.len());
                    for &conn in &connections {
                        scored.push(Neighbor { position: conn as usize, distance: calculate_distance(self.metric, base, self.row(conn)?)? });
                    }
                    scored.sort();
                    connections = Self::select_neighbors(&scored, max_conns);
                }
                self.links[neighbor_id as usize][layer] = connections;
            }

            if let Some(best) = candidates.first() {
                current_ep = best.position as u32;
            }
        }

        if level > self.max_level {
            self.entry_point = Some(node);
            self.max_level = level;
            debug!(node, level, "HNSW entry point moved up");
        }
        Ok(())
    }
}

impl VectorIndex for HnswIndex {
    fn add(&mut self, vectors: &[Embedding]) -> RecResult<()> {
        let start = self.vectors.len();
        self.vectors.push_all(vectors)?;
        for position in start..self.vectors.len() {
            self.insert_node(position)?;
        }
        Ok(())
    }

    fn search(&self, query: &Embedding, k: usize) -> RecResult<Vec<Neighbor>> {
        if !check_query(self, query, k)? {
            return Ok(Vec::new());
        }
        let Some(mut current_ep) = self.entry_point else {
            return Ok(Vec::new());
        };

        for layer in (1..=self.max_level).rev() {
            if let Some(best) = self.search_layer(query.view(), current_ep, 1, layer)?.first() {
                current_ep = best.position as u32;
            }
        }
        let mut results = self.search_layer(query.view(), current_ep, self.params.ef_search.max(k), 0)?;
        results.truncate(k);
        debug!(k, ef_search = self.params.ef_search, num_results = results.len(), "HNSW search completed");
        Ok(results)
    }

    fn truncate(&mut self, len: usize) -> RecResult<()> {
        if len >= self.vectors.len() {
            return Ok(());
        }
        debug!(from = self.vectors.len(), to = len, "Rebuilding HNSW graph for truncated index");
        self.vectors.truncate(len);
        self.links.clear();
        self.entry_point = None;
        self.max_level = 0;
        for position in 0..len {
            self.insert_node(position)?;
        }
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
        IndexKind::Hnsw
    }

    fn config(&self) -> IndexConfig {
        IndexConfig { metric: self.metric, backend: IndexBackend::Hnsw(self.params) }
    }

    fn vector(&self, position: usize) -> Option<Embedding> {
        self.vectors.get(position).map(|row| Embedding(row.to_owned()))
    }

    fn state(&self) -> IndexStateRef<'_> {
        IndexStateRef::Hnsw(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FlatIndex;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Embedding> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Embedding::from((0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect::<Vec<f32>>()))
            .collect()
    }

    fn small_params() -> HnswParams {
        HnswParams { m: 8, m_max0: 16, ef_construction: 64, ef_search: 64, ml: 1.0 / 8f64.ln(), seed: 7 }
    }

    #[test]
    fn test_single_vector() {
        let mut index = HnswIndex::new(small_params(), DistanceMetric::Euclidean).unwrap();
        index.add(&[Embedding::from(vec![1.0, 2.0])]).unwrap();
        let results = index.search(&Embedding::from(vec![1.1, 2.1]), 3).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].position, 0);
    }

    #[test]
    fn test_recall_against_flat() {
        let data = random_vectors(300, 8, 1);
        let queries = random_vectors(20, 8, 2);

        let mut hnsw = HnswIndex::new(small_params(), DistanceMetric::Euclidean).unwrap();
        let mut flat = FlatIndex::new(DistanceMetric::Euclidean);
        hnsw.add(&data).unwrap();
        flat.add(&data).unwrap();

        let mut hits = 0;
        for q in &queries {
            let exact: HashSet<usize> = flat.search(q, 10).unwrap().iter().map(|n| n.position).collect();
            let approx = hnsw.search(q, 10).unwrap();
            assert!(approx.windows(2).all(|w| w[0].distance <= w[1].distance));
            hits += approx.iter().filter(|n| exact.contains(&n.position)).count();
        }
        let recall = hits as f64 / (queries.len() * 10) as f64;
        assert!(recall >= 0.9, "recall too low: {}", recall);
    }

    #[test]
    fn test_incremental_add_matches_single_add() {
        let data = random_vectors(120, 4, 3);

        let mut whole = HnswIndex::new(small_params(), DistanceMetric::Angular).unwrap();
        whole.add(&data).unwrap();

        let mut batched = HnswIndex::new(small_params(), DistanceMetric::Angular).unwrap();
        for chunk in data.chunks(25) {
            batched.add(chunk).unwrap();
        }
        assert_eq!(whole, batched);
    }

    #[test]
    fn test_truncate_reproduces_prefix_graph() {
        let data = random_vectors(80, 4, 4);

        let mut prefix = HnswIndex::new(small_params(), DistanceMetric::Euclidean).unwrap();
        prefix.add(&data[..50]).unwrap();

        let mut full = HnswIndex::new(small_params(), DistanceMetric::Euclidean).unwrap();
        full.add(&data).unwrap();
        full.truncate(50).unwrap();

        assert_eq!(prefix, full);
    }

    #[test]
    fn test_dimension_mismatch_leaves_graph_untouched() {
        let mut index = HnswIndex::new(small_params(), DistanceMetric::Euclidean).unwrap();
        index.add(&[Embedding::from(vec![1.0, 0.0])]).unwrap();
        let before = index.clone();
        let err = index.add(&[Embedding::from(vec![1.0, 0.0, 0.0])]).unwrap_err();
        assert!(matches!(err, RecError::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(index, before);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = small_params();
        params.m = 0;
        assert!(matches!(HnswIndex::new(params, DistanceMetric::Euclidean), Err(RecError::Configuration(_))));
    }
}
