//! Read-only query path over a built index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::IndexPaths;
use crate::distance::DistanceMetric;
use crate::embedding::Embedder;
use crate::error::{RecError, RecResult};
use crate::index::{load_index, IndexKind, VectorIndex};
use crate::persistence::IdentifierArray;
use crate::vector::{Embedding, EntityId};

/// What to find neighbours of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Query {
    /// Free text, embedded with the recommender's embedder.
    Description(String),
    /// A vector already produced by the same model as the index.
    Vector(Vec<f32>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: EntityId,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub count: usize,
    pub dimensions: Option<usize>,
    pub metric: DistanceMetric,
    pub kind: IndexKind,
    pub model_id: String,
    pub built_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Recommender {
    embedder: Arc<dyn Embedder>,
    index: Box<dyn VectorIndex>,
    ids: IdentifierArray,
    positions: HashMap<EntityId, usize>,
    model_id: String,
    built_at: Option<DateTime<Utc>>,
}

fn unavailable_if_missing(err: RecError) -> RecError {
    match err {
        RecError::IoError { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
            RecError::IndexUnavailable(format!("{} does not exist; run an index build first", path.display()))
        }
        other => other,
    }
}

impl Recommender {
    /// Loads the index and identifier files written by a completed build.
    pub fn load(embedder: Arc<dyn Embedder>, paths: &IndexPaths) -> RecResult<Self> {
        let (index, header) = load_index(&paths.index_file).map_err(unavailable_if_missing)?;
        let ids = IdentifierArray::load(&paths.ids_file).map_err(unavailable_if_missing)?;

        if header.model_id != embedder.model_id() {
            return Err(RecError::ModelMismatch { expected: header.model_id, actual: embedder.model_id().to_string() });
        }
        let mut recommender = Self::from_parts(embedder, index, ids)?;
        recommender.built_at = Some(header.created_at);
        info!(count = recommender.ids.len(), model_id = %recommender.model_id, "Recommender loaded");
        Ok(recommender)
    }

    /// Wraps an index and its identifier array, which must be positionally aligned.
    pub fn from_parts(embedder: Arc<dyn Embedder>, index: Box<dyn VectorIndex>, ids: IdentifierArray) -> RecResult<Self> {
        if ids.len() != index.len() {
            return Err(RecError::InconsistentState(format!(
                "index holds {} vectors but identifier array has {} entries",
                index.len(),
                ids.len()
            )));
        }
        let mut positions = HashMap::with_capacity(ids.len());
        for (position, id) in ids.iter().enumerate() {
            if positions.insert(id.clone(), position).is_some() {
                return Err(RecError::InconsistentState(format!("identifier '{}' appears more than once", id)));
            }
        }
        let model_id = embedder.model_id().to_string();
        Ok(Recommender { embedder, index, ids, positions, model_id, built_at: None })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            count: self.index.len(),
            dimensions: self.index.dimensions(),
            metric: self.index.metric(),
            kind: self.index.kind(),
            model_id: self.model_id.clone(),
            built_at: self.built_at,
        }
    }

    async fn query_vector(&self, query: &Query) -> RecResult<Option<Embedding>> {
        let vector = match query {
            Query::Description(text) if text.trim().is_empty() => return Ok(None),
            Query::Description(text) => {
                let mut out = self.embedder.embed(std::slice::from_ref(text)).await?;
                out.pop().ok_or_else(|| RecError::Embedding("embedder returned no vector".to_string()))?
            }
            Query::Vector(v) if v.is_empty() => return Ok(None),
            Query::Vector(v) => Embedding::from(v.clone()),
        };
        // Text with no usable tokens embeds to the origin, which is equally near everything.
        if vector.iter().all(|x| *x == 0.0) {
            return Ok(None);
        }
        Ok(Some(vector))
    }

    /// Up to `k` identifiers nearest to `query`, nearest first, never including `exclude_id`.
    pub async fn recommend(&self, query: &Query, exclude_id: Option<&str>, k: usize) -> RecResult<Vec<Recommendation>> {
        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }
        let Some(vector) = self.query_vector(query).await? else {
            debug!("Empty reference vector; returning no recommendations");
            return Ok(Vec::new());
        };

        let k = k.min(self.index.len());
        let excluding = exclude_id.map_or(false, |id| self.contains(id));
        let fetch = if excluding { k.saturating_add(1) } else { k };
        let neighbors = self.index.search(&vector, fetch)?;

        let mut results = Vec::with_capacity(k);
        for neighbor in neighbors {
            let id = self.ids.get(neighbor.position).ok_or_else(|| {
                RecError::Internal(format!("search returned position {} outside the identifier array", neighbor.position))
            })?;
            if Some(id) == exclude_id {
                continue;
            }
            results.push(Recommendation { id: id.to_string(), distance: neighbor.distance });
            if results.len() == k {
                break;
            }
        }
        debug!(k, returned = results.len(), "Recommendations computed");
        Ok(results)
    }

    /// Neighbours of an indexed entity using its stored vector. Unknown ids yield an empty list.
    pub async fn recommend_for_id(&self, id: &str, k: usize) -> RecResult<Vec<Recommendation>> {
        let Some(vector) = self.positions.get(id).and_then(|&position| self.index.vector(position)) else {
            debug!(id, "Entity not in index; returning no recommendations");
            return Ok(Vec::new());
        };
        self.recommend(&Query::Vector(vector.into()), Some(id), k).await
    }
}
