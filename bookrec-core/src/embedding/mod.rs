//! Text embedding providers and the chunked encoding helper used by the builder.

pub mod hashing;
pub mod http;

pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;

use crate::error::{RecError, RecResult};
use crate::vector::Embedding;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Deterministic mapping from text to a fixed-width vector.
///
/// The same embedder (same `model_id`) must be used to build an index and to
/// query it; distances between vectors of different models are meaningless.
#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// Stable identifier of the model and its preprocessing.
    fn model_id(&self) -> &str;

    /// Embeds `texts`, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> RecResult<Vec<Embedding>>;
}

/// Embeds `texts` in chunks of `chunk_size`, keeping up to `workers` chunks in
/// flight. Results come back in input order; any failing chunk fails the call.
pub async fn encode_in_chunks(
    embedder: &dyn Embedder,
    texts: &[String],
    chunk_size: usize,
    workers: usize,
) -> RecResult<Vec<Embedding>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let chunk_size = chunk_size.max(1);
    debug!(count = texts.len(), chunk_size, workers, "Encoding descriptions");

    // Futures are built (lazily, unpolled) up front so no closure type is held
    // across an await; this keeps the future provably `Send` under `tokio::spawn`.
    let pending: Vec<futures::future::BoxFuture<'_, RecResult<Vec<Embedding>>>> = texts
        .chunks(chunk_size)
        .map(|chunk| -> futures::future::BoxFuture<'_, RecResult<Vec<Embedding>>> {
            Box::pin(async move {
                let embedded = embedder.embed(chunk).await?;
                if embedded.len() != chunk.len() {
                    return Err(RecError::Embedding(format!(
                        "embedder returned {} vectors for {} inputs",
                        embedded.len(),
                        chunk.len()
                    )));
                }
                Ok(embedded)
            })
        })
        .collect();

    let chunks: Vec<Vec<Embedding>> = stream::iter(pending)
        // `buffered` yields in submission order regardless of completion order
        .buffered(workers.max(1))
        .try_collect()
        .await?;

    Ok(chunks.into_iter().flatten().collect())
}

/// Serializable choice of embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmbedderConfig {
    Hashing {
        dimensions: usize,
    },
    Http {
        base_url: String,
        model: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        dimensions: Option<usize>,
        timeout_secs: u64,
        max_retries: usize,
    },
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        EmbedderConfig::Hashing { dimensions: HashingEmbedder::DEFAULT_DIMENSIONS }
    }
}

impl EmbedderConfig {
    /// Constructs the configured embedder.
    pub fn build(&self) -> RecResult<Arc<dyn Embedder>> {
        match self {
            EmbedderConfig::Hashing { dimensions } => Ok(Arc::new(HashingEmbedder::new(*dimensions)?)),
            EmbedderConfig::Http { base_url, model, api_key, dimensions, timeout_secs, max_retries } => {
                Ok(Arc::new(HttpEmbedder::new(
                    base_url,
                    model,
                    api_key.as_deref(),
                    *dimensions,
                    Duration::from_secs((*timeout_secs).max(1)),
                    (*max_retries).max(1),
                )?))
            }
        }
    }
}
