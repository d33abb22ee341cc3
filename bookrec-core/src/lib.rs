pub mod builder;
pub mod config;
pub mod distance;
pub mod embedding;
pub mod error;
pub mod index;
pub mod persistence;
pub mod recommender;
pub mod source;
pub mod vector;
mod utils;

// Re-export key types/traits for easier use
pub use builder::{BuildReport, IndexBuilder};
pub use config::{BuildConfig, HnswParams, IndexBackend, IndexConfig, IndexPaths};
pub use distance::DistanceMetric;
pub use embedding::{Embedder, EmbedderConfig, HashingEmbedder, HttpEmbedder};
pub use error::{RecError, RecResult};
pub use index::{build_index, FlatIndex, HnswIndex, IndexKind, Neighbor, VectorIndex};
pub use persistence::{BuildState, Checkpoint, CheckpointStore, IdentifierArray};
pub use recommender::{IndexStats, Query, Recommendation, Recommender};
pub use source::{Entity, EntitySource, JsonlSource, MemorySource};
pub use vector::{Embedding, EntityId};
