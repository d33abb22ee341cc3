use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use crate::distance::DistanceMetric;
use crate::error::{RecResult, RecError};

/// Configuration parameters for the HNSW backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    /// The maximum number of connections per node per layer.
    pub m: usize,
    /// The maximum number of connections for layer 0. Typically 2 * m.
    pub m_max0: usize,
    /// The size of the dynamic candidate list during index construction (higher means better quality, slower build).
    pub ef_construction: usize,
    /// The size of the dynamic candidate list during search (higher means better recall, slower search).
    pub ef_search: usize,
    /// Normalization factor for level generation (controls the probability distribution of levels).
    pub ml: f64,
    /// Seed mixed with each node's position to derive its level.
    pub seed: u64,
}

impl HnswParams {
    /// Creates a new HNSW configuration with default values derived from M.
    pub fn new(m: usize, ef_construction: usize, ef_search: usize) -> Self {
        HnswParams {
            m,
            m_max0: m * 2,
            ef_construction,
            ef_search,
            ml: 1.0 / (m.max(2) as f64).ln(),
            seed: 42,
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> RecResult<()> {
        if self.m == 0 {
            return Err(RecError::Configuration("M must be greater than 0".to_string()));
        }
        if self.m_max0 == 0 {
            return Err(RecError::Configuration("M_max0 must be greater than 0".to_string()));
        }
        if self.ef_construction == 0 {
            return Err(RecError::Configuration("ef_construction must be greater than 0".to_string()));
        }
        if self.ef_search == 0 {
            return Err(RecError::Configuration("ef_search must be greater than 0".to_string()));
        }
        if self.ml <= 0.0 {
            return Err(RecError::Configuration("ml must be greater than 0".to_string()));
        }
        Ok(())
    }
}

impl Default for HnswParams {
    fn default() -> Self {
        HnswParams {
            m: 16,
            m_max0: 32,
            ef_construction: 200,
            ef_search: 50,
            ml: 1.0 / (16.0f64.ln()),
            seed: 42,
        }
    }
}

/// Which index structure backs the vector search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IndexBackend {
    /// Exact brute-force search.
    #[default]
    Flat,
    /// Approximate search over an HNSW graph.
    Hnsw(HnswParams),
}

impl FromStr for IndexBackend {
    type Err = RecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" | "exact" => Ok(IndexBackend::Flat),
            "hnsw" | "approximate" => Ok(IndexBackend::Hnsw(HnswParams::default())),
            other => Err(RecError::Configuration(format!("Unknown index backend '{}'", other))),
        }
    }
}

/// Index configuration fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct IndexConfig {
    pub metric: DistanceMetric,
    pub backend: IndexBackend,
}

impl IndexConfig {
    pub fn validate(&self) -> RecResult<()> {
        match &self.backend {
            IndexBackend::Flat => Ok(()),
            IndexBackend::Hnsw(params) => params.validate(),
        }
    }
}

/// Tuning knobs for the offline index build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Number of entities fetched and committed per batch.
    pub batch_size: usize,
    /// Number of descriptions sent to the embedder per call.
    pub encode_chunk_size: usize,
    /// Number of embedding calls in flight at once.
    pub encode_workers: usize,
}

impl BuildConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 10_000;
    pub const DEFAULT_ENCODE_CHUNK_SIZE: usize = 1_000;

    pub fn validate(&self) -> RecResult<()> {
        if self.batch_size == 0 {
            return Err(RecError::Configuration("batch_size must be greater than 0".to_string()));
        }
        if self.encode_chunk_size == 0 {
            return Err(RecError::Configuration("encode_chunk_size must be greater than 0".to_string()));
        }
        if self.encode_workers == 0 {
            return Err(RecError::Configuration("encode_workers must be greater than 0".to_string()));
        }
        Ok(())
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            batch_size: Self::DEFAULT_BATCH_SIZE,
            encode_chunk_size: Self::DEFAULT_ENCODE_CHUNK_SIZE,
            encode_workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        }
    }
}

/// Locations of the files a build produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPaths {
    pub index_file: PathBuf,
    pub ids_file: PathBuf,
    pub checkpoint_file: PathBuf,
}

impl IndexPaths {
    pub const INDEX_FILE: &'static str = "book_index.bkx";
    pub const IDS_FILE: &'static str = "book_ids.json";
    pub const CHECKPOINT_FILE: &'static str = "build_checkpoint.json";

    /// Default file names inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        IndexPaths {
            index_file: data_dir.join(Self::INDEX_FILE),
            ids_file: data_dir.join(Self::IDS_FILE),
            checkpoint_file: data_dir.join(Self::CHECKPOINT_FILE),
        }
    }
}
