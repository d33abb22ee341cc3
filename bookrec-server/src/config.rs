//! Server configuration, read from `BOOKREC_*` environment variables.

use bookrec_core::{BuildConfig, EmbedderConfig, HashingEmbedder, IndexBackend, IndexConfig, IndexPaths, RecError, RecResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_K: usize = 5;
pub const MAX_K: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory holding the index, identifier and checkpoint files.
    pub data_path: PathBuf,
    /// JSONL catalog export used by `POST /index/rebuild`.
    pub source_path: Option<PathBuf>,
    pub index: IndexConfig,
    pub build: BuildConfig,
    pub embedder: EmbedderConfig,
    pub default_k: usize,
    pub max_k: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_path: PathBuf::from("./bookrec_data"),
            source_path: None,
            index: IndexConfig::default(),
            build: BuildConfig::default(),
            embedder: EmbedderConfig::default(),
            default_k: DEFAULT_K,
            max_k: MAX_K,
        }
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> RecResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| RecError::Configuration(format!("{}={:?}: {}", key, raw, e)))
}

impl ServerConfig {
    pub fn from_env() -> RecResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> RecResult<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = ServerConfig::default();

        if let Some(raw) = get("BOOKREC_BIND") {
            config.bind_addr = parse("BOOKREC_BIND", &raw)?;
        }
        if let Some(raw) = get("BOOKREC_DATA_PATH") {
            config.data_path = PathBuf::from(raw);
        }
        config.source_path = get("BOOKREC_SOURCE").map(PathBuf::from);

        if let Some(raw) = get("BOOKREC_METRIC") {
            config.index.metric = parse("BOOKREC_METRIC", &raw)?;
        }
        if let Some(raw) = get("BOOKREC_BACKEND") {
            config.index.backend = parse("BOOKREC_BACKEND", &raw)?;
        }
        if let IndexBackend::Hnsw(params) = &mut config.index.backend {
            if let Some(raw) = get("BOOKREC_HNSW_EF_SEARCH") {
                params.ef_search = parse("BOOKREC_HNSW_EF_SEARCH", &raw)?;
            }
        }

        if let Some(raw) = get("BOOKREC_BATCH_SIZE") {
            config.build.batch_size = parse("BOOKREC_BATCH_SIZE", &raw)?;
        }
        if let Some(raw) = get("BOOKREC_ENCODE_CHUNK_SIZE") {
            config.build.encode_chunk_size = parse("BOOKREC_ENCODE_CHUNK_SIZE", &raw)?;
        }
        if let Some(raw) = get("BOOKREC_ENCODE_WORKERS") {
            config.build.encode_workers = parse("BOOKREC_ENCODE_WORKERS", &raw)?;
        }

        let dimensions: Option<usize> = get("BOOKREC_EMBEDDING_DIMENSIONS")
            .map(|raw| parse("BOOKREC_EMBEDDING_DIMENSIONS", &raw))
            .transpose()?;
        config.embedder = match get("BOOKREC_EMBEDDER").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("hashing") => EmbedderConfig::Hashing {
                dimensions: dimensions.unwrap_or(HashingEmbedder::DEFAULT_DIMENSIONS),
            },
            Some("http") => EmbedderConfig::Http {
                base_url: get("BOOKREC_EMBEDDING_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                model: get("BOOKREC_EMBEDDING_MODEL")
                    .ok_or_else(|| RecError::Configuration("BOOKREC_EMBEDDING_MODEL is required for the http embedder".to_string()))?,
                api_key: get("BOOKREC_EMBEDDING_API_KEY"),
                dimensions,
                timeout_secs: get("BOOKREC_EMBEDDING_TIMEOUT_SECS")
                    .map(|raw| parse("BOOKREC_EMBEDDING_TIMEOUT_SECS", &raw))
                    .transpose()?
                    .unwrap_or(30),
                max_retries: 3,
            },
            Some(other) => return Err(RecError::Configuration(format!("Unknown embedder '{}'", other))),
        };

        if let Some(raw) = get("BOOKREC_DEFAULT_K") {
            config.default_k = parse("BOOKREC_DEFAULT_K", &raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RecResult<()> {
        self.index.validate()?;
        self.build.validate()?;
        if self.default_k == 0 || self.default_k > self.max_k {
            return Err(RecError::Configuration(format!("default k must be between 1 and {}", self.max_k)));
        }
        Ok(())
    }

    pub fn paths(&self) -> IndexPaths {
        IndexPaths::in_dir(&self.data_path)
    }
}
