//! Offline index build: reads a JSONL catalog export and writes the index,
//! identifier array and checkpoint files into the data directory.

use anyhow::{bail, Context, Result};
use bookrec_core::{
    BuildConfig, BuildState, DistanceMetric, EmbedderConfig, HashingEmbedder, HnswParams, IndexBackend, IndexBuilder,
    IndexConfig, IndexPaths, JsonlSource,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Flat,
    Hnsw,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmbedderArg {
    Hashing,
    Http,
}

#[derive(Debug, Parser)]
#[command(name = "bookrec-build", about = "Build or resume the book embedding index")]
struct Args {
    /// JSONL file with one `{"id", "description"}` object per line.
    #[arg(long, env = "BOOKREC_SOURCE")]
    source: PathBuf,

    #[arg(long, env = "BOOKREC_DATA_PATH", default_value = "./bookrec_data")]
    data_dir: PathBuf,

    #[arg(long, default_value_t = BuildConfig::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    #[arg(long, default_value_t = BuildConfig::DEFAULT_ENCODE_CHUNK_SIZE)]
    chunk_size: usize,

    /// Concurrent embedding calls; defaults to the number of CPUs.
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long, value_enum, default_value_t = BackendArg::Flat)]
    backend: BackendArg,

    #[arg(long, default_value = "euclidean")]
    metric: DistanceMetric,

    #[arg(long, default_value_t = 16)]
    hnsw_m: usize,

    #[arg(long, default_value_t = 200)]
    ef_construction: usize,

    #[arg(long, default_value_t = 50)]
    ef_search: usize,

    #[arg(long, value_enum, default_value_t = EmbedderArg::Hashing)]
    embedder: EmbedderArg,

    #[arg(long, env = "BOOKREC_EMBEDDING_DIMENSIONS")]
    dimensions: Option<usize>,

    #[arg(long, env = "BOOKREC_EMBEDDING_URL", default_value = "https://api.openai.com/v1")]
    embedding_url: String,

    #[arg(long, env = "BOOKREC_EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    #[arg(long, env = "BOOKREC_EMBEDDING_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Stop after this many batches, leaving the checkpoint for a later run.
    #[arg(long)]
    max_batches: Option<usize>,

    /// Use the `embedding` field of source records instead of re-embedding
    /// their descriptions. Only valid when those vectors came from the same model.
    #[arg(long)]
    use_stored_embeddings: bool,
}

impl Args {
    fn index_config(&self) -> IndexConfig {
        let backend = match self.backend {
            BackendArg::Flat => IndexBackend::Flat,
            BackendArg::Hnsw => IndexBackend::Hnsw(HnswParams::new(self.hnsw_m, self.ef_construction, self.ef_search)),
        };
        IndexConfig { metric: self.metric, backend }
    }

    fn build_config(&self) -> BuildConfig {
        let defaults = BuildConfig::default();
        BuildConfig {
            batch_size: self.batch_size,
            encode_chunk_size: self.chunk_size,
            encode_workers: self.workers.unwrap_or(defaults.encode_workers),
        }
    }

    fn embedder_config(&self) -> Result<EmbedderConfig> {
        Ok(match self.embedder {
            EmbedderArg::Hashing => EmbedderConfig::Hashing {
                dimensions: self.dimensions.unwrap_or(HashingEmbedder::DEFAULT_DIMENSIONS),
            },
            EmbedderArg::Http => {
                let Some(model) = self.embedding_model.clone() else {
                    bail!("--embedding-model is required with --embedder http");
                };
                EmbedderConfig::Http {
                    base_url: self.embedding_url.clone(),
                    model,
                    api_key: self.api_key.clone(),
                    dimensions: self.dimensions,
                    timeout_secs: 60,
                    max_retries: 5,
                }
            }
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("bookrec_server=info".parse()?)
                .add_directive("bookrec_core=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let paths = IndexPaths::in_dir(&args.data_dir);
    let embedder = args.embedder_config()?.build().context("failed to construct embedder")?;

    match BuildState::detect(&paths).context("failed to inspect data directory")? {
        BuildState::InProgress(cp) => info!(batch_index = cp.batch_index, "Resuming interrupted build"),
        BuildState::Complete => info!("Existing index found; rebuilding from scratch"),
        BuildState::Fresh => info!("Starting a new build"),
    }

    let mut builder = IndexBuilder::new(
        embedder,
        Arc::new(JsonlSource::new(&args.source)),
        args.index_config(),
        args.build_config(),
        paths,
    );
    if args.use_stored_embeddings {
        builder = builder.with_stored_embeddings();
    }
    if let Some(limit) = args.max_batches {
        builder = builder.with_batch_limit(limit);
    }

    let report = builder
        .build()
        .await
        .with_context(|| format!("index build from {} failed", args.source.display()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
