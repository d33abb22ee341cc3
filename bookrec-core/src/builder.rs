//! Offline index build with per-batch checkpointing.
//!
//! Each batch is embedded, appended to the index and the identifier array, and
//! then persisted in the order index file, ids file, checkpoint. The checkpoint
//! is the commit point: a crash before it is written leaves the previous
//! checkpoint in charge, and any vectors the index file holds past it are
//! truncated on resume. A new run writes a zero-batch checkpoint before its
//! first batch, so an interrupted batch 0 never looks like a finished build.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{BuildConfig, IndexConfig, IndexPaths};
use crate::embedding::{encode_in_chunks, Embedder};
use crate::error::{RecError, RecResult};
use crate::index::{build_index, load_index, save_index, VectorIndex};
use crate::persistence::{BuildState, Checkpoint, CheckpointStore, IdentifierArray};
use crate::source::{Entity, EntitySource};
use crate::vector::{Embedding, EntityId};

/// Summary of one `build` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Batches embedded and committed by this run.
    pub batches_processed: usize,
    /// Batches already committed by an earlier, interrupted run.
    pub batches_skipped: usize,
    /// Entities in the index after this run.
    pub total_entities: usize,
    pub dimensions: Option<usize>,
    pub resumed: bool,
    /// False when the run stopped at its batch limit with work remaining.
    pub completed: bool,
}

pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    source: Arc<dyn EntitySource>,
    index_config: IndexConfig,
    build_config: BuildConfig,
    paths: IndexPaths,
    batch_limit: Option<usize>,
    use_stored_embeddings: bool,
}

/// In-memory state carried from batch to batch.
struct Progress {
    index: Box<dyn VectorIndex>,
    ids: IdentifierArray,
    seen: HashSet<EntityId>,
    next_batch: usize,
    resumed: bool,
}

impl IndexBuilder {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        source: Arc<dyn EntitySource>,
        index_config: IndexConfig,
        build_config: BuildConfig,
        paths: IndexPaths,
    ) -> Self {
        IndexBuilder { embedder, source, index_config, build_config, paths, batch_limit: None, use_stored_embeddings: false }
    }

    /// Stops after committing `limit` batches, leaving the checkpoint so a later run resumes.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = Some(limit);
        self
    }

    /// Appends an entity's stored vector as is instead of embedding its
    /// description. The stored vectors must come from the same model as the embedder.
    pub fn with_stored_embeddings(mut self) -> Self {
        self.use_stored_embeddings = true;
        self
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    pub async fn build(&self) -> RecResult<BuildReport> {
        self.index_config.validate()?;
        self.build_config.validate()?;

        let checkpoints = CheckpointStore::new(&self.paths.checkpoint_file);
        let mut progress = match BuildState::detect(&self.paths)? {
            BuildState::InProgress(checkpoint) if checkpoint.batch_index == 0 => {
                info!("Checkpoint holds no committed batches; starting from scratch");
                self.begin(&checkpoints)?
            }
            BuildState::InProgress(checkpoint) => self.resume_from(checkpoint)?,
            BuildState::Complete => {
                info!(index_file = ?self.paths.index_file, "Previous build is complete; rebuilding from scratch");
                self.begin(&checkpoints)?
            }
            BuildState::Fresh => self.begin(&checkpoints)?,
        };

        let batch_size = self.build_config.batch_size;
        let batches_skipped = progress.next_batch;
        let mut batches_processed = 0usize;
        let mut completed = false;

        info!(
            model_id = self.embedder.model_id(),
            batch_size,
            start_batch = progress.next_batch,
            resumed = progress.resumed,
            "Starting index build"
        );

        loop {
            if self.batch_limit.map_or(false, |limit| batches_processed >= limit) {
                info!(batches_processed, "Batch limit reached; leaving checkpoint for the next run");
                break;
            }

            let offset = progress.next_batch.saturating_mul(batch_size);
            let entities = self.source.page(offset, batch_size).await?;
            if entities.is_empty() {
                completed = true;
                break;
            }
            let short_page = entities.len() < batch_size;

            self.process_batch(&mut progress, entities).await?;
            self.commit(&progress, &checkpoints)?;
            batches_processed += 1;

            if short_page {
                completed = true;
                break;
            }
        }

        if completed {
            self.finalize(&progress, &checkpoints, batches_processed > 0)?;
        }

        let report = BuildReport {
            batches_processed,
            batches_skipped,
            total_entities: progress.ids.len(),
            dimensions: progress.index.dimensions(),
            resumed: progress.resumed,
            completed,
        };
        info!(?report, "Index build finished");
        Ok(report)
    }

    /// Marks the run as in progress before any index or ids file is touched,
    /// so a crash inside batch 0 is never mistaken for a finished build.
    fn begin(&self, checkpoints: &CheckpointStore) -> RecResult<Progress> {
        let progress = self.fresh()?;
        checkpoints.save(&self.checkpoint_for(&progress))?;
        Ok(progress)
    }

    fn fresh(&self) -> RecResult<Progress> {
        Ok(Progress {
            index: build_index(&self.index_config)?,
            ids: IdentifierArray::new(),
            seen: HashSet::new(),
            next_batch: 0,
            resumed: false,
        })
    }

    fn resume_from(&self, checkpoint: Checkpoint) -> RecResult<Progress> {
        checkpoint.ensure_resumable(self.embedder.model_id(), self.build_config.batch_size, &self.index_config)?;

        let (mut index, header) = match load_index(&self.paths.index_file) {
            Ok(loaded) => loaded,
            Err(RecError::IoError { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(RecError::InconsistentState(format!(
                    "checkpoint records {} batches but index file {:?} is missing",
                    checkpoint.batch_index, self.paths.index_file
                )));
            }
            Err(e) => return Err(e),
        };
        if header.model_id != checkpoint.model_id {
            return Err(RecError::ModelMismatch { expected: checkpoint.model_id, actual: header.model_id });
        }
        if index.config() != self.index_config {
            return Err(RecError::InconsistentState("index file configuration differs from the checkpoint".to_string()));
        }

        let committed = checkpoint.book_ids.len();
        if index.len() < committed {
            return Err(RecError::InconsistentState(format!(
                "index holds {} vectors but checkpoint lists {} ids",
                index.len(),
                committed
            )));
        }
        if index.len() > committed {
            warn!(index_len = index.len(), committed, "Index is ahead of the checkpoint; discarding uncommitted vectors");
            index.truncate(committed)?;
        }
        if committed > 0 && index.dimensions() != checkpoint.dimensions {
            return Err(RecError::InconsistentState(format!(
                "index dimension {:?} differs from checkpoint dimension {:?}",
                index.dimensions(),
                checkpoint.dimensions
            )));
        }

        let seen: HashSet<EntityId> = checkpoint.book_ids.iter().cloned().collect();
        if seen.len() != committed {
            return Err(RecError::InconsistentState("checkpoint contains duplicate ids".to_string()));
        }

        info!(batch_index = checkpoint.batch_index, committed, "Resuming index build from checkpoint");
        Ok(Progress {
            index,
            ids: IdentifierArray::from(checkpoint.book_ids),
            seen,
            next_batch: checkpoint.batch_index,
            resumed: true,
        })
    }

    /// Embeds and appends one batch. Leaves `progress` untouched on error.
    async fn process_batch(&self, progress: &mut Progress, entities: Vec<Entity>) -> RecResult<()> {
        let mut batch_seen: HashSet<&str> = HashSet::with_capacity(entities.len());
        for entity in &entities {
            if progress.seen.contains(&entity.id) || !batch_seen.insert(entity.id.as_str()) {
                return Err(RecError::InvalidArgument(format!(
                    "entity id '{}' appears more than once in the source",
                    entity.id
                )));
            }
        }

        let texts: Vec<String> =
            entities.iter().filter(|&e| self.stored_vector(e).is_none()).map(|e| e.description.clone()).collect();
        let encoded = encode_in_chunks(
            self.embedder.as_ref(),
            &texts,
            self.build_config.encode_chunk_size,
            self.build_config.encode_workers,
        )
        .await?;
        if encoded.len() != texts.len() {
            return Err(RecError::Embedding(format!("expected {} embeddings, got {}", texts.len(), encoded.len())));
        }

        let mut encoded = encoded.into_iter();
        let mut embeddings = Vec::with_capacity(entities.len());
        for entity in &entities {
            let embedding = match self.stored_vector(entity) {
                Some(vector) => Embedding::from(vector.clone()),
                None => encoded
                    .next()
                    .ok_or_else(|| RecError::Internal("ran out of embeddings while merging stored vectors".to_string()))?,
            };
            embeddings.push(embedding);
        }
        if texts.len() < entities.len() {
            debug!(stored = entities.len() - texts.len(), "Used stored embeddings");
        }

        progress.index.add(&embeddings)?;
        for entity in entities {
            progress.seen.insert(entity.id.clone());
            progress.ids.extend(std::iter::once(entity.id));
        }
        progress.next_batch += 1;
        debug!(batch = progress.next_batch, total = progress.ids.len(), "Batch appended");
        Ok(())
    }

    fn stored_vector<'a>(&self, entity: &'a Entity) -> Option<&'a Vec<f32>> {
        if self.use_stored_embeddings {
            entity.embedding.as_ref()
        } else {
            None
        }
    }

    fn commit(&self, progress: &Progress, checkpoints: &CheckpointStore) -> RecResult<()> {
        if progress.index.len() != progress.ids.len() {
            return Err(RecError::Internal(format!(
                "index has {} vectors but {} ids",
                progress.index.len(),
                progress.ids.len()
            )));
        }
        save_index(&self.paths.index_file, progress.index.as_ref(), self.embedder.model_id())?;
        progress.ids.save(&self.paths.ids_file)?;
        checkpoints.save(&self.checkpoint_for(progress))?;
        info!(batch = progress.next_batch, total = progress.ids.len(), "Committed batch");
        Ok(())
    }

    fn checkpoint_for(&self, progress: &Progress) -> Checkpoint {
        Checkpoint {
            batch_index: progress.next_batch,
            book_ids: progress.ids.as_slice().to_vec(),
            model_id: self.embedder.model_id().to_string(),
            dimensions: progress.index.dimensions(),
            batch_size: self.build_config.batch_size,
            index_config: self.index_config,
            updated_at: chrono::Utc::now(),
        }
    }

    /// The last `commit` already wrote the final files; they are only written
    /// here when this run committed nothing (empty source, or a resume whose
    /// remaining pages were empty and whose index may have been truncated).
    fn finalize(&self, progress: &Progress, checkpoints: &CheckpointStore, committed_this_run: bool) -> RecResult<()> {
        if !committed_this_run {
            save_index(&self.paths.index_file, progress.index.as_ref(), self.embedder.model_id())?;
            progress.ids.save(&self.paths.ids_file)?;
        }
        checkpoints.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::source::MemorySource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn entities(n: usize) -> Vec<Entity> {
        (0..n).map(|i| Entity::new(format!("book-{}", i), format!("description number {} of {}", i, n))).collect()
    }

    fn builder(source: Vec<Entity>, batch_size: usize, dir: &std::path::Path) -> IndexBuilder {
        IndexBuilder::new(
            Arc::new(HashingEmbedder::new(16).unwrap()),
            Arc::new(MemorySource::new(source)),
            IndexConfig::default(),
            BuildConfig { batch_size, encode_chunk_size: 2, encode_workers: 2 },
            IndexPaths::in_dir(dir),
        )
    }

    /// Fails every call once `fail_from` calls have succeeded.
    #[derive(Debug)]
    struct FailingEmbedder {
        inner: HashingEmbedder,
        calls: AtomicUsize,
        fail_from: usize,
    }

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        async fn embed(&self, texts: &[String]) -> RecResult<Vec<Embedding>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fail_from {
                return Err(RecError::Embedding("model server went away".to_string()));
            }
            self.inner.embed(texts).await
        }
    }

    /// Changes output width after the first call.
    #[derive(Debug, Default)]
    struct DriftingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for DriftingEmbedder {
        fn model_id(&self) -> &str {
            "drifting"
        }

        async fn embed(&self, texts: &[String]) -> RecResult<Vec<Embedding>> {
            let width = if self.calls.fetch_add(1, Ordering::SeqCst) == 0 { 4 } else { 5 };
            Ok(texts.iter().map(|_| Embedding::from(vec![1.0; width])).collect())
        }
    }

    /// Blocks the checkpoint's temp path with a directory during the first embed call,
    /// so the batch 0 commit writes index and ids but fails on the checkpoint.
    #[derive(Debug)]
    struct CheckpointBlocker {
        inner: HashingEmbedder,
        temp_path: std::path::PathBuf,
    }

    #[async_trait]
    impl Embedder for CheckpointBlocker {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        async fn embed(&self, texts: &[String]) -> RecResult<Vec<Embedding>> {
            std::fs::create_dir_all(&self.temp_path).unwrap();
            self.inner.embed(texts).await
        }
    }

    #[tokio::test]
    async fn test_fresh_build_writes_files_and_clears_checkpoint() {
        let dir = tempdir().unwrap();
        let b = builder(entities(7), 3, dir.path());
        let report = b.build().await.unwrap();

        assert_eq!(report.batches_processed, 3);
        assert_eq!(report.batches_skipped, 0);
        assert_eq!(report.total_entities, 7);
        assert_eq!(report.dimensions, Some(16));
        assert!(report.completed);
        assert!(!report.resumed);

        let paths = b.paths();
        assert!(!paths.checkpoint_file.exists());
        let (index, header) = load_index(&paths.index_file).unwrap();
        let ids = IdentifierArray::load(&paths.ids_file).unwrap();
        assert_eq!(index.len(), ids.len());
        assert_eq!(header.model_id, "hashing-v1-16");
        assert_eq!(ids.get(0), Some("book-0"));
        assert_eq!(ids.get(6), Some("book-6"));
    }

    #[tokio::test]
    async fn test_exact_multiple_of_batch_size() {
        let dir = tempdir().unwrap();
        let report = builder(entities(6), 3, dir.path()).build().await.unwrap();
        assert_eq!(report.batches_processed, 2);
        assert_eq!(report.total_entities, 6);
        assert!(report.completed);
    }

    #[tokio::test]
    async fn test_empty_source_produces_empty_index() {
        let dir = tempdir().unwrap();
        let b = builder(Vec::new(), 3, dir.path());
        let report = b.build().await.unwrap();
        assert_eq!(report.total_entities, 0);
        assert_eq!(report.dimensions, None);
        assert!(report.completed);
        assert_eq!(BuildState::detect(b.paths()).unwrap(), BuildState::Complete);
    }

    #[tokio::test]
    async fn test_batch_limit_leaves_resumable_checkpoint() {
        let dir = tempdir().unwrap();
        let report = builder(entities(5), 2, dir.path()).with_batch_limit(1).build().await.unwrap();
        assert_eq!(report.batches_processed, 1);
        assert!(!report.completed);

        let paths = IndexPaths::in_dir(dir.path());
        match BuildState::detect(&paths).unwrap() {
            BuildState::InProgress(cp) => {
                assert_eq!(cp.batch_index, 1);
                assert_eq!(cp.book_ids, vec!["book-0".to_string(), "book-1".to_string()]);
            }
            other => panic!("expected in-progress state, got {:?}", other),
        }

        let report = builder(entities(5), 2, dir.path()).build().await.unwrap();
        assert!(report.resumed);
        assert_eq!(report.batches_skipped, 1);
        assert_eq!(report.batches_processed, 2);
        assert_eq!(report.total_entities, 5);
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_last_commit() {
        let dir = tempdir().unwrap();
        // chunk size 2 and batch size 2: one embed call per batch
        let failing = IndexBuilder::new(
            Arc::new(FailingEmbedder { inner: HashingEmbedder::new(16).unwrap(), calls: AtomicUsize::new(0), fail_from: 1 }),
            Arc::new(MemorySource::new(entities(5))),
            IndexConfig::default(),
            BuildConfig { batch_size: 2, encode_chunk_size: 2, encode_workers: 1 },
            IndexPaths::in_dir(dir.path()),
        );
        assert!(matches!(failing.build().await, Err(RecError::Embedding(_))));

        let paths = IndexPaths::in_dir(dir.path());
        let BuildState::InProgress(cp) = BuildState::detect(&paths).unwrap() else {
            panic!("checkpoint should survive a failed batch");
        };
        assert_eq!(cp.batch_index, 1);
        assert_eq!(IdentifierArray::load(&paths.ids_file).unwrap().len(), 2);

        let report = builder(entities(5), 2, dir.path()).build().await.unwrap();
        assert_eq!(report.batches_skipped, 1);
        assert_eq!(report.total_entities, 5);
    }

    #[tokio::test]
    async fn test_dimension_change_is_fatal() {
        let dir = tempdir().unwrap();
        let b = IndexBuilder::new(
            Arc::new(DriftingEmbedder::default()),
            Arc::new(MemorySource::new(entities(4))),
            IndexConfig::default(),
            BuildConfig { batch_size: 2, encode_chunk_size: 2, encode_workers: 1 },
            IndexPaths::in_dir(dir.path()),
        );
        let err = b.build().await.unwrap_err();
        assert!(matches!(err, RecError::DimensionMismatch { expected: 4, actual: 5 }));

        let (index, _) = load_index(&b.paths().index_file).unwrap();
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_rejected() {
        let dir = tempdir().unwrap();
        let mut source = entities(3);
        source.push(Entity::new("book-1", "again"));
        let err = builder(source, 2, dir.path()).build().await.unwrap_err();
        assert!(matches!(err, RecError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_resume_refuses_changed_batch_size_or_model() {
        let dir = tempdir().unwrap();
        builder(entities(5), 2, dir.path()).with_batch_limit(1).build().await.unwrap();

        let err = builder(entities(5), 3, dir.path()).build().await.unwrap_err();
        assert!(matches!(err, RecError::InconsistentState(_)));

        let other_model = IndexBuilder::new(
            Arc::new(HashingEmbedder::new(8).unwrap()),
            Arc::new(MemorySource::new(entities(5))),
            IndexConfig::default(),
            BuildConfig { batch_size: 2, encode_chunk_size: 2, encode_workers: 1 },
            IndexPaths::in_dir(dir.path()),
        );
        assert!(matches!(other_model.build().await, Err(RecError::ModelMismatch { .. })));
    }

    #[tokio::test]
    async fn test_index_ahead_of_checkpoint_is_truncated() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        builder(entities(6), 2, dir.path()).with_batch_limit(1).build().await.unwrap();

        // Simulate a crash after the index write of batch 2 but before its checkpoint.
        let (mut index, header) = load_index(&paths.index_file).unwrap();
        let extra = HashingEmbedder::new(16).unwrap();
        index.add(&[extra.embed_text("ghost one"), extra.embed_text("ghost two")]).unwrap();
        save_index(&paths.index_file, index.as_ref(), &header.model_id).unwrap();

        let report = builder(entities(6), 2, dir.path()).build().await.unwrap();
        assert_eq!(report.total_entities, 6);
        let (index, _) = load_index(&paths.index_file).unwrap();
        assert_eq!(index.len(), 6);
    }

    #[tokio::test]
    async fn test_rebuild_after_complete_starts_fresh() {
        let dir = tempdir().unwrap();
        builder(entities(3), 2, dir.path()).build().await.unwrap();
        let report = builder(entities(4), 2, dir.path()).build().await.unwrap();
        assert!(!report.resumed);
        assert_eq!(report.batches_skipped, 0);
        assert_eq!(report.total_entities, 4);
    }

    #[tokio::test]
    async fn test_failed_first_commit_is_not_reported_complete() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let mut temp_path = paths.checkpoint_file.clone().into_os_string();
        temp_path.push(".tmp");
        let temp_path = std::path::PathBuf::from(temp_path);

        let blocked = IndexBuilder::new(
            Arc::new(CheckpointBlocker { inner: HashingEmbedder::new(16).unwrap(), temp_path: temp_path.clone() }),
            Arc::new(MemorySource::new(entities(3))),
            IndexConfig::default(),
            BuildConfig { batch_size: 1, encode_chunk_size: 1, encode_workers: 1 },
            paths.clone(),
        );
        assert!(matches!(blocked.build().await, Err(RecError::IoError { .. })));

        // index and ids of batch 0 reached disk, but the commit point did not
        assert_eq!(IdentifierArray::load(&paths.ids_file).unwrap().len(), 1);
        match BuildState::detect(&paths).unwrap() {
            BuildState::InProgress(cp) => {
                assert_eq!(cp.batch_index, 0);
                assert!(cp.book_ids.is_empty());
            }
            other => panic!("expected in-progress state, got {:?}", other),
        }

        std::fs::remove_dir(&temp_path).unwrap();
        let report = builder(entities(3), 1, dir.path()).build().await.unwrap();
        assert!(!report.resumed);
        assert_eq!(report.total_entities, 3);
        assert_eq!(BuildState::detect(&paths).unwrap(), BuildState::Complete);
        let (index, _) = load_index(&paths.index_file).unwrap();
        assert_eq!(index.len(), 3);
    }

    #[tokio::test]
    async fn test_interrupted_rebuild_over_complete_index_is_in_progress() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        builder(entities(4), 2, dir.path()).build().await.unwrap();

        let failing = IndexBuilder::new(
            Arc::new(FailingEmbedder { inner: HashingEmbedder::new(16).unwrap(), calls: AtomicUsize::new(0), fail_from: 0 }),
            Arc::new(MemorySource::new(entities(4))),
            IndexConfig::default(),
            BuildConfig { batch_size: 2, encode_chunk_size: 2, encode_workers: 1 },
            paths.clone(),
        );
        assert!(failing.build().await.is_err());
        assert!(matches!(BuildState::detect(&paths).unwrap(), BuildState::InProgress(_)));

        let report = builder(entities(3), 2, dir.path()).build().await.unwrap();
        assert_eq!(report.total_entities, 3);
        assert_eq!(BuildState::detect(&paths).unwrap(), BuildState::Complete);
    }

    #[tokio::test]
    async fn test_resume_with_nothing_left_rewrites_truncated_files() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        builder(entities(4), 2, dir.path()).with_batch_limit(2).build().await.unwrap();

        // a crash after writing a ghost batch past the last checkpoint
        let (mut index, header) = load_index(&paths.index_file).unwrap();
        index.add(&[HashingEmbedder::new(16).unwrap().embed_text("ghost")]).unwrap();
        save_index(&paths.index_file, index.as_ref(), &header.model_id).unwrap();

        let report = builder(entities(4), 2, dir.path()).build().await.unwrap();
        assert_eq!(report.batches_processed, 0);
        assert!(report.completed);
        let (index, _) = load_index(&paths.index_file).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(BuildState::detect(&paths).unwrap(), BuildState::Complete);
    }

    #[tokio::test]
    async fn test_stored_embeddings_skip_the_embedder() {
        let dir = tempdir().unwrap();
        let hashing = HashingEmbedder::new(16).unwrap();
        let mut source = entities(4);
        source[1].embedding = Some(hashing.embed_text("precomputed").to_vec());
        source[3].embedding = Some(vec![0.5; 16]);

        // fail_from 1: a single embed call covers the two entities without a stored vector
        let b = IndexBuilder::new(
            Arc::new(FailingEmbedder { inner: HashingEmbedder::new(16).unwrap(), calls: AtomicUsize::new(0), fail_from: 1 }),
            Arc::new(MemorySource::new(source.clone())),
            IndexConfig::default(),
            BuildConfig { batch_size: 4, encode_chunk_size: 4, encode_workers: 1 },
            IndexPaths::in_dir(dir.path()),
        )
        .with_stored_embeddings();
        let report = b.build().await.unwrap();
        assert_eq!(report.total_entities, 4);

        let (index, _) = load_index(&b.paths().index_file).unwrap();
        assert_eq!(index.vector(1).unwrap(), hashing.embed_text("precomputed"));
        assert_eq!(index.vector(3).unwrap(), Embedding::from(vec![0.5; 16]));
        assert_eq!(index.vector(2).unwrap(), hashing.embed_text(&source[2].description));
    }

    #[tokio::test]
    async fn test_stored_embedding_of_wrong_width_is_fatal() {
        let dir = tempdir().unwrap();
        let mut source = entities(3);
        source[2].embedding = Some(vec![1.0; 3]);
        let b = builder(source, 3, dir.path()).with_stored_embeddings();
        assert!(matches!(b.build().await, Err(RecError::DimensionMismatch { expected: 16, actual: 3 })));
    }
}
