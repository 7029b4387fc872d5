//! Indexing pipeline orchestration.
//!
//! Coordinates the full sync flow: loader → chunker → record manager →
//! embedder → vector store. Each chunk is identified by its sync key
//! ([`Chunk::sync_key`]); chunks whose key is already recorded are skipped,
//! new ones are embedded and upserted, and keys the run did not touch are
//! deleted according to the [`CleanupMode`].
//!
//! # Algorithm
//!
//! 1. `run_start` is read from the record manager clock.
//! 2. Chunks are processed in batches of `batch_size`. Duplicate keys within a
//!    run are counted as skipped and processed once.
//! 3. Per batch: keys already recorded are skipped (or re-embedded under
//!    `force_update`), the rest are embedded and upserted, then every key in
//!    the batch is stamped with the current time.
//! 4. Cleanup:
//!    - `source`: after each batch, stale keys within that batch's sources;
//!    - `incremental`: after all batches, every key in the namespace older
//!      than `run_start`;
//!    - `none`: nothing.
//!
//! Record keys are sync keys; vector row ids are derived from the namespace
//! and the sync key, so namespaces never share or delete each other's rows.
//!
//! Vector rows are removed before their record entries, so an interrupted
//! run leaves records that the next run will clean up rather than orphaned
//! rows.

use anyhow::{bail, Context, Result};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use uuid::Uuid;

use crate::chunk::RecursiveSplitter;
use crate::config::{CleanupMode, Config, IndexConfig};
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::error::IndexError;
use crate::loader::load_documents;
use crate::models::{row_id, Chunk, IndexSummary, VectorRow};
use crate::records::postgres::PgRecordManager;
use crate::records::{RecordManager, RecordUpdate};
use crate::schema;
use crate::store::postgres::PgVectorStore;
use crate::store::VectorStore;

/// Namespace used when none is given on the command line.
pub const DEFAULT_NAMESPACE: &str = "code_index";

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub namespace: String,
    pub cleanup: CleanupMode,
    pub batch_size: usize,
    pub force_update: bool,
}

impl IndexOptions {
    pub fn new(namespace: &str) -> Self {
        Self::from_config(namespace, &IndexConfig::default())
    }

    pub fn from_config(namespace: &str, config: &IndexConfig) -> Self {
        Self {
            namespace: namespace.to_string(),
            cleanup: config.cleanup,
            batch_size: config.batch_size,
            force_update: config.force_update,
        }
    }
}

/// Index `chunks` into `store`, using `records` to skip unchanged chunks and
/// delete stale ones.
pub async fn index_chunks(
    chunks: &[Chunk],
    records: &dyn RecordManager,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    options: &IndexOptions,
) -> Result<IndexSummary> {
    let namespace = options.namespace.as_str();

    if options.cleanup != CleanupMode::None {
        if let Some(index) = chunks.iter().position(|c| c.source().is_none()) {
            return Err(IndexError::MissingSource { index }.into());
        }
    }
    if chunks.is_empty() && options.cleanup == CleanupMode::Incremental {
        tracing::warn!(namespace, "no chunks to index; every recorded key will be deleted");
    }

    let run_start = records.get_time().await?;
    let mut summary = IndexSummary::default();
    let mut seen: HashSet<Uuid> = HashSet::new();

    for (batch_no, batch) in chunks.chunks(options.batch_size.max(1)).enumerate() {
        let mut unique: Vec<(&Chunk, Uuid)> = Vec::with_capacity(batch.len());
        for chunk in batch {
            let key = chunk.sync_key();
            if seen.insert(key) {
                unique.push((chunk, key));
            } else {
                summary.num_skipped += 1;
            }
        }
        if unique.is_empty() {
            continue;
        }

        let keys: Vec<String> = unique.iter().map(|(_, key)| key.to_string()).collect();
        let exists = records.exists(namespace, &keys).await?;

        let mut pending: Vec<(&Chunk, Uuid)> = Vec::new();
        for ((chunk, key), exists) in unique.iter().zip(exists) {
            match (exists, options.force_update) {
                (true, false) => summary.num_skipped += 1,
                (true, true) => {
                    summary.num_updated += 1;
                    pending.push((*chunk, *key));
                }
                (false, _) => {
                    summary.num_added += 1;
                    pending.push((*chunk, *key));
                }
            }
        }

        tracing::debug!(
            batch = batch_no,
            chunks = unique.len(),
            embedding = pending.len(),
            "processing batch"
        );

        if !pending.is_empty() {
            let rows = embed_rows(embedder, namespace, &pending).await?;
            store.upsert(&rows).await?;
        }

        let now = records.get_time().await?;
        if now < run_start {
            return Err(IndexError::ClockSkew { now, run_start }.into());
        }

        let updates: Vec<RecordUpdate> = unique
            .iter()
            .map(|(chunk, key)| RecordUpdate {
                key: key.to_string(),
                group_id: chunk.source().map(str::to_string),
            })
            .collect();
        records.update_records(namespace, &updates, now).await?;

        if options.cleanup == CleanupMode::Source {
            let groups: Vec<String> = unique
                .iter()
                .filter_map(|(chunk, _)| chunk.source().map(str::to_string))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let stale = records
                .list_keys_older_than(namespace, run_start, Some(&groups))
                .await?;
            summary.num_deleted += delete_stale(records, store, namespace, &stale).await?;
        }
    }

    if options.cleanup == CleanupMode::Incremental {
        let stale = records
            .list_keys_older_than(namespace, run_start, None)
            .await?;
        for batch in stale.chunks(options.batch_size.max(1)) {
            summary.num_deleted += delete_stale(records, store, namespace, batch).await?;
        }
    }

    Ok(summary)
}

async fn embed_rows(
    embedder: &dyn Embedder,
    namespace: &str,
    pending: &[(&Chunk, Uuid)],
) -> Result<Vec<VectorRow>> {
    let texts: Vec<String> = pending.iter().map(|(c, _)| c.content.clone()).collect();
    let vectors = embedder.embed_documents(&texts).await?;

    if vectors.len() != texts.len() {
        return Err(IndexError::EmbeddingCountMismatch {
            expected: texts.len(),
            actual: vectors.len(),
        }
        .into());
    }

    pending
        .iter()
        .zip(vectors)
        .map(|((chunk, key), vector)| -> Result<VectorRow> {
            if vector.len() != embedder.dims() {
                return Err(IndexError::DimensionMismatch {
                    expected: embedder.dims(),
                    actual: vector.len(),
                }
                .into());
            }
            Ok(VectorRow {
                id: row_id(namespace, key),
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                vector,
            })
        })
        .collect()
}

/// Remove vector rows and then record entries for `keys`.
async fn delete_stale(
    records: &dyn RecordManager,
    store: &dyn VectorStore,
    namespace: &str,
    keys: &[String],
) -> Result<u64> {
    if keys.is_empty() {
        return Ok(0);
    }

    let ids = keys
        .iter()
        .map(|k| {
            Uuid::parse_str(k)
                .map(|key| row_id(namespace, &key))
                .with_context(|| format!("record key '{}' is not a sync key", k))
        })
        .collect::<Result<Vec<_>>>()?;

    store.delete_by_ids(&ids).await?;
    records.delete_keys(namespace, keys).await?;
    tracing::debug!(namespace, count = keys.len(), "deleted stale keys");

    Ok(keys.len() as u64)
}

/// Load, chunk and index every eligible file under `directory`.
pub async fn index_directory(
    config: &Config,
    directory: &Path,
    records: &dyn RecordManager,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    options: &IndexOptions,
) -> Result<IndexSummary> {
    let documents = load_documents(directory, &config.loader)?;
    tracing::info!(count = documents.len(), dir = %directory.display(), "loaded documents");

    let splitter = RecursiveSplitter::from_config(&config.chunking)?;
    let chunks = splitter.split_documents(&documents);
    tracing::info!(count = chunks.len(), "split into chunks");

    index_chunks(&chunks, records, store, embedder, options).await
}

/// Entry point of `codevec-index`: index `directory` into Postgres and print
/// the summary.
///
/// A missing directory is reported before any connection is opened.
pub async fn run_index(config: &Config, directory: &Path, namespace: &str) -> Result<IndexSummary> {
    if !directory.is_dir() {
        bail!("Directory not found: {}", directory.display());
    }

    let record_table = config.tables.record_table()?;
    let vector_table = config.tables.vector_table()?;
    let embedder = create_embedder(&config.embedding)?;
    let options = IndexOptions::from_config(namespace, &config.index);

    tracing::info!(
        namespace,
        model = embedder.model_name(),
        cleanup = ?options.cleanup,
        "indexing {}",
        directory.display()
    );

    let pool = db::connect(&config.db).await?;
    let records = PgRecordManager::new(pool.clone(), record_table.clone());
    let store = PgVectorStore::new(pool.clone(), vector_table.clone());

    let result: Result<IndexSummary> = async {
        schema::ensure_schema(&pool, &record_table, &vector_table, config.embedding.dims).await?;
        index_directory(config, directory, &records, &store, embedder.as_ref(), &options).await
    }
    .await;

    records.end().await;
    store.end().await;

    let summary = result?;
    println!("index {}", namespace);
    println!("  added: {}", summary.num_added);
    println!("  updated: {}", summary.num_updated);
    println!("  skipped: {}", summary.num_skipped);
    println!("  deleted: {}", summary.num_deleted);
    println!("ok");

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::records::memory::InMemoryRecordManager;
    use crate::store::memory::InMemoryVectorStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DIMS: usize = 32;

    fn chunk(content: &str, source: &str) -> Chunk {
        Chunk {
            content: content.to_string(),
            metadata: json!({ "source": source }),
        }
    }

    struct Harness {
        records: InMemoryRecordManager,
        store: InMemoryVectorStore,
        embedder: HashingEmbedder,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                records: InMemoryRecordManager::new(),
                store: InMemoryVectorStore::new(),
                embedder: HashingEmbedder::new(DIMS),
            }
        }

        async fn run(&self, chunks: &[Chunk], options: &IndexOptions) -> Result<IndexSummary> {
            index_chunks(chunks, &self.records, &self.store, &self.embedder, options).await
        }

        fn sources(&self) -> Vec<String> {
            let mut sources: Vec<String> = self
                .store
                .rows()
                .iter()
                .filter_map(|r| r.metadata["source"].as_str().map(str::to_string))
                .collect();
            sources.sort();
            sources
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk("alpha one", "a.md"),
            chunk("alpha two", "a.md"),
            chunk("beta", "b.ts"),
        ]
    }

    #[tokio::test]
    async fn test_first_run_adds_everything() {
        let h = Harness::new();
        let summary = h.run(&corpus(), &IndexOptions::new("ns")).await.unwrap();

        assert_eq!(
            summary,
            IndexSummary {
                num_added: 3,
                ..IndexSummary::default()
            }
        );
        assert_eq!(h.store.len(), 3);
        assert_eq!(h.records.list_keys("ns").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_second_run_skips_unchanged() {
        let h = Harness::new();
        let options = IndexOptions::new("ns");
        h.run(&corpus(), &options).await.unwrap();
        let summary = h.run(&corpus(), &options).await.unwrap();

        assert_eq!(summary.num_added, 0);
        assert_eq!(summary.num_skipped, 3);
        assert_eq!(summary.num_deleted, 0);
        assert_eq!(h.store.len(), 3);
    }

    #[tokio::test]
    async fn test_removed_source_is_deleted() {
        let h = Harness::new();
        let options = IndexOptions::new("ns");
        h.run(&corpus(), &options).await.unwrap();

        let without_a: Vec<Chunk> = corpus().into_iter().filter(|c| c.source() != Some("a.md")).collect();
        let summary = h.run(&without_a, &options).await.unwrap();

        assert_eq!(summary.num_deleted, 2);
        assert_eq!(summary.num_skipped, 1);
        assert_eq!(h.sources(), vec!["b.ts"]);
        assert_eq!(h.records.list_keys("ns").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_chunk_replaces_old_row() {
        let h = Harness::new();
        let options = IndexOptions::new("ns");
        h.run(&corpus(), &options).await.unwrap();

        let mut changed = corpus();
        changed[2] = chunk("beta revised", "b.ts");
        let summary = h.run(&changed, &options).await.unwrap();

        assert_eq!(summary.num_added, 1);
        assert_eq!(summary.num_skipped, 2);
        assert_eq!(summary.num_deleted, 1);
        let contents: Vec<String> = h.store.rows().into_iter().map(|r| r.content).collect();
        assert!(contents.contains(&"beta revised".to_string()));
        assert!(!contents.contains(&"beta".to_string()));
    }

    #[tokio::test]
    async fn test_duplicates_within_run_are_indexed_once() {
        let h = Harness::new();
        let chunks = vec![chunk("same", "a.md"), chunk("same", "a.md")];
        let summary = h.run(&chunks, &IndexOptions::new("ns")).await.unwrap();

        assert_eq!(summary.num_added, 1);
        assert_eq!(summary.num_skipped, 1);
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_run_clears_namespace_in_incremental_mode() {
        let h = Harness::new();
        let options = IndexOptions::new("ns");
        h.run(&corpus(), &options).await.unwrap();

        let summary = h.run(&[], &options).await.unwrap();
        assert_eq!(summary.num_deleted, 3);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_namespaces_do_not_delete_each_other() {
        let h = Harness::new();
        h.run(&corpus(), &IndexOptions::new("one")).await.unwrap();
        let summary = h
            .run(&[chunk("gamma", "c.md")], &IndexOptions::new("two"))
            .await
            .unwrap();

        assert_eq!(summary.num_deleted, 0);
        assert_eq!(h.records.list_keys("one").await.unwrap().len(), 3);
        assert_eq!(h.store.len(), 4);
    }

    #[tokio::test]
    async fn test_shared_chunk_survives_other_namespace_cleanup() {
        let h = Harness::new();
        let shared = vec![chunk("shared", "a.md")];
        h.run(&shared, &IndexOptions::new("one")).await.unwrap();
        h.run(&shared, &IndexOptions::new("two")).await.unwrap();
        assert_eq!(h.store.len(), 2);

        let cleared = h.run(&[], &IndexOptions::new("two")).await.unwrap();
        assert_eq!(cleared.num_deleted, 1);
        assert_eq!(h.store.len(), 1);

        let key = shared[0].sync_key();
        assert_eq!(h.store.rows()[0].id, row_id("one", &key));

        let rerun = h.run(&shared, &IndexOptions::new("one")).await.unwrap();
        assert_eq!(rerun.num_skipped, 1);
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn test_records_group_by_source() {
        let h = Harness::new();
        h.run(&corpus(), &IndexOptions::new("ns")).await.unwrap();

        for c in corpus() {
            let key = c.sync_key().to_string();
            assert_eq!(h.records.group_of("ns", &key).as_deref(), c.source());
        }
    }

    #[tokio::test]
    async fn test_source_cleanup_keeps_unseen_sources() {
        let h = Harness::new();
        let mut options = IndexOptions::new("ns");
        h.run(&corpus(), &options).await.unwrap();

        options.cleanup = CleanupMode::Source;
        let summary = h
            .run(&[chunk("alpha one", "a.md")], &options)
            .await
            .unwrap();

        // "alpha two" is stale within a.md; b.ts was not seen and survives.
        assert_eq!(summary.num_deleted, 1);
        assert_eq!(h.sources(), vec!["a.md", "b.ts"]);
    }

    #[tokio::test]
    async fn test_no_cleanup_never_deletes() {
        let h = Harness::new();
        let mut options = IndexOptions::new("ns");
        h.run(&corpus(), &options).await.unwrap();

        options.cleanup = CleanupMode::None;
        let summary = h.run(&[], &options).await.unwrap();
        assert_eq!(summary.num_deleted, 0);
        assert_eq!(h.store.len(), 3);
    }

    #[tokio::test]
    async fn test_force_update_reembeds_existing() {
        let h = Harness::new();
        let mut options = IndexOptions::new("ns");
        h.run(&corpus(), &options).await.unwrap();

        options.force_update = true;
        let summary = h.run(&corpus(), &options).await.unwrap();
        assert_eq!(summary.num_updated, 3);
        assert_eq!(summary.num_added, 0);
        assert_eq!(summary.num_skipped, 0);
        assert_eq!(h.store.len(), 3);
    }

    #[tokio::test]
    async fn test_small_batches_give_same_result() {
        let h = Harness::new();
        let mut options = IndexOptions::new("ns");
        options.batch_size = 1;
        let summary = h.run(&corpus(), &options).await.unwrap();
        assert_eq!(summary.num_added, 3);

        let summary = h.run(&corpus(), &options).await.unwrap();
        assert_eq!(summary.num_skipped, 3);
        assert_eq!(summary.num_deleted, 0);
    }

    #[tokio::test]
    async fn test_missing_source_is_rejected() {
        let h = Harness::new();
        let chunks = vec![
            chunk("ok", "a.md"),
            Chunk {
                content: "orphan".to_string(),
                metadata: json!({}),
            },
        ];
        let err = h.run(&chunks, &IndexOptions::new("ns")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::MissingSource { index: 1 })
        ));
        assert!(h.store.is_empty());
    }

    /// Record manager whose clock jumps backwards after the first reading.
    struct SkewedClock {
        inner: InMemoryRecordManager,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecordManager for SkewedClock {
        async fn get_time(&self) -> Result<f64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(if call == 0 { 100.0 } else { 50.0 })
        }

        async fn exists(&self, namespace: &str, keys: &[String]) -> Result<Vec<bool>> {
            self.inner.exists(namespace, keys).await
        }

        async fn update_records(
            &self,
            namespace: &str,
            records: &[RecordUpdate],
            timestamp: f64,
        ) -> Result<()> {
            self.inner.update_records(namespace, records, timestamp).await
        }

        async fn list_keys(&self, namespace: &str) -> Result<Vec<String>> {
            self.inner.list_keys(namespace).await
        }

        async fn list_keys_older_than(
            &self,
            namespace: &str,
            cutoff: f64,
            group_ids: Option<&[String]>,
        ) -> Result<Vec<String>> {
            self.inner
                .list_keys_older_than(namespace, cutoff, group_ids)
                .await
        }

        async fn delete_keys(&self, namespace: &str, keys: &[String]) -> Result<u64> {
            self.inner.delete_keys(namespace, keys).await
        }
    }

    #[tokio::test]
    async fn test_clock_going_backwards_aborts_before_recording() {
        let records = SkewedClock {
            inner: InMemoryRecordManager::new(),
            calls: AtomicUsize::new(0),
        };
        let store = InMemoryVectorStore::new();
        let embedder = HashingEmbedder::new(DIMS);

        let err = index_chunks(&corpus(), &records, &store, &embedder, &IndexOptions::new("ns"))
            .await
            .unwrap_err();

        match err.downcast_ref::<IndexError>() {
            Some(IndexError::ClockSkew { now, run_start }) => {
                assert_eq!(*now, 50.0);
                assert_eq!(*run_start, 100.0);
            }
            other => panic!("expected ClockSkew, got {:?}", other),
        }
        assert!(records.inner.list_keys("ns").await.unwrap().is_empty());
    }

    struct WrongWidth;

    #[async_trait]
    impl Embedder for WrongWidth {
        fn model_name(&self) -> &str {
            "wrong-width"
        }

        fn dims(&self) -> usize {
            DIMS
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; DIMS - 1]).collect())
        }
    }

    #[tokio::test]
    async fn test_dimension_mismatch_aborts_without_writes() {
        let records = InMemoryRecordManager::new();
        let store = InMemoryVectorStore::new();
        let err = index_chunks(&corpus(), &records, &store, &WrongWidth, &IndexOptions::new("ns"))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::DimensionMismatch {
                expected: DIMS,
                actual: 31
            })
        ));
        assert!(store.is_empty());
        assert!(records.list_keys("ns").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_index_rejects_missing_directory() {
        let config = Config::default();
        let err = run_index(&config, Path::new("/definitely/not/here"), DEFAULT_NAMESPACE)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Directory not found"));
    }
}
