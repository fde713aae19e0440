//! Storage abstraction for embedded knowledge chunks.
//!
//! The [`KnowledgeStore`] trait covers everything the ingestor and the
//! context retriever need from the vector-indexed store, so both can run
//! against SQLite in production and an in-memory map in tests.
//!
//! Rows are keyed by `(source, chunk_index)`. Writes are single-statement
//! upserts; the store's own conflict resolution is the only coordination
//! between concurrent writers.

pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::KnowledgeChunk;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// A stored chunk paired with its cosine distance to a query vector.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub title: String,
    pub content: String,
    pub source: String,
    pub chunk_index: i64,
    /// `1 - cosine_similarity`; lower is more relevant.
    pub distance: f64,
}

/// Abstract vector-indexed store for knowledge chunks.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`count`](KnowledgeStore::count) | Total stored rows |
/// | [`content_hash`](KnowledgeStore::content_hash) | Stored hash for one key |
/// | [`upsert_chunk`](KnowledgeStore::upsert_chunk) | Insert or overwrite one chunk |
/// | [`refresh_chunk`](KnowledgeStore::refresh_chunk) | Update title and timestamp without re-embedding |
/// | [`prune_source`](KnowledgeStore::prune_source) | Delete indices `>= keep` for a source |
/// | [`nearest`](KnowledgeStore::nearest) | Chunks by ascending cosine distance |
/// | [`chunk_indices`](KnowledgeStore::chunk_indices) | Stored indices for a source |
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn count(&self) -> Result<i64>;

    async fn content_hash(&self, source: &str, chunk_index: i64) -> Result<Option<String>>;

    /// Insert or overwrite the row keyed by `(source, chunk_index)`.
    ///
    /// Rejects embeddings whose length differs from the store's dimension.
    async fn upsert_chunk(&self, chunk: &KnowledgeChunk) -> Result<()>;

    /// Overwrite title and `created_at` of an existing row. No-op if absent.
    async fn refresh_chunk(
        &self,
        source: &str,
        chunk_index: i64,
        title: &str,
        created_at: i64,
    ) -> Result<()>;

    /// Delete rows of `source` whose index is `>= keep`. Returns rows removed.
    async fn prune_source(&self, source: &str, keep: i64) -> Result<u64>;

    /// Up to `limit` chunks ordered by ascending cosine distance to `query`.
    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>>;

    /// Stored chunk indices for `source`, ascending.
    async fn chunk_indices(&self, source: &str) -> Result<Vec<i64>>;
}

pub(crate) fn check_dims(expected: usize, chunk: &KnowledgeChunk) -> Result<()> {
    if chunk.embedding.len() != expected {
        bail!(
            "embedding for {}#{} has {} dimensions, store expects {}",
            chunk.source,
            chunk.chunk_index,
            chunk.embedding.len(),
            expected
        );
    }
    Ok(())
}

/// Sort by distance, breaking ties by key so results are deterministic.
pub(crate) fn rank(mut scored: Vec<ScoredChunk>, limit: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source.cmp(&b.source))
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
    scored.truncate(limit);
    scored
}
