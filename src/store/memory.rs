//! In-memory [`KnowledgeStore`] for tests and one-off runs.
//!
//! Rows live in a `BTreeMap` keyed by `(source, chunk_index)` behind a
//! `std::sync::RwLock`. Vector search is brute-force cosine distance.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::KnowledgeChunk;

use super::{check_dims, rank, KnowledgeStore, ScoredChunk};

type Key = (String, i64);

pub struct InMemoryStore {
    rows: RwLock<BTreeMap<Key, KnowledgeChunk>>,
    dims: usize,
}

impl InMemoryStore {
    pub fn new(dims: usize) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            dims,
        }
    }

    /// Snapshot of one stored row.
    pub fn get(&self, source: &str, chunk_index: i64) -> Option<KnowledgeChunk> {
        self.rows
            .read()
            .ok()?
            .get(&(source.to_string(), chunk_index))
            .cloned()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory knowledge store lock poisoned")
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn count(&self) -> Result<i64> {
        Ok(self.rows.read().map_err(poisoned)?.len() as i64)
    }

    async fn content_hash(&self, source: &str, chunk_index: i64) -> Result<Option<String>> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows
            .get(&(source.to_string(), chunk_index))
            .map(|c| c.content_hash.clone()))
    }

    async fn upsert_chunk(&self, chunk: &KnowledgeChunk) -> Result<()> {
        check_dims(self.dims, chunk)?;
        let mut rows = self.rows.write().map_err(poisoned)?;
        rows.insert((chunk.source.clone(), chunk.chunk_index), chunk.clone());
        Ok(())
    }

    async fn refresh_chunk(
        &self,
        source: &str,
        chunk_index: i64,
        title: &str,
        created_at: i64,
    ) -> Result<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        if let Some(row) = rows.get_mut(&(source.to_string(), chunk_index)) {
            row.title = title.to_string();
            row.created_at = created_at;
        }
        Ok(())
    }

    async fn prune_source(&self, source: &str, keep: i64) -> Result<u64> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        let before = rows.len();
        rows.retain(|(s, idx), _| !(s == source && *idx >= keep));
        Ok((before - rows.len()) as u64)
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let rows = self.rows.read().map_err(poisoned)?;
        let scored = rows
            .values()
            .map(|c| ScoredChunk {
                title: c.title.clone(),
                content: c.content.clone(),
                source: c.source.clone(),
                chunk_index: c.chunk_index,
                distance: cosine_distance(query, &c.embedding),
            })
            .collect();
        Ok(rank(scored, limit))
    }

    async fn chunk_indices(&self, source: &str) -> Result<Vec<i64>> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows
            .keys()
            .filter(|(s, _)| s == source)
            .map(|(_, idx)| *idx)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, idx: i64, embedding: Vec<f32>) -> KnowledgeChunk {
        KnowledgeChunk {
            title: "Title".to_string(),
            content: format!("{} chunk {}", source, idx),
            source: source.to_string(),
            chunk_index: idx,
            content_hash: format!("h{}", idx),
            embedding,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_key() {
        let store = InMemoryStore::new(2);
        store.upsert_chunk(&chunk("a.md", 0, vec![1.0, 0.0])).await.unwrap();
        let mut updated = chunk("a.md", 0, vec![0.0, 1.0]);
        updated.content = "new".to_string();
        store.upsert_chunk(&updated).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get("a.md", 0).unwrap().content, "new");
    }

    #[tokio::test]
    async fn test_rejects_wrong_dimension() {
        let store = InMemoryStore::new(3);
        let err = store
            .upsert_chunk(&chunk("a.md", 0, vec![1.0, 0.0]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("store expects 3"));
    }

    #[tokio::test]
    async fn test_prune_only_touches_one_source() {
        let store = InMemoryStore::new(2);
        for idx in 0..3 {
            store.upsert_chunk(&chunk("a.md", idx, vec![1.0, 0.0])).await.unwrap();
            store.upsert_chunk(&chunk("b.md", idx, vec![1.0, 0.0])).await.unwrap();
        }
        let removed = store.prune_source("a.md", 1).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.chunk_indices("a.md").await.unwrap(), vec![0]);
        assert_eq!(store.chunk_indices("b.md").await.unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_nearest_orders_by_distance() {
        let store = InMemoryStore::new(2);
        store.upsert_chunk(&chunk("far.md", 0, vec![0.0, 1.0])).await.unwrap();
        store.upsert_chunk(&chunk("near.md", 0, vec![1.0, 0.1])).await.unwrap();
        store.upsert_chunk(&chunk("mid.md", 0, vec![1.0, 1.0])).await.unwrap();

        let hits = store.nearest(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "near.md");
        assert_eq!(hits[1].source, "mid.md");
        assert!(hits[0].distance <= hits[1].distance);
    }
}
