//! SQLite-backed [`KnowledgeStore`].
//!
//! Embeddings are stored in the `knowledge_docs.embedding` column as vector
//! literals (`[v0,v1,...]`). Nearest-neighbour ranking decodes the stored
//! vectors and computes cosine distance in Rust.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{cosine_distance, parse_vector_literal, to_vector_literal};
use crate::models::KnowledgeChunk;

use super::{check_dims, rank, KnowledgeStore, ScoredChunk};

pub struct SqliteStore {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        Self { pool, dims }
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_docs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn content_hash(&self, source: &str, chunk_index: i64) -> Result<Option<String>> {
        let hash: Option<String> = sqlx::query_scalar(
            "SELECT content_hash FROM knowledge_docs WHERE source = ? AND chunk_index = ?",
        )
        .bind(source)
        .bind(chunk_index)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash)
    }

    async fn upsert_chunk(&self, chunk: &KnowledgeChunk) -> Result<()> {
        check_dims(self.dims, chunk)?;

        sqlx::query(
            r#"
            INSERT INTO knowledge_docs (title, content, source, chunk_index, content_hash, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source, chunk_index) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                content_hash = excluded.content_hash,
                embedding = excluded.embedding,
                created_at = excluded.created_at
            "#,
        )
        .bind(&chunk.title)
        .bind(&chunk.content)
        .bind(&chunk.source)
        .bind(chunk.chunk_index)
        .bind(&chunk.content_hash)
        .bind(to_vector_literal(&chunk.embedding))
        .bind(chunk.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn refresh_chunk(
        &self,
        source: &str,
        chunk_index: i64,
        title: &str,
        created_at: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE knowledge_docs SET title = ?, created_at = ? WHERE source = ? AND chunk_index = ?",
        )
        .bind(title)
        .bind(created_at)
        .bind(source)
        .bind(chunk_index)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn prune_source(&self, source: &str, keep: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM knowledge_docs WHERE source = ? AND chunk_index >= ?")
            .bind(source)
            .bind(keep)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            "SELECT title, content, source, chunk_index, embedding FROM knowledge_docs",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let source: String = row.get("source");
            let chunk_index: i64 = row.get("chunk_index");
            let literal: String = row.get("embedding");
            let vector = parse_vector_literal(&literal)
                .with_context(|| format!("corrupt embedding for {}#{}", source, chunk_index))?;

            scored.push(ScoredChunk {
                title: row.get("title"),
                content: row.get("content"),
                source,
                chunk_index,
                distance: cosine_distance(query, &vector),
            });
        }

        Ok(rank(scored, limit))
    }

    async fn chunk_indices(&self, source: &str) -> Result<Vec<i64>> {
        let indices: Vec<i64> = sqlx::query_scalar(
            "SELECT chunk_index FROM knowledge_docs WHERE source = ? ORDER BY chunk_index",
        )
        .bind(source)
        .fetch_all(&self.pool)
        .await?;
        Ok(indices)
    }
}
