//! Knowledge ingestion pipeline.
//!
//! Walks the knowledge directory, chunks every eligible document, embeds
//! each chunk and upserts it keyed by `(source, chunk_index)`. After a
//! document is written, any stored indices beyond its new chunk count are
//! deleted, so a document that shrank leaves no orphaned tail.
//!
//! Ingestion is idempotent: running it twice over unchanged input leaves the
//! same rows with refreshed timestamps. Chunks whose hash is unchanged are
//! refreshed in place without calling the embedding service. The hash covers
//! the embedding model and dimension as well as the text, so switching models
//! re-embeds everything.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunk::chunk_words;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::models::KnowledgeChunk;
use crate::store::KnowledgeStore;

/// Per-document ingestion outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentStats {
    pub chunks: usize,
    pub embedded: usize,
    pub reused: usize,
    pub pruned: u64,
}

pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn KnowledgeStore>,
    max_words: usize,
    overlap_words: usize,
    include: GlobSet,
}

impl Ingestor {
    pub fn new(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Result<Self> {
        Ok(Self {
            embedder,
            store,
            max_words: config.chunking.max_words,
            overlap_words: config.chunking.overlap_words,
            include: build_globset(&config.knowledge.include_globs)?,
        })
    }

    /// Ingest only when the store holds no rows at all. Returns chunks written.
    pub async fn ingest_if_empty(&self, dir: &Path) -> Result<usize> {
        let count = self.store.count().await?;
        if count > 0 {
            info!(rows = count, "knowledge store already populated, skipping ingestion");
            return Ok(0);
        }
        self.ingest(dir).await
    }

    /// Ingest every eligible document under `dir`. Returns chunks written.
    pub async fn ingest(&self, dir: &Path) -> Result<usize> {
        if !dir.exists() {
            warn!(dir = %dir.display(), "knowledge directory not found");
            return Ok(0);
        }

        let files = self.eligible_files(dir)?;
        if files.is_empty() {
            warn!(dir = %dir.display(), "no knowledge documents found");
            return Ok(0);
        }

        let mut total = 0usize;
        for (path, source) in &files {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let stats = self.ingest_document(path, source, raw.trim()).await?;
            info!(
                source = %source,
                chunks = stats.chunks,
                embedded = stats.embedded,
                reused = stats.reused,
                pruned = stats.pruned,
                "ingested document"
            );
            total += stats.chunks;
        }

        info!(chunks = total, documents = files.len(), "ingestion complete");
        Ok(total)
    }

    /// Write one document's chunks and prune its stale tail.
    pub async fn ingest_document(
        &self,
        path: &Path,
        source: &str,
        text: &str,
    ) -> Result<DocumentStats> {
        let title = extract_title(path, text);
        let chunks = chunk_words(text, self.max_words, self.overlap_words);
        let now = chrono::Utc::now().timestamp();
        let mut stats = DocumentStats {
            chunks: chunks.len(),
            ..Default::default()
        };

        for (idx, content) in chunks.into_iter().enumerate() {
            let chunk_index = idx as i64;
            let content_hash = self.chunk_hash(&content);

            if self.store.content_hash(source, chunk_index).await?.as_deref()
                == Some(content_hash.as_str())
            {
                self.store
                    .refresh_chunk(source, chunk_index, &title, now)
                    .await?;
                stats.reused += 1;
                continue;
            }

            let embedding = self
                .embedder
                .embed(&content)
                .await
                .with_context(|| format!("Failed to embed {}#{}", source, chunk_index))?;

            self.store
                .upsert_chunk(&KnowledgeChunk {
                    title: title.clone(),
                    content,
                    source: source.to_string(),
                    chunk_index,
                    content_hash,
                    embedding,
                    created_at: now,
                })
                .await?;
            stats.embedded += 1;
        }

        stats.pruned = self.store.prune_source(source, stats.chunks as i64).await?;
        Ok(stats)
    }

    /// Reuse key for a chunk: text plus the model and dimension that embed it.
    fn chunk_hash(&self, content: &str) -> String {
        hash_content(&format!(
            "{}\0{}\0{}",
            self.embedder.model_name(),
            self.embedder.dims(),
            content
        ))
    }

    /// Documentation files under `dir`, excluding readmes, sorted by source.
    fn eligible_files(&self, dir: &Path) -> Result<Vec<(PathBuf, String)>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(dir).unwrap_or(path);
            let source = relative.to_string_lossy().replace('\\', "/");

            if !self.include.is_match(&source) {
                continue;
            }
            if is_readme(path) {
                debug!(source = %source, "skipping readme");
                continue;
            }

            files.push((path.to_path_buf(), source));
        }

        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }
}

fn is_readme(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().eq_ignore_ascii_case("readme"))
        .unwrap_or(false)
}

/// First Markdown heading, else a title derived from the file name.
pub fn extract_title(path: &Path, text: &str) -> String {
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            let heading = trimmed.trim_start_matches('#').trim();
            if !heading.is_empty() {
                return heading.to_string();
            }
        }
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    title_case(&stem.replace(['_', '-'], " "))
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn hash_content(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_heading() {
        let text = "Intro line\n\n## Engine Overheating  \nBody";
        assert_eq!(
            extract_title(Path::new("engine.md"), text),
            "Engine Overheating"
        );
    }

    #[test]
    fn test_title_from_file_name() {
        let text = "No heading here.";
        assert_eq!(
            extract_title(Path::new("docs/ballast_pump-MANUAL.txt"), text),
            "Ballast Pump Manual"
        );
    }

    #[test]
    fn test_empty_heading_falls_back() {
        assert_eq!(extract_title(Path::new("fuel_log.md"), "#\ntext"), "Fuel Log");
    }

    #[test]
    fn test_readme_detection() {
        assert!(is_readme(Path::new("README.md")));
        assert!(is_readme(Path::new("sub/readme.txt")));
        assert!(!is_readme(Path::new("readme_notes.md")));
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_content("abc"), hash_content("abc"));
        assert_ne!(hash_content("abc"), hash_content("abd"));
    }
}
