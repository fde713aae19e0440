//! Embedding provider abstraction and the Ollama-backed implementation.
//!
//! Defines the [`Embedder`] trait and [`OllamaEmbedder`], which talks to a
//! model-serving endpoint that may expose either of two request shapes:
//!
//! | Shape | Endpoint | Request | Response |
//! |-------|----------|---------|----------|
//! | current | `POST /api/embed` | `{model, input}` | `{embeddings: [[...]]}` |
//! | legacy | `POST /api/embeddings` | `{model, prompt}` | `{embedding: [...]}` |
//!
//! The current shape is tried first; the legacy shape is tried only when the
//! current one does not yield a vector.
//!
//! Also provides vector utilities:
//! - [`to_vector_literal`] / [`parse_vector_literal`] — the `[v0,v1,...]` text
//!   encoding stored in the `embedding` column
//! - [`cosine_similarity`] / [`cosine_distance`]

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;

/// Decimal places used when serialising a vector literal.
pub const VECTOR_LITERAL_PRECISION: usize = 8;

/// Converts text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;
    /// Returns the expected vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embedder backed by an Ollama-compatible HTTP service.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
        })
    }

    async fn embed_current(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&json!({ "model": self.model, "input": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("/api/embed returned {}: {}", status, body.trim());
        }

        let json: Value = response.json().await?;
        parse_embed_response(&json)
    }

    async fn embed_legacy(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.url))
            .json(&json!({ "model": self.model, "prompt": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("/api/embeddings returned {}: {}", status, body.trim());
        }

        let json: Value = response.json().await?;
        parse_legacy_response(&json)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let current_err = match self.embed_current(text).await {
            Ok(vector) => return Ok(vector),
            Err(e) => e,
        };
        debug!(error = %current_err, "current embed shape failed, trying legacy shape");

        self.embed_legacy(text).await.map_err(|legacy_err| {
            anyhow!(
                "embedding service at {} returned no vector (current: {}; legacy: {})",
                self.url,
                current_err,
                legacy_err
            )
        })
    }
}

/// Parse `{embeddings: [[...]]}`, returning the first vector.
fn parse_embed_response(json: &Value) -> Result<Vec<f32>> {
    let first = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|list| list.first())
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("response has no embeddings[0] array"))?;

    to_floats(first)
}

/// Parse `{embedding: [...]}`.
fn parse_legacy_response(json: &Value) -> Result<Vec<f32>> {
    let vector = json
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("response has no embedding array"))?;

    to_floats(vector)
}

fn to_floats(values: &[Value]) -> Result<Vec<f32>> {
    if values.is_empty() {
        bail!("embedding vector is empty");
    }
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("embedding contains a non-numeric value: {}", v))
        })
        .collect()
}

/// Encode a vector as `[v0,v1,...]` with fixed decimal precision.
///
/// ```rust
/// use maritime_agent::embedding::to_vector_literal;
///
/// assert_eq!(to_vector_literal(&[1.0, -0.5]), "[1.00000000,-0.50000000]");
/// ```
pub fn to_vector_literal(values: &[f32]) -> String {
    let parts: Vec<String> = values
        .iter()
        .map(|v| format!("{:.*}", VECTOR_LITERAL_PRECISION, v))
        .collect();
    format!("[{}]", parts.join(","))
}

/// Decode a vector literal produced by [`to_vector_literal`].
pub fn parse_vector_literal(literal: &str) -> Result<Vec<f32>> {
    let inner = literal
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| anyhow!("vector literal must be enclosed in brackets"))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .with_context(|| format!("invalid vector component: {:?}", part))
        })
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance, `1 - cosine_similarity`. Lower is more relevant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b) as f64
}
