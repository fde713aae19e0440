//! Context retrieval for event analysis.
//!
//! Embeds a query built from the event's identifying fields, ranks stored
//! chunks by cosine distance, drops matches below the similarity floor and
//! keeps at most `top_k`.
//!
//! Retrieval never fails an analysis. Embedding or store failures are logged
//! and surface as "no context", which the prompt renders as nothing at all.
//! A successful search with no matches is different: it renders as an
//! explicit "no relevant documentation" marker.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::models::RetrievedDocument;
use crate::store::KnowledgeStore;

/// Marker rendered when retrieval succeeded but nothing cleared the floor.
pub const NO_DOCUMENTATION: &str = "No relevant documentation found.";

pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn KnowledgeStore>,
    top_k: usize,
    min_similarity: f64,
}

impl ContextRetriever {
    pub fn new(
        config: &RetrievalConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self {
            embedder,
            store,
            top_k: config.top_k,
            min_similarity: config.min_similarity,
        }
    }

    /// Documents relevant to an event, best first. Empty on any failure.
    pub async fn retrieve(
        &self,
        event_type: &str,
        sensor_name: &str,
        vessel_id: &str,
    ) -> Vec<RetrievedDocument> {
        self.retrieve_context(event_type, sensor_name, vessel_id)
            .await
            .unwrap_or_default()
    }

    /// Like [`retrieve`](Self::retrieve), but `None` when retrieval failed,
    /// so callers can tell "nothing relevant" from "could not look".
    pub async fn retrieve_context(
        &self,
        event_type: &str,
        sensor_name: &str,
        vessel_id: &str,
    ) -> Option<Vec<RetrievedDocument>> {
        let query = build_query(event_type, sensor_name, vessel_id);
        match self.search(&query).await {
            Ok(docs) => {
                debug!(query = %query, hits = docs.len(), "retrieved context");
                Some(docs)
            }
            Err(e) => {
                warn!(query = %query, error = %e, "context retrieval failed, continuing without documentation");
                None
            }
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        let query_vec = self.embedder.embed(query).await?;
        let rows = self.store.nearest(&query_vec, self.top_k).await?;

        Ok(rows
            .into_iter()
            .map(|row| RetrievedDocument {
                title: row.title,
                content: row.content,
                source: row.source,
                similarity: 1.0 - row.distance,
            })
            .filter(|doc| doc.similarity >= self.min_similarity)
            .take(self.top_k)
            .collect())
    }
}

pub fn build_query(event_type: &str, sensor_name: &str, vessel_id: &str) -> String {
    format!("{} {} {}", event_type, sensor_name, vessel_id)
}

/// Render retrieved documents as a plain-text block for the system prompt.
///
/// `None` (retrieval failed) renders as an empty string; an empty list
/// renders as [`NO_DOCUMENTATION`].
pub fn format_context_for_prompt(documents: Option<&[RetrievedDocument]>) -> String {
    match documents {
        None => String::new(),
        Some([]) => NO_DOCUMENTATION.to_string(),
        Some(docs) => docs
            .iter()
            .map(|doc| {
                format!(
                    "--- {}  (source: {}, similarity: {:.2}) ---\n{}",
                    doc.title, doc.source, doc.similarity, doc.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}
