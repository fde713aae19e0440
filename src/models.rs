//! Core data models used throughout the agent service.
//!
//! Knowledge chunks flow from the ingestor into the vector store, retrieved
//! documents flow from the store into prompts, and analysis records are the
//! terminal output of one analysis request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One embedded slice of a knowledge document.
///
/// Identified by `(source, chunk_index)`. For a given source the indices
/// are contiguous from 0.
#[derive(Debug, Clone)]
pub struct KnowledgeChunk {
    pub title: String,
    pub content: String,
    /// Path of the document relative to the knowledge directory, `/`-separated.
    pub source: String,
    pub chunk_index: i64,
    /// SHA-256 of `content`, used to skip re-embedding unchanged chunks.
    pub content_hash: String,
    pub embedding: Vec<f32>,
    /// Unix seconds of the last write.
    pub created_at: i64,
}

/// A stored chunk matched against a query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub title: String,
    pub content: String,
    pub source: String,
    pub similarity: f64,
}

/// An anomaly event produced by the telemetry generator.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub vessel_id: String,
    pub sensor_name: String,
    pub event_type: String,
    pub severity: String,
    pub details: Option<String>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(AnalysisStatus::Completed),
            "failed" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }
}

/// Terminal output of one orchestration. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub analysis_text: String,
    pub suggested_actions: Vec<String>,
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
    pub status: AnalysisStatus,
}

/// An analysis as returned to callers of the analyze endpoint.
///
/// `id` is `None` only when the record could not be persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRecord {
    pub id: Option<i64>,
    pub event_id: i64,
    pub model_used: String,
    #[serde(flatten)]
    pub result: AnalysisResult,
}

/// Row of the recent-analyses listing, joined with its event.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_id: i64,
    pub vessel_id: String,
    pub event_type: String,
    pub sensor_name: String,
    pub analysis_text: String,
    pub suggested_actions: Vec<String>,
    pub confidence: f64,
    pub model_used: String,
    pub status: AnalysisStatus,
}
