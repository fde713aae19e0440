//! Analysis request boundary.
//!
//! One request runs the whole pipeline for a stored event:
//!
//! 1. Look up the event (the only step that can fail the request).
//! 2. Unless `force` is set, return the latest completed analysis if one exists.
//! 3. Retrieve documentation and fetch the tool catalog.
//! 4. Run the orchestrator.
//! 5. Parse confidence and suggested actions from the final text.
//! 6. Persist and return the record.
//!
//! From step 3 on every failure becomes an [`AnalysisRecord`] with
//! `status = failed`, so callers always get a structured result for an
//! existing event.

use anyhow::Result;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::agent::Orchestrator;
use crate::config::Config;
use crate::embedding::OllamaEmbedder;
use crate::events;
use crate::llm::create_chat_model;
use crate::models::{AnalysisRecord, AnalysisResult, AnalysisStatus};
use crate::parse::{parse_actions, parse_confidence};
use crate::retrieve::{format_context_for_prompt, ContextRetriever};
use crate::store::SqliteStore;
use crate::tools::{HttpToolGateway, ToolGateway};

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AnalyzeRequest {
    pub event_id: i64,
    /// Re-run even if a completed analysis already exists.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("Event {0} not found")]
    EventNotFound(i64),
    #[error("event lookup failed: {0:#}")]
    Storage(anyhow::Error),
}

pub struct Analyzer {
    pool: SqlitePool,
    retriever: ContextRetriever,
    gateway: Arc<dyn ToolGateway>,
    orchestrator: Orchestrator,
}

impl Analyzer {
    pub fn new(
        pool: SqlitePool,
        retriever: ContextRetriever,
        gateway: Arc<dyn ToolGateway>,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            pool,
            retriever,
            gateway,
            orchestrator,
        }
    }

    /// Wire up the HTTP-backed embedder, tool gateway and chat model.
    pub fn from_config(config: &Config, pool: SqlitePool) -> Result<Self> {
        let embedder = Arc::new(OllamaEmbedder::new(&config.embedding)?);
        let store = Arc::new(SqliteStore::new(pool.clone(), config.embedding.dims));
        let retriever = ContextRetriever::new(&config.retrieval, embedder, store);
        let gateway: Arc<dyn ToolGateway> = Arc::new(HttpToolGateway::new(&config.tools)?);
        let model = create_chat_model(&config.llm)?;
        let orchestrator = Orchestrator::new(model, gateway.clone(), config.llm.max_tool_calls);

        Ok(Self::new(pool, retriever, gateway, orchestrator))
    }

    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisRecord, AnalyzeError> {
        let event = events::get_event(&self.pool, request.event_id)
            .await
            .map_err(AnalyzeError::Storage)?
            .ok_or(AnalyzeError::EventNotFound(request.event_id))?;

        if !request.force {
            match events::latest_completed_analysis(&self.pool, event.id).await {
                Ok(Some(existing)) => {
                    info!(event_id = event.id, analysis_id = ?existing.id, "returning existing analysis");
                    return Ok(existing);
                }
                Ok(None) => {}
                Err(e) => warn!(event_id = event.id, error = %e, "could not check for existing analysis"),
            }
        }

        let documents = self
            .retriever
            .retrieve_context(&event.event_type, &event.sensor_name, &event.vessel_id)
            .await;
        let context = format_context_for_prompt(documents.as_deref());
        let tools = self.gateway.list_tools().await;

        let result = match self.orchestrator.run(&event, &context, &tools).await {
            Ok(text) => build_result(text, AnalysisStatus::Completed),
            Err(e) => {
                warn!(event_id = event.id, error = %e, "analysis failed");
                build_result(format!("Analysis failed: {:#}", e), AnalysisStatus::Failed)
            }
        };
        let model_used = self.orchestrator.model_name().to_string();

        match events::insert_analysis(&self.pool, event.id, &result, &model_used).await {
            Ok(id) => {
                info!(
                    event_id = event.id,
                    analysis_id = id,
                    status = result.status.as_str(),
                    confidence = result.confidence,
                    "analysis stored"
                );
                Ok(AnalysisRecord {
                    id: Some(id),
                    event_id: event.id,
                    model_used,
                    result,
                })
            }
            Err(e) => {
                error!(event_id = event.id, error = %e, "could not persist analysis");
                Ok(AnalysisRecord {
                    id: None,
                    event_id: event.id,
                    model_used,
                    result: build_result(
                        format!("Analysis failed: {:#}", e),
                        AnalysisStatus::Failed,
                    ),
                })
            }
        }
    }
}

/// Attach parsed confidence and actions to the final text.
pub fn build_result(analysis_text: String, status: AnalysisStatus) -> AnalysisResult {
    AnalysisResult {
        confidence: parse_confidence(&analysis_text),
        suggested_actions: parse_actions(&analysis_text),
        analysis_text,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_result_parses_text() {
        let result = build_result(
            "**CONFIDENCE:** 75%\n\n**SUGGESTED ACTIONS:**\n1. Inspect pump\n".to_string(),
            AnalysisStatus::Completed,
        );
        assert_eq!(result.confidence, 0.75);
        assert_eq!(result.suggested_actions, vec!["Inspect pump"]);
    }

    #[test]
    fn test_failure_text_uses_defaults() {
        let result = build_result(
            "Analysis failed: connection refused".to_string(),
            AnalysisStatus::Failed,
        );
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.suggested_actions, vec!["Investigate further"]);
        assert_eq!(result.status, AnalysisStatus::Failed);
    }

    #[test]
    fn test_request_force_defaults_false() {
        let req: AnalyzeRequest = serde_json::from_str(r#"{"event_id": 3}"#).unwrap();
        assert_eq!(req.event_id, 3);
        assert!(!req.force);
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(AnalyzeError::EventNotFound(42).to_string(), "Event 42 not found");
    }
}
