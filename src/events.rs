//! Relational store for anomaly events and their analyses.
//!
//! Events are written by the telemetry generator; this service reads them,
//! records operator acknowledgements, and appends one `ai_analyses` row per
//! analysis run. Timestamps are stored as Unix seconds.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{
    AnalysisRecord, AnalysisResult, AnalysisStatus, AnalysisSummary, Event,
};

/// Fields supplied when recording a new event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub timestamp: DateTime<Utc>,
    pub vessel_id: String,
    pub sensor_name: String,
    pub event_type: String,
    pub severity: String,
    pub details: Option<String>,
}

const EVENT_COLUMNS: &str = "id, timestamp, vessel_id, sensor_name, event_type, severity, \
                             details, acknowledged, acknowledged_by, acknowledged_at";

fn from_unix(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("timestamp out of range: {}", secs))
}

fn event_from_row(row: &SqliteRow) -> Result<Event> {
    let acknowledged_at: Option<i64> = row.get("acknowledged_at");
    Ok(Event {
        id: row.get("id"),
        timestamp: from_unix(row.get("timestamp"))?,
        vessel_id: row.get("vessel_id"),
        sensor_name: row.get("sensor_name"),
        event_type: row.get("event_type"),
        severity: row.get("severity"),
        details: row.get("details"),
        acknowledged: row.get::<i64, _>("acknowledged") != 0,
        acknowledged_by: row.get("acknowledged_by"),
        acknowledged_at: acknowledged_at.map(from_unix).transpose()?,
    })
}

pub async fn get_event(pool: &SqlitePool, event_id: i64) -> Result<Option<Event>> {
    let row = sqlx::query(&format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS))
        .bind(event_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(event_from_row).transpose()
}

pub async fn insert_event(pool: &SqlitePool, event: &NewEvent) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO events (timestamp, vessel_id, sensor_name, event_type, severity, details) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(event.timestamp.timestamp())
    .bind(&event.vessel_id)
    .bind(&event.sensor_name)
    .bind(&event.event_type)
    .bind(&event.severity)
    .bind(&event.details)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Most recent events first, optionally filtered by acknowledgement state.
pub async fn list_events(
    pool: &SqlitePool,
    limit: i64,
    acknowledged: Option<bool>,
) -> Result<Vec<Event>> {
    let rows = match acknowledged {
        Some(flag) => {
            sqlx::query(&format!(
                "SELECT {} FROM events WHERE acknowledged = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
                EVENT_COLUMNS
            ))
            .bind(flag as i64)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT {} FROM events ORDER BY timestamp DESC, id DESC LIMIT ?",
                EVENT_COLUMNS
            ))
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    rows.iter().map(event_from_row).collect()
}

/// Mark an event acknowledged. Returns `false` if the event does not exist
/// or was already acknowledged.
pub async fn acknowledge_event(pool: &SqlitePool, event_id: i64, operator: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE events SET acknowledged = 1, acknowledged_by = ?, acknowledged_at = ? \
         WHERE id = ? AND acknowledged = 0",
    )
    .bind(operator)
    .bind(Utc::now().timestamp())
    .bind(event_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Append an analysis row and return its id.
pub async fn insert_analysis(
    pool: &SqlitePool,
    event_id: i64,
    result: &AnalysisResult,
    model_used: &str,
) -> Result<i64> {
    let actions = serde_json::to_string(&result.suggested_actions)?;

    let inserted = sqlx::query(
        "INSERT INTO ai_analyses \
         (timestamp, event_id, analysis_text, suggested_actions, confidence, model_used, status) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Utc::now().timestamp())
    .bind(event_id)
    .bind(&result.analysis_text)
    .bind(actions)
    .bind(result.confidence)
    .bind(model_used)
    .bind(result.status.as_str())
    .execute(pool)
    .await
    .with_context(|| format!("Failed to store analysis for event {}", event_id))?;

    Ok(inserted.last_insert_rowid())
}

fn parse_actions_column(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).with_context(|| format!("corrupt suggested_actions: {}", raw))
}

fn parse_status_column(raw: &str) -> Result<AnalysisStatus> {
    AnalysisStatus::parse(raw).ok_or_else(|| anyhow!("unknown analysis status: {}", raw))
}

/// The newest completed analysis for an event, if any.
pub async fn latest_completed_analysis(
    pool: &SqlitePool,
    event_id: i64,
) -> Result<Option<AnalysisRecord>> {
    let row = sqlx::query(
        "SELECT id, event_id, analysis_text, suggested_actions, confidence, model_used, status \
         FROM ai_analyses WHERE event_id = ? AND status = ? \
         ORDER BY timestamp DESC, id DESC LIMIT 1",
    )
    .bind(event_id)
    .bind(AnalysisStatus::Completed.as_str())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let actions: String = row.get("suggested_actions");
    let status: String = row.get("status");
    Ok(Some(AnalysisRecord {
        id: Some(row.get("id")),
        event_id: row.get("event_id"),
        model_used: row.get("model_used"),
        result: AnalysisResult {
            analysis_text: row.get("analysis_text"),
            suggested_actions: parse_actions_column(&actions)?,
            confidence: row.get("confidence"),
            status: parse_status_column(&status)?,
        },
    }))
}

/// Most recent analyses first, joined with their events.
pub async fn recent_analyses(pool: &SqlitePool, limit: i64) -> Result<Vec<AnalysisSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT a.id, a.timestamp, a.event_id,
               e.vessel_id, e.event_type, e.sensor_name,
               a.analysis_text, a.suggested_actions,
               a.confidence, a.model_used, a.status
        FROM ai_analyses a
        JOIN events e ON a.event_id = e.id
        ORDER BY a.timestamp DESC, a.id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut summaries = Vec::with_capacity(rows.len());
    for row in &rows {
        let actions: String = row.get("suggested_actions");
        let status: String = row.get("status");
        summaries.push(AnalysisSummary {
            id: row.get("id"),
            timestamp: from_unix(row.get("timestamp"))?,
            event_id: row.get("event_id"),
            vessel_id: row.get("vessel_id"),
            event_type: row.get("event_type"),
            sensor_name: row.get("sensor_name"),
            analysis_text: row.get("analysis_text"),
            suggested_actions: parse_actions_column(&actions)?,
            confidence: row.get("confidence"),
            model_used: row.get("model_used"),
            status: parse_status_column(&status)?,
        });
    }

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn sample_event(vessel: &str, secs: i64) -> NewEvent {
        NewEvent {
            timestamp: DateTime::from_timestamp(secs, 0).unwrap(),
            vessel_id: vessel.to_string(),
            sensor_name: "engine_temp".to_string(),
            event_type: "HIGH_TEMPERATURE".to_string(),
            severity: "critical".to_string(),
            details: Some("engine_temp=104.2 exceeds 95.0".to_string()),
        }
    }

    fn result(text: &str, status: AnalysisStatus) -> AnalysisResult {
        AnalysisResult {
            analysis_text: text.to_string(),
            suggested_actions: vec!["Inspect pump".to_string()],
            confidence: 0.7,
            status,
        }
    }

    #[tokio::test]
    async fn test_event_roundtrip_and_missing() {
        let pool = memory_pool().await;
        let id = insert_event(&pool, &sample_event("vessel_001", 1_700_000_000))
            .await
            .unwrap();

        let event = get_event(&pool, id).await.unwrap().unwrap();
        assert_eq!(event.vessel_id, "vessel_001");
        assert_eq!(event.timestamp.timestamp(), 1_700_000_000);
        assert!(!event.acknowledged);

        assert!(get_event(&pool, id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acknowledge_once() {
        let pool = memory_pool().await;
        let id = insert_event(&pool, &sample_event("vessel_001", 1_700_000_000))
            .await
            .unwrap();

        assert!(acknowledge_event(&pool, id, "bridge").await.unwrap());
        assert!(!acknowledge_event(&pool, id, "bridge").await.unwrap());
        assert!(!acknowledge_event(&pool, id + 1, "bridge").await.unwrap());

        let event = get_event(&pool, id).await.unwrap().unwrap();
        assert!(event.acknowledged);
        assert_eq!(event.acknowledged_by.as_deref(), Some("bridge"));
        assert!(event.acknowledged_at.is_some());
    }

    #[tokio::test]
    async fn test_list_events_filter_and_order() {
        let pool = memory_pool().await;
        let old = insert_event(&pool, &sample_event("vessel_001", 1_700_000_000))
            .await
            .unwrap();
        let new = insert_event(&pool, &sample_event("vessel_002", 1_700_000_600))
            .await
            .unwrap();
        acknowledge_event(&pool, old, "bridge").await.unwrap();

        let all = list_events(&pool, 10, None).await.unwrap();
        assert_eq!(all.iter().map(|e| e.id).collect::<Vec<_>>(), vec![new, old]);

        let open = list_events(&pool, 10, Some(false)).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, new);
    }

    #[tokio::test]
    async fn test_latest_completed_skips_failed() {
        let pool = memory_pool().await;
        let event_id = insert_event(&pool, &sample_event("vessel_001", 1_700_000_000))
            .await
            .unwrap();

        assert!(latest_completed_analysis(&pool, event_id).await.unwrap().is_none());

        insert_analysis(&pool, event_id, &result("first", AnalysisStatus::Completed), "llama3.2")
            .await
            .unwrap();
        let second = insert_analysis(
            &pool,
            event_id,
            &result("second", AnalysisStatus::Completed),
            "llama3.2",
        )
        .await
        .unwrap();
        insert_analysis(
            &pool,
            event_id,
            &result("Analysis failed: timeout", AnalysisStatus::Failed),
            "llama3.2",
        )
        .await
        .unwrap();

        let latest = latest_completed_analysis(&pool, event_id).await.unwrap().unwrap();
        assert_eq!(latest.id, Some(second));
        assert_eq!(latest.result.analysis_text, "second");
        assert_eq!(latest.result.suggested_actions, vec!["Inspect pump"]);
    }

    #[tokio::test]
    async fn test_recent_analyses_joined_and_limited() {
        let pool = memory_pool().await;
        let event_id = insert_event(&pool, &sample_event("vessel_003", 1_700_000_000))
            .await
            .unwrap();
        for text in ["a", "b", "c"] {
            insert_analysis(&pool, event_id, &result(text, AnalysisStatus::Completed), "stub")
                .await
                .unwrap();
        }

        let recent = recent_analyses(&pool, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].analysis_text, "c");
        assert_eq!(recent[0].vessel_id, "vessel_003");
        assert_eq!(recent[0].event_type, "HIGH_TEMPERATURE");
        assert_eq!(recent[0].status, AnalysisStatus::Completed);
    }
}
