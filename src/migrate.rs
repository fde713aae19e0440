use anyhow::Result;
use sqlx::SqlitePool;

/// Create every table and index the service uses. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Knowledge chunks, one row per (source, chunk_index)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_docs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL DEFAULT 0,
            content_hash TEXT NOT NULL,
            embedding TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_knowledge_docs_source_chunk ON knowledge_docs(source, chunk_index)",
    )
    .execute(pool)
    .await?;

    // Anomaly events, written by the telemetry generator
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            vessel_id TEXT NOT NULL,
            sensor_name TEXT NOT NULL,
            event_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            details TEXT,
            acknowledged INTEGER NOT NULL DEFAULT 0,
            acknowledged_by TEXT,
            acknowledged_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_analyses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            event_id INTEGER NOT NULL,
            analysis_text TEXT NOT NULL,
            suggested_actions TEXT NOT NULL DEFAULT '[]',
            confidence REAL NOT NULL DEFAULT 0,
            model_used TEXT NOT NULL,
            status TEXT NOT NULL,
            FOREIGN KEY (event_id) REFERENCES events(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ai_analyses_event_id ON ai_analyses(event_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ai_analyses_timestamp ON ai_analyses(timestamp DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
