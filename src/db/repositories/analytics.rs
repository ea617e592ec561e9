//! Analytics event repository
//!
//! Append-only: there is no update or delete.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{AnalyticsEvent, EventType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Analytics repository trait
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Append an event
    async fn record(&self, event: &AnalyticsEvent) -> Result<AnalyticsEvent>;

    /// Most recent events first, optionally of one type
    async fn list(&self, event_type: Option<EventType>, limit: i64) -> Result<Vec<AnalyticsEvent>>;

    /// Number of events of a type recorded against a model
    async fn count_for_model(&self, model_id: i64, event_type: EventType) -> Result<i64>;
}

/// SQLx-based analytics repository implementation
pub struct SqlxAnalyticsRepository {
    pool: DynDatabasePool,
}

impl SqlxAnalyticsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AnalyticsRepository> {
        Arc::new(Self::new(pool))
    }
}

const INSERT_EVENT: &str =
    "INSERT INTO analytics (event_type, model_id, user_id, metadata, created_at) VALUES (?, ?, ?, ?, ?)";

const COUNT_FOR_MODEL: &str =
    "SELECT COUNT(*) AS count FROM analytics WHERE model_id = ? AND event_type = ?";

#[async_trait]
impl AnalyticsRepository for SqlxAnalyticsRepository {
    async fn record(&self, event: &AnalyticsEvent) -> Result<AnalyticsEvent> {
        let metadata =
            serde_json::to_string(&event.metadata).context("Failed to encode event metadata")?;

        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(INSERT_EVENT)
                .bind(event.event_type.to_string())
                .bind(event.model_id)
                .bind(event.user_id)
                .bind(&metadata)
                .bind(event.created_at)
                .execute(pool)
                .await
                .context("Failed to record analytics event")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(INSERT_EVENT)
                .bind(event.event_type.to_string())
                .bind(event.model_id)
                .bind(event.user_id)
                .bind(&metadata)
                .bind(event.created_at)
                .execute(pool)
                .await
                .context("Failed to record analytics event")?
                .last_insert_id() as i64,
        };

        Ok(AnalyticsEvent {
            id,
            ..event.clone()
        })
    }

    async fn list(&self, event_type: Option<EventType>, limit: i64) -> Result<Vec<AnalyticsEvent>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_events_sqlite(pool, event_type, limit).await,
            Backend::Mysql(pool) => list_events_mysql(pool, event_type, limit).await,
        }
    }

    async fn count_for_model(&self, model_id: i64, event_type: EventType) -> Result<i64> {
        let row = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(COUNT_FOR_MODEL)
                .bind(model_id)
                .bind(event_type.to_string())
                .fetch_one(pool)
                .await
                .map(|row| row.get::<i64, _>("count")),
            Backend::Mysql(pool) => sqlx::query(COUNT_FOR_MODEL)
                .bind(model_id)
                .bind(event_type.to_string())
                .fetch_one(pool)
                .await
                .map(|row| row.get::<i64, _>("count")),
        };
        row.context("Failed to count analytics events")
    }
}

fn list_sql(filtered: bool) -> String {
    format!(
        "SELECT id, event_type, model_id, user_id, metadata, created_at FROM analytics {} ORDER BY created_at DESC, id DESC LIMIT ?",
        if filtered { "WHERE event_type = ?" } else { "" }
    )
}

fn decode_event(
    id: i64,
    event_type: &str,
    model_id: i64,
    user_id: i64,
    metadata: &str,
    created_at: chrono::DateTime<chrono::Utc>,
) -> Result<AnalyticsEvent> {
    Ok(AnalyticsEvent {
        id,
        event_type: EventType::from_str(event_type)?,
        model_id,
        user_id,
        metadata: serde_json::from_str(metadata)
            .with_context(|| format!("Invalid metadata on analytics event {}", id))?,
        created_at,
    })
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_events_sqlite(
    pool: &SqlitePool,
    event_type: Option<EventType>,
    limit: i64,
) -> Result<Vec<AnalyticsEvent>> {
    let sql = list_sql(event_type.is_some());
    let mut query = sqlx::query(&sql);
    if let Some(event_type) = event_type {
        query = query.bind(event_type.to_string());
    }
    let rows = query
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list analytics events")?;

    rows.iter()
        .map(|row| {
            decode_event(
                row.get("id"),
                row.get::<&str, _>("event_type"),
                row.get("model_id"),
                row.get("user_id"),
                row.get::<&str, _>("metadata"),
                row.get("created_at"),
            )
        })
        .collect()
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_events_mysql(
    pool: &MySqlPool,
    event_type: Option<EventType>,
    limit: i64,
) -> Result<Vec<AnalyticsEvent>> {
    let sql = list_sql(event_type.is_some());
    let mut query = sqlx::query(&sql);
    if let Some(event_type) = event_type {
        query = query.bind(event_type.to_string());
    }
    let rows = query
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list analytics events")?;

    rows.iter()
        .map(|row| {
            decode_event(
                row.get("id"),
                row.get::<&str, _>("event_type"),
                row.get("model_id"),
                row.get("user_id"),
                row.get::<&str, _>("metadata"),
                row.get("created_at"),
            )
        })
        .collect()
}
