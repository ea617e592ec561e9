//! Model listing repository
//!
//! - `ModelRepository` trait defining the interface for listing data access
//! - `SqlxModelRepository` implementing the trait for SQLite and MySQL
//!
//! Reads join the creator's username so the catalog can show it.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{CreateModelInput, Model, ModelStatus, ModelWithCreator, ModerationInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Model repository trait
#[async_trait]
pub trait ModelRepository: Send + Sync {
    /// Insert a new listing
    async fn create(&self, input: &CreateModelInput) -> Result<Model>;

    /// Get a listing with its creator name
    async fn get_by_id(&self, id: i64) -> Result<Option<ModelWithCreator>>;

    /// List listings newest first, optionally restricted to one status
    async fn list(&self, status: Option<ModelStatus>) -> Result<Vec<ModelWithCreator>>;

    /// Apply a moderation decision; `None` when the listing does not exist
    async fn moderate(&self, id: i64, input: &ModerationInput) -> Result<Option<ModelWithCreator>>;
}

/// SQLx-based model repository implementation
pub struct SqlxModelRepository {
    pool: DynDatabasePool,
}

impl SqlxModelRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ModelRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_MODEL: &str = r#"
    SELECT m.id, m.title, m.description, m.price, m.thumbnail_url, m.model_url, m.category,
           m.status, m.direct_print_enabled, m.creator_id, m.file_size, m.file_format,
           m.polygon_count, m.reviewed_by, m.review_note, m.created_at, m.updated_at,
           u.username AS creator_name
    FROM models m
    LEFT JOIN users u ON u.id = m.creator_id
"#;

const INSERT_MODEL: &str = r#"
    INSERT INTO models (title, description, price, thumbnail_url, model_url, category, status,
                        direct_print_enabled, creator_id, file_size, file_format, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const MODERATE_MODEL: &str =
    "UPDATE models SET status = ?, review_note = ?, reviewed_by = ?, updated_at = ? WHERE id = ?";

#[async_trait]
impl ModelRepository for SqlxModelRepository {
    async fn create(&self, input: &CreateModelInput) -> Result<Model> {
        let now = Utc::now();
        let status = ModelStatus::Pending;

        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(INSERT_MODEL)
                .bind(&input.title)
                .bind(&input.description)
                .bind(input.price)
                .bind(&input.thumbnail_url)
                .bind(&input.model_url)
                .bind(&input.category)
                .bind(status.to_string())
                .bind(input.direct_print_enabled)
                .bind(input.creator_id)
                .bind(input.file_size)
                .bind(&input.file_format)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create model")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(INSERT_MODEL)
                .bind(&input.title)
                .bind(&input.description)
                .bind(input.price)
                .bind(&input.thumbnail_url)
                .bind(&input.model_url)
                .bind(&input.category)
                .bind(status.to_string())
                .bind(input.direct_print_enabled)
                .bind(input.creator_id)
                .bind(input.file_size)
                .bind(&input.file_format)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create model")?
                .last_insert_id() as i64,
        };

        Ok(Model {
            id,
            title: input.title.clone(),
            description: input.description.clone(),
            price: input.price,
            thumbnail_url: input.thumbnail_url.clone(),
            model_url: input.model_url.clone(),
            category: input.category.clone(),
            status,
            direct_print_enabled: input.direct_print_enabled,
            creator_id: input.creator_id,
            file_size: input.file_size,
            file_format: input.file_format.clone(),
            polygon_count: None,
            reviewed_by: None,
            review_note: None,
            created_at: now,
            updated_at: None,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ModelWithCreator>> {
        let sql = format!("{} WHERE m.id = ?", SELECT_MODEL);
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get model by ID")?;
                row.as_ref().map(row_to_model_sqlite).transpose()
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get model by ID")?;
                row.as_ref().map(row_to_model_mysql).transpose()
            }
        }
    }

    async fn list(&self, status: Option<ModelStatus>) -> Result<Vec<ModelWithCreator>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_models_sqlite(pool, status).await,
            Backend::Mysql(pool) => list_models_mysql(pool, status).await,
        }
    }

    async fn moderate(&self, id: i64, input: &ModerationInput) -> Result<Option<ModelWithCreator>> {
        let now = Utc::now();
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(MODERATE_MODEL)
                    .bind(input.status.to_string())
                    .bind(&input.review_note)
                    .bind(input.reviewed_by)
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to moderate model")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(MODERATE_MODEL)
                    .bind(input.status.to_string())
                    .bind(&input.review_note)
                    .bind(input.reviewed_by)
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to moderate model")?;
            }
        }
        self.get_by_id(id).await
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_models_sqlite(
    pool: &SqlitePool,
    status: Option<ModelStatus>,
) -> Result<Vec<ModelWithCreator>> {
    let rows = match status {
        Some(status) => {
            let sql = format!("{} WHERE m.status = ? ORDER BY m.created_at DESC, m.id DESC", SELECT_MODEL);
            sqlx::query(&sql)
                .bind(status.to_string())
                .fetch_all(pool)
                .await
        }
        None => {
            let sql = format!("{} ORDER BY m.created_at DESC, m.id DESC", SELECT_MODEL);
            sqlx::query(&sql).fetch_all(pool).await
        }
    }
    .context("Failed to list models")?;

    rows.iter().map(row_to_model_sqlite).collect()
}

fn row_to_model_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<ModelWithCreator> {
    let status_str: String = row.get("status");
    let status = ModelStatus::from_str(&status_str)
        .with_context(|| format!("Invalid model status in database: {}", status_str))?;

    let model = Model {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        price: row.get("price"),
        thumbnail_url: row.get("thumbnail_url"),
        model_url: row.get("model_url"),
        category: row.get("category"),
        status,
        direct_print_enabled: row.get("direct_print_enabled"),
        creator_id: row.get("creator_id"),
        file_size: row.get("file_size"),
        file_format: row.get("file_format"),
        polygon_count: row.get("polygon_count"),
        reviewed_by: row.get("reviewed_by"),
        review_note: row.get("review_note"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };

    Ok(ModelWithCreator::new(model, row.get("creator_name")))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_models_mysql(
    pool: &MySqlPool,
    status: Option<ModelStatus>,
) -> Result<Vec<ModelWithCreator>> {
    let rows = match status {
        Some(status) => {
            let sql = format!("{} WHERE m.status = ? ORDER BY m.created_at DESC, m.id DESC", SELECT_MODEL);
            sqlx::query(&sql)
                .bind(status.to_string())
                .fetch_all(pool)
                .await
        }
        None => {
            let sql = format!("{} ORDER BY m.created_at DESC, m.id DESC", SELECT_MODEL);
            sqlx::query(&sql).fetch_all(pool).await
        }
    }
    .context("Failed to list models")?;

    rows.iter().map(row_to_model_mysql).collect()
}

fn row_to_model_mysql(row: &sqlx::mysql::MySqlRow) -> Result<ModelWithCreator> {
    let status_str: String = row.get("status");
    let status = ModelStatus::from_str(&status_str)
        .with_context(|| format!("Invalid model status in database: {}", status_str))?;

    let model = Model {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        price: row.get("price"),
        thumbnail_url: row.get("thumbnail_url"),
        model_url: row.get("model_url"),
        category: row.get("category"),
        status,
        direct_print_enabled: row.get("direct_print_enabled"),
        creator_id: row.get("creator_id"),
        file_size: row.get("file_size"),
        file_format: row.get("file_format"),
        polygon_count: row.get("polygon_count"),
        reviewed_by: row.get("reviewed_by"),
        review_note: row.get("review_note"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };

    Ok(ModelWithCreator::new(model, row.get("creator_name")))
}
