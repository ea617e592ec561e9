//! Category repository
//!
//! - `CategoryRepository` trait defining the interface for category data access
//! - `SqlxCategoryRepository` implementing the trait for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category
    async fn create(&self, category: &Category) -> Result<Category>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Get category by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// Get category by name (case-insensitive)
    async fn get_by_name(&self, name: &str) -> Result<Option<Category>>;

    /// List all categories ordered by name
    async fn list(&self) -> Result<Vec<Category>>;

    /// Update name, slug and description
    async fn update(&self, category: &Category) -> Result<Category>;

    /// Delete a category, returning whether a row was removed
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_CATEGORY: &str =
    "SELECT id, name, slug, description, created_at, updated_at FROM categories";

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_category_sqlite(pool, category).await,
            Backend::Mysql(pool) => create_category_mysql(pool, category).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("{} WHERE id = ?", SELECT_CATEGORY);
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get category by ID")?;
                Ok(row.as_ref().map(row_to_category_sqlite))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get category by ID")?;
                Ok(row.as_ref().map(row_to_category_mysql))
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("{} WHERE slug = ?", SELECT_CATEGORY);
        match self.pool.backend() {
            Backend::Sqlite(pool) => find_one_sqlite(pool, &sql, slug).await,
            Backend::Mysql(pool) => find_one_mysql(pool, &sql, slug).await,
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>> {
        let sql = format!("{} WHERE LOWER(name) = LOWER(?)", SELECT_CATEGORY);
        match self.pool.backend() {
            Backend::Sqlite(pool) => find_one_sqlite(pool, &sql, name).await,
            Backend::Mysql(pool) => find_one_mysql(pool, &sql, name).await,
        }
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let sql = format!("{} ORDER BY name", SELECT_CATEGORY);
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list categories")?;
                Ok(rows.iter().map(row_to_category_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list categories")?;
                Ok(rows.iter().map(row_to_category_mysql).collect())
            }
        }
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        let now = Utc::now();
        let sql = "UPDATE categories SET name = ?, slug = ?, description = ?, updated_at = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(&category.name)
                    .bind(&category.slug)
                    .bind(&category.description)
                    .bind(now)
                    .bind(category.id)
                    .execute(pool)
                    .await
                    .context("Failed to update category")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(&category.name)
                    .bind(&category.slug)
                    .bind(&category.description)
                    .bind(now)
                    .bind(category.id)
                    .execute(pool)
                    .await
                    .context("Failed to update category")?;
            }
        }

        self.get_by_id(category.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query("DELETE FROM categories WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query("DELETE FROM categories WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete category")?;

        Ok(affected > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_category_sqlite(pool: &SqlitePool, category: &Category) -> Result<Category> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO categories (name, slug, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&category.name)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..category.clone()
    })
}

async fn find_one_sqlite(pool: &SqlitePool, sql: &str, value: &str) -> Result<Option<Category>> {
    let row = sqlx::query(sql)
        .bind(value)
        .fetch_optional(pool)
        .await
        .context("Failed to get category")?;
    Ok(row.as_ref().map(row_to_category_sqlite))
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_category_mysql(pool: &MySqlPool, category: &Category) -> Result<Category> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO categories (name, slug, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&category.name)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..category.clone()
    })
}

async fn find_one_mysql(pool: &MySqlPool, sql: &str, value: &str) -> Result<Option<Category>> {
    let row = sqlx::query(sql)
        .bind(value)
        .fetch_optional(pool)
        .await
        .context("Failed to get category")?;
    Ok(row.as_ref().map(row_to_category_mysql))
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
