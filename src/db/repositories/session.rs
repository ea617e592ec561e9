//! Session repository
//!
//! - `SessionRepository` trait defining the interface for session data access
//! - `SqlxSessionRepository` implementing the trait for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Delete a session
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_session_sqlite(pool, session).await,
            Backend::Mysql(pool) => create_session_mysql(pool, session).await,
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_session_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_session_by_id_mysql(pool, id).await,
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query("DELETE FROM sessions WHERE id = ?")
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete session")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query("DELETE FROM sessions WHERE id = ?")
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete session")?;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let result = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        };
        result.context("Failed to delete expired sessions")
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<Session> {
    sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
        .bind(&session.id)
        .bind(session.user_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(pool)
        .await
        .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    Ok(row.map(|row| Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(pool: &MySqlPool, session: &Session) -> Result<Session> {
    sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
        .bind(&session.id)
        .bind(session.user_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(pool)
        .await
        .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_mysql(pool: &MySqlPool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    Ok(row.map(|row| Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSessionRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxSessionRepository::new(pool.clone());
        (pool, repo)
    }

    // Sessions reference users, so a row must exist first.
    async fn create_test_user(pool: &DynDatabasePool) -> i64 {
        sqlx::query(
            "INSERT INTO users (username, full_name, email, password_hash) VALUES ('buyer', 'Buyer', 'buyer@example.com', 'hash')",
        )
        .execute(pool.as_sqlite().unwrap())
        .await
        .expect("Failed to create test user")
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool).await;
        let session = Session::new(user_id, Duration::days(7));

        repo.create(&session).await.expect("Failed to create session");

        let found = repo.get_by_id(&session.id).await.unwrap().expect("Session not found");
        assert_eq!(found.user_id, user_id);
        assert!(!found.is_expired());

        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_session() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool).await;
        let session = Session::new(user_id, Duration::days(7));
        repo.create(&session).await.unwrap();

        repo.delete(&session.id).await.unwrap();

        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_live_sessions() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool).await;
        let live = Session::new(user_id, Duration::days(1));
        let stale = Session::new(user_id, Duration::days(-1));
        repo.create(&live).await.unwrap();
        repo.create(&stale).await.unwrap();

        let removed = repo.delete_expired().await.unwrap();

        assert_eq!(removed, 1);
        assert!(repo.get_by_id(&live.id).await.unwrap().is_some());
        assert!(repo.get_by_id(&stale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_requires_existing_user() {
        let (_pool, repo) = setup_test_repo().await;
        let session = Session::new(4242, Duration::days(1));

        assert!(repo.create(&session).await.is_err());
    }
}
