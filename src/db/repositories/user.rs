//! User repository
//!
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::{User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Change a user's role
    async fn update_role(&self, id: i64, role: UserRole) -> Result<Option<User>>;

    /// Record a successful login
    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Count total users
    async fn count(&self) -> Result<i64>;

    /// List users, newest first, with pagination
    async fn list(&self, page: i64, per_page: i64) -> Result<(Vec<User>, i64)>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

const USER_COLUMNS: &str =
    "id, username, full_name, email, password_hash, role, created_at, last_login";

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => create_user_mysql(pool, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(pool) => fetch_user_sqlite(pool, &sql, Key::Id(id)).await,
            Backend::Mysql(pool) => fetch_user_mysql(pool, &sql, Key::Id(id)).await,
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(pool) => fetch_user_sqlite(pool, &sql, Key::Text(username)).await,
            Backend::Mysql(pool) => fetch_user_mysql(pool, &sql, Key::Text(username)).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(pool) => fetch_user_sqlite(pool, &sql, Key::Text(email)).await,
            Backend::Mysql(pool) => fetch_user_mysql(pool, &sql, Key::Text(email)).await,
        }
    }

    async fn update_role(&self, id: i64, role: UserRole) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query("UPDATE users SET role = ? WHERE id = ?")
                    .bind(role.to_string())
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update user role")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query("UPDATE users SET role = ? WHERE id = ?")
                    .bind(role.to_string())
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update user role")?;
            }
        }
        // rows_affected is 0 on MySQL for no-op updates, so existence is checked by reading back.
        self.get_by_id(id).await
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
                    .bind(at)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to record login")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
                    .bind(at)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to record login")?;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => count_users_sqlite(pool).await,
            Backend::Mysql(pool) => count_users_mysql(pool).await,
        }
    }

    async fn list(&self, page: i64, per_page: i64) -> Result<(Vec<User>, i64)> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_users_sqlite(pool, page, per_page).await,
            Backend::Mysql(pool) => list_users_mysql(pool, page, per_page).await,
        }
    }
}

enum Key<'a> {
    Id(i64),
    Text(&'a str),
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, full_name, email, password_hash, role, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.full_name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        last_login: None,
        ..user.clone()
    })
}

async fn fetch_user_sqlite(pool: &SqlitePool, sql: &str, key: Key<'_>) -> Result<Option<User>> {
    let query = sqlx::query(sql);
    let query = match key {
        Key::Id(id) => query.bind(id),
        Key::Text(text) => query.bind(text.to_string()),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    row.map(|row| row_to_user_sqlite(&row)).transpose()
}

async fn count_users_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_users_sqlite(pool: &SqlitePool, page: i64, per_page: i64) -> Result<(Vec<User>, i64)> {
    let offset = (page - 1).max(0) * per_page;
    let sql = format!(
        "SELECT {} FROM users ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        USER_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    let users = rows
        .iter()
        .map(row_to_user_sqlite)
        .collect::<Result<Vec<_>>>()?;
    let total = count_users_sqlite(pool).await?;

    Ok((users, total))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        created_at: row.get("created_at"),
        last_login: row.get("last_login"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, full_name, email, password_hash, role, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.full_name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        last_login: None,
        ..user.clone()
    })
}

async fn fetch_user_mysql(pool: &MySqlPool, sql: &str, key: Key<'_>) -> Result<Option<User>> {
    let query = sqlx::query(sql);
    let query = match key {
        Key::Id(id) => query.bind(id),
        Key::Text(text) => query.bind(text.to_string()),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    row.map(|row| row_to_user_mysql(&row)).transpose()
}

async fn count_users_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_users_mysql(pool: &MySqlPool, page: i64, per_page: i64) -> Result<(Vec<User>, i64)> {
    let offset = (page - 1).max(0) * per_page;
    let sql = format!(
        "SELECT {} FROM users ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        USER_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    let users = rows
        .iter()
        .map(row_to_user_mysql)
        .collect::<Result<Vec<_>>>()?;
    let total = count_users_mysql(pool).await?;

    Ok((users, total))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        created_at: row.get("created_at"),
        last_login: row.get("last_login"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn test_user(username: &str, email: &str) -> User {
        User::new(
            username.to_string(),
            format!("{} Fullname", username),
            email.to_string(),
            "not-a-real-hash".to_string(),
            UserRole::User,
        )
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let repo = setup_test_repo().await;

        let created = repo
            .create(&test_user("maker", "maker@example.com"))
            .await
            .expect("Failed to create user");
        assert!(created.id > 0);

        let found = repo.get_by_id(created.id).await.unwrap().expect("User not found");
        assert_eq!(found.username, "maker");
        assert_eq!(found.full_name, "maker Fullname");
        assert_eq!(found.role, UserRole::User);
        assert!(found.last_login.is_none());

        assert!(repo.get_by_username("maker").await.unwrap().is_some());
        assert!(repo.get_by_email("maker@example.com").await.unwrap().is_some());
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let repo = setup_test_repo().await;
        repo.create(&test_user("maker", "maker@example.com")).await.unwrap();

        let result = repo.create(&test_user("other", "maker@example.com")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_update_role() {
        let repo = setup_test_repo().await;
        let created = repo.create(&test_user("maker", "maker@example.com")).await.unwrap();

        let updated = repo
            .update_role(created.id, UserRole::Moderator)
            .await
            .unwrap()
            .expect("User should exist");
        assert_eq!(updated.role, UserRole::Moderator);

        assert!(repo.update_role(999, UserRole::Admin).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_last_login() {
        let repo = setup_test_repo().await;
        let created = repo.create(&test_user("maker", "maker@example.com")).await.unwrap();

        repo.touch_last_login(created.id, Utc::now()).await.unwrap();

        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert!(found.last_login.is_some());
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let repo = setup_test_repo().await;
        for i in 0..5 {
            repo.create(&test_user(&format!("user{}", i), &format!("u{}@example.com", i)))
                .await
                .unwrap();
        }

        assert_eq!(repo.count().await.unwrap(), 5);

        let (page_one, total) = repo.list(1, 2).await.unwrap();
        assert_eq!(page_one.len(), 2);
        assert_eq!(total, 5);

        let (page_three, _) = repo.list(3, 2).await.unwrap();
        assert_eq!(page_three.len(), 1);
    }
}
