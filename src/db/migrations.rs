//! Database migrations
//!
//! Schema migrations are embedded in the binary as SQL strings, one variant
//! per driver. Applied versions are recorded in the `_migrations` table so a
//! restart only runs what is new.
//!
//! ```ignore
//! use meshmart::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::{Backend, DynDatabasePool};

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(20) NOT NULL UNIQUE,
                full_name VARCHAR(255) NOT NULL DEFAULT '',
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_login TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(20) NOT NULL UNIQUE,
                full_name VARCHAR(255) NOT NULL DEFAULT '',
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_login TIMESTAMP NULL
            );
            CREATE INDEX idx_users_email ON users(email);
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_categories",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                slug VARCHAR(100) NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            INSERT OR IGNORE INTO categories (name, slug, description) VALUES
                ('Gaming', 'gaming', 'Miniatures, terrain and accessories for tabletop and video games'),
                ('Mechanical', 'mechanical', 'Functional parts, enclosures and mechanisms'),
                ('Art', 'art', 'Sculptures, vases and decorative pieces'),
                ('Utility', 'utility', 'Organizers, holders and everyday helpers');
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                slug VARCHAR(100) NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
            INSERT IGNORE INTO categories (name, slug, description) VALUES
                ('Gaming', 'gaming', 'Miniatures, terrain and accessories for tabletop and video games'),
                ('Mechanical', 'mechanical', 'Functional parts, enclosures and mechanisms'),
                ('Art', 'art', 'Sculptures, vases and decorative pieces'),
                ('Utility', 'utility', 'Organizers, holders and everyday helpers');
        "#,
    },
    Migration {
        version: 4,
        name: "create_models",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS models (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                description TEXT NOT NULL,
                price INTEGER NOT NULL CHECK (price >= 0),
                thumbnail_url VARCHAR(512) NOT NULL,
                model_url VARCHAR(512) NOT NULL,
                category VARCHAR(100) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                direct_print_enabled BOOLEAN NOT NULL DEFAULT 0,
                creator_id INTEGER NOT NULL,
                file_size INTEGER,
                file_format VARCHAR(20),
                polygon_count INTEGER,
                reviewed_by INTEGER,
                review_note TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP,
                FOREIGN KEY (creator_id) REFERENCES users(id),
                FOREIGN KEY (reviewed_by) REFERENCES users(id)
            );
            CREATE INDEX IF NOT EXISTS idx_models_status ON models(status);
            CREATE INDEX IF NOT EXISTS idx_models_category ON models(category);
            CREATE INDEX IF NOT EXISTS idx_models_creator_id ON models(creator_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS models (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL,
                description TEXT NOT NULL,
                price BIGINT NOT NULL,
                thumbnail_url VARCHAR(512) NOT NULL,
                model_url VARCHAR(512) NOT NULL,
                category VARCHAR(100) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                direct_print_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                creator_id BIGINT NOT NULL,
                file_size BIGINT NULL,
                file_format VARCHAR(20) NULL,
                polygon_count BIGINT NULL,
                reviewed_by BIGINT NULL,
                review_note TEXT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NULL,
                FOREIGN KEY (creator_id) REFERENCES users(id),
                FOREIGN KEY (reviewed_by) REFERENCES users(id)
            );
            CREATE INDEX idx_models_status ON models(status);
            CREATE INDEX idx_models_category ON models(category);
            CREATE INDEX idx_models_creator_id ON models(creator_id);
        "#,
    },
    Migration {
        version: 5,
        name: "create_analytics",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS analytics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type VARCHAR(32) NOT NULL,
                model_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (model_id) REFERENCES models(id),
                FOREIGN KEY (user_id) REFERENCES users(id)
            );
            CREATE INDEX IF NOT EXISTS idx_analytics_event_type ON analytics(event_type);
            CREATE INDEX IF NOT EXISTS idx_analytics_model_id ON analytics(model_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS analytics (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                event_type VARCHAR(32) NOT NULL,
                model_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                metadata TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (model_id) REFERENCES models(id),
                FOREIGN KEY (user_id) REFERENCES users(id)
            );
            CREATE INDEX idx_analytics_event_type ON analytics(event_type);
            CREATE INDEX idx_analytics_model_id ON analytics(model_id);
        "#,
    },
];

/// Run all pending migrations in version order.
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i64> = applied.iter().map(|m| m.version).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if applied_versions.contains(&i64::from(migration.version)) {
            continue;
        }
        tracing::info!(
            "Applying migration {}: {}",
            migration.version,
            migration.name
        );
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.backend() {
        Backend::Sqlite(_) => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        Backend::Mysql(_) => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.backend() {
        Backend::Sqlite(pool) => get_applied_migrations_sqlite(pool).await,
        Backend::Mysql(pool) => get_applied_migrations_mysql(pool).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: i64::from(row.get::<i32, _>("version")),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.backend() {
        Backend::Sqlite(pool) => apply_migration_sqlite(pool, migration).await,
        Backend::Mysql(pool) => apply_migration_mysql(pool, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((cut, _)) => format!("{}...", &sql[..cut]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

/// Check if a string contains only SQL comments
fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

/// Get the total number of migrations defined
pub fn total_migrations() -> usize {
    MIGRATIONS.len()
}

/// Get migration by version
pub fn get_migration(version: i32) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.version == version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    async fn insert_user(pool: &SqlitePool, username: &str, email: &str) -> sqlx::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO users (username, full_name, email, password_hash) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind("Test User")
        .bind(email)
        .bind("hash")
        .execute(pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.unwrap();

        let applied = run_migrations(&pool).await.unwrap();
        assert_eq!(applied, total_migrations());
        assert!(is_up_to_date(&pool).await.unwrap());

        let applied_again = run_migrations(&pool).await.unwrap();
        assert_eq!(applied_again, 0);
    }

    #[tokio::test]
    async fn test_pending_count_before_and_after() {
        let pool = create_test_pool().await.unwrap();
        assert_eq!(pending_count(&pool).await.unwrap(), total_migrations());

        run_migrations(&pool).await.unwrap();
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_categories_are_seeded() {
        let pool = migrated_pool().await;
        let sqlite = pool.as_sqlite().unwrap();

        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM categories ORDER BY name")
            .fetch_all(sqlite)
            .await
            .unwrap();

        assert_eq!(names, vec!["Art", "Gaming", "Mechanical", "Utility"]);
    }

    #[tokio::test]
    async fn test_user_defaults_and_unique_username() {
        let pool = migrated_pool().await;
        let sqlite = pool.as_sqlite().unwrap();

        let id = insert_user(sqlite, "maker", "maker@example.com").await.unwrap();
        let role: String = sqlx::query_scalar("SELECT role FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(sqlite)
            .await
            .unwrap();
        assert_eq!(role, "user");

        let duplicate = insert_user(sqlite, "maker", "other@example.com").await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_model_defaults_to_pending() {
        let pool = migrated_pool().await;
        let sqlite = pool.as_sqlite().unwrap();
        let creator = insert_user(sqlite, "maker", "maker@example.com").await.unwrap();

        sqlx::query(
            r#"
            INSERT INTO models (title, description, price, thumbnail_url, model_url, category, creator_id)
            VALUES ('Gear', 'A gear', 500, '/t.png', '/m.glb', 'Mechanical', ?)
            "#,
        )
        .bind(creator)
        .execute(sqlite)
        .await
        .unwrap();

        let status: String = sqlx::query_scalar("SELECT status FROM models")
            .fetch_one(sqlite)
            .await
            .unwrap();
        assert_eq!(status, "pending");
    }

    #[tokio::test]
    async fn test_model_rejects_negative_price() {
        let pool = migrated_pool().await;
        let sqlite = pool.as_sqlite().unwrap();
        let creator = insert_user(sqlite, "maker", "maker@example.com").await.unwrap();

        let result = sqlx::query(
            r#"
            INSERT INTO models (title, description, price, thumbnail_url, model_url, category, creator_id)
            VALUES ('Gear', 'A gear', -1, '/t.png', '/m.glb', 'Mechanical', ?)
            "#,
        )
        .bind(creator)
        .execute(sqlite)
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_analytics_requires_existing_model() {
        let pool = migrated_pool().await;
        let sqlite = pool.as_sqlite().unwrap();
        let user = insert_user(sqlite, "buyer", "buyer@example.com").await.unwrap();

        let result = sqlx::query(
            "INSERT INTO analytics (event_type, model_id, user_id, metadata) VALUES ('model_purchased', 999, ?, '{}')",
        )
        .bind(user)
        .execute(sqlite)
        .await;

        assert!(result.is_err());
    }

    #[test]
    fn test_get_migration() {
        assert_eq!(get_migration(1).map(|m| m.name), Some("create_users"));
        assert_eq!(get_migration(5).map(|m| m.name), Some("create_analytics"));
        assert!(get_migration(999).is_none());
    }

    #[test]
    fn test_split_sql_statements() {
        let statements = split_sql_statements("CREATE TABLE a (id INT); CREATE TABLE b (id INT);");
        assert_eq!(statements.len(), 2);

        let statements = split_sql_statements("-- Comment\nCREATE TABLE a (id INT);\n-- trailing\n");
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- This is a comment"));
        assert!(is_comment_only("-- Line 1\n-- Line 2"));
        assert!(!is_comment_only("-- Comment\nCREATE TABLE test"));
    }

    #[test]
    fn test_truncate_sql() {
        let long = "x".repeat(150);
        assert_eq!(truncate_sql(&long).len(), 103);
        assert_eq!(truncate_sql("SELECT 1"), "SELECT 1");
    }
}
