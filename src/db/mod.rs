//! Database layer
//!
//! SQLite is the default (single-file deployment); MySQL is available for
//! larger installs. The driver is chosen from configuration and hidden behind
//! the [`DatabasePool`] trait.
//!
//! ```ignore
//! use meshmart::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
