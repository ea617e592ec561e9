//! Database repositories
//!
//! One repository per entity, each a trait plus an SQLx implementation that
//! serves both SQLite and MySQL.

pub mod analytics;
pub mod category;
pub mod model;
pub mod session;
pub mod user;

pub use analytics::{AnalyticsRepository, SqlxAnalyticsRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use model::{ModelRepository, SqlxModelRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
