//! Cache layer
//!
//! Process-local read cache for list endpoints. Values are stored as JSON so
//! any serializable type can be cached under a string key.
//!
//! ```rust,ignore
//! use meshmart::cache::create_cache;
//! use meshmart::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("models:list:all", &models, cache.default_ttl()).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

/// Cache layer trait
///
/// Generic methods keep this out of `dyn` position; services hold the
/// concrete [`Cache`] behind an `Arc`.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values whose key matches a glob pattern
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Clear all cache entries
    async fn clear(&self) -> Result<()>;
}

pub use memory::MemoryCache;

/// The cache type shared by services
pub type Cache = MemoryCache;

/// Build the shared cache from configuration.
pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    Arc::new(MemoryCache::with_capacity_and_ttl(
        config.max_entries,
        Duration::from_secs(config.ttl_seconds),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_cache_from_config() {
        let config = CacheConfig {
            ttl_seconds: 120,
            max_entries: 50,
        };
        let cache = create_cache(&config);

        assert_eq!(cache.default_ttl(), Duration::from_secs(120));
        cache.set("k", &1u32, cache.default_ttl()).await.unwrap();
        assert_eq!(cache.get::<u32>("k").await.unwrap(), Some(1));
    }
}
