//! In-memory cache using moka
//!
//! Entries carry their own TTL through a moka [`Expiry`] policy, capped by
//! the cache-wide default.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_CAPACITY: u64 = 10_000;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// JSON-serialized value plus the TTL it was stored with
#[derive(Clone)]
struct CacheEntry {
    data: Arc<String>,
    ttl: Duration,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T, ttl: Duration) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
            ttl,
        })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

struct EntryExpiry {
    max_ttl: Duration,
}

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl.min(self.max_ttl))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl.min(self.max_ttl))
    }
}

/// In-memory cache using moka
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    default_ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    /// Create a cache bounded to `max_capacity` entries.
    ///
    /// `default_ttl` is also the upper bound for any per-entry TTL.
    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry { max_ttl: default_ttl })
            .build();

        Self { cache, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Glob match where `*` is any run of characters and `?` is one character.
    fn pattern_matches(pattern: &str, key: &str) -> bool {
        let pattern: Vec<char> = pattern.chars().collect();
        let key: Vec<char> = key.chars().collect();

        let (mut pi, mut ki) = (0, 0);
        // Position of the last '*' seen and the key index it was tried against
        let mut backtrack: Option<(usize, usize)> = None;

        while ki < key.len() {
            match pattern.get(pi) {
                Some('*') => {
                    backtrack = Some((pi, ki));
                    pi += 1;
                }
                Some('?') => {
                    pi += 1;
                    ki += 1;
                }
                Some(&c) if c == key[ki] => {
                    pi += 1;
                    ki += 1;
                }
                _ => match backtrack {
                    Some((star, matched)) => {
                        pi = star + 1;
                        ki = matched + 1;
                        backtrack = Some((star, matched + 1));
                    }
                    None => return false,
                },
            }
        }

        pattern[pi..].iter().all(|&c| c == '*')
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, ttl)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    /// Walks every key, so only suitable for the small key spaces used here.
    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| Self::pattern_matches(pattern, key.as_ref()))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in keys {
            self.cache.invalidate(&key).await;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();

        cache.set("models:list:all", &vec![1, 2, 3], Duration::from_secs(60)).await.unwrap();
        let hit: Option<Vec<i32>> = cache.get("models:list:all").await.unwrap();
        assert_eq!(hit, Some(vec![1, 2, 3]));

        cache.delete("models:list:all").await.unwrap();
        let miss: Option<Vec<i32>> = cache.get("models:list:all").await.unwrap();
        assert_eq!(miss, None);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_error() {
        let cache = MemoryCache::new();
        cache.set("k", &"text", Duration::from_secs(60)).await.unwrap();

        assert!(cache.get::<u64>("k").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("models:list:all", &1, ttl).await.unwrap();
        cache.set("models:list:active", &2, ttl).await.unwrap();
        cache.set("categories:list", &3, ttl).await.unwrap();

        cache.delete_pattern("models:*").await.unwrap();

        assert_eq!(cache.get::<i32>("models:list:all").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("models:list:active").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("categories:list").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_per_entry_ttl_expires() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(60));
        cache.set("short", &1, Duration::from_millis(10)).await.unwrap();
        cache.set("long", &2, Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.cache.run_pending_tasks().await;

        assert_eq!(cache.get::<i32>("short").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("long").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::new();
        cache.set("a", &1, Duration::from_secs(60)).await.unwrap();
        cache.set("b", &2, Duration::from_secs(60)).await.unwrap();

        cache.clear().await.unwrap();

        assert_eq!(cache.get::<i32>("a").await.unwrap(), None);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_pattern_matches() {
        assert!(MemoryCache::pattern_matches("models:*", "models:list:all"));
        assert!(MemoryCache::pattern_matches("models:*:all", "models:list:all"));
        assert!(MemoryCache::pattern_matches("user:?", "user:1"));
        assert!(MemoryCache::pattern_matches("*", ""));
        assert!(!MemoryCache::pattern_matches("user:?", "user:12"));
        assert!(!MemoryCache::pattern_matches("models:*", "categories:list"));
        assert!(!MemoryCache::pattern_matches("a*b", "acbc"));
    }

    proptest! {
        #[test]
        fn prop_prefix_star_matches_any_suffix(prefix in "[a-z:]{0,8}", suffix in "[a-z0-9:]{0,12}") {
            let key = format!("{}{}", prefix, suffix);
            let pattern = format!("{}*", prefix);
            prop_assert!(MemoryCache::pattern_matches(&pattern, &key));
        }

        #[test]
        fn prop_literal_pattern_matches_only_itself(a in "[a-z]{1,10}", b in "[a-z]{1,10}") {
            prop_assert_eq!(MemoryCache::pattern_matches(&a, &b), a == b);
        }
    }
}
