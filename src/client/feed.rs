//! Model feed: fetch, retry, de-duplicate, validate, fall back
//!
//! `ModelFeed::load` always yields something to render. The freshest valid
//! payload wins; otherwise the last good snapshot for the endpoint, otherwise
//! the placeholder catalog. Whatever went wrong travels alongside the data.

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::decode::{DecodeOutcome, Listing, ValidationCache};
use super::fallback::placeholder_listings;
use super::listing::filter_category;
use super::policy::{fetch_with_policy, FetchError, RetryPolicy};
use crate::config::ClientConfig;

/// Where listing bytes come from
#[async_trait]
pub trait ModelSource: Send + Sync {
    async fn fetch(&self, endpoint: &str) -> Result<Vec<u8>, FetchError>;
}

/// `ModelSource` over HTTP
pub struct HttpSource {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpSource {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid client base URL {}: {}", base_url, e))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("meshmart/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn error_message(status: StatusCode, body: &str) -> String {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown status").to_string())
    }
}

#[async_trait]
impl ModelSource for HttpSource {
    async fn fetch(&self, endpoint: &str) -> Result<Vec<u8>, FetchError> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|e| FetchError::Network(format!("Invalid endpoint {}: {}", endpoint, e)))?;

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FetchError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: Self::error_message(status, &body),
            });
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Network(e.to_string()))
    }
}

/// Where the listings in a `FeedState` came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOrigin {
    Network,
    Stale,
    Placeholder,
}

/// What a caller renders: data plus the error and validation state
#[derive(Debug, Clone, PartialEq)]
pub struct FeedState {
    pub listings: Vec<Listing>,
    pub origin: FeedOrigin,
    pub error: Option<FetchError>,
    /// Descriptions of records dropped during validation
    pub rejected: Vec<String>,
}

#[derive(Debug)]
struct Snapshot {
    listings: Vec<Listing>,
    rejected: Vec<String>,
}

/// Cached listing loader keyed by endpoint
pub struct ModelFeed {
    source: Arc<dyn ModelSource>,
    policy: RetryPolicy,
    validation: ValidationCache,
    recent: Cache<String, Arc<Snapshot>>,
    last_good: Cache<String, Arc<Snapshot>>,
}

impl ModelFeed {
    /// Loads of one endpoint within `dedup_window` share a single fetch.
    pub fn new(source: Arc<dyn ModelSource>, policy: RetryPolicy, dedup_window: Duration) -> Self {
        Self {
            source,
            policy,
            validation: ValidationCache::default(),
            recent: Cache::builder()
                .max_capacity(64)
                .time_to_live(dedup_window)
                .build(),
            last_good: Cache::builder().max_capacity(64).build(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        let source = HttpSource::new(&config.base_url)?;
        Ok(Self::new(
            Arc::new(source),
            RetryPolicy::from_config(config),
            config.dedup_window(),
        ))
    }

    /// Load `endpoint`, keeping only `category` when given.
    pub async fn load(&self, endpoint: &str, category: Option<&str>) -> FeedState {
        let result = self
            .recent
            .try_get_with(endpoint.to_string(), self.fetch_snapshot(endpoint))
            .await;

        let mut state = match result {
            Ok(snapshot) => {
                self.last_good
                    .insert(endpoint.to_string(), snapshot.clone())
                    .await;
                FeedState {
                    listings: snapshot.listings.clone(),
                    origin: FeedOrigin::Network,
                    error: None,
                    rejected: snapshot.rejected.clone(),
                }
            }
            Err(error) => self.fallback(endpoint, (*error).clone()).await,
        };

        if let Some(category) = category {
            state.listings = filter_category(state.listings, category);
        }
        state
    }

    /// Drop the de-dup entry for `endpoint` and load again.
    pub async fn refresh(&self, endpoint: &str, category: Option<&str>) -> FeedState {
        self.recent.invalidate(endpoint).await;
        self.load(endpoint, category).await
    }

    async fn fetch_snapshot(&self, endpoint: &str) -> Result<Arc<Snapshot>, FetchError> {
        debug!(endpoint, "Fetching listings");
        let body = fetch_with_policy(&self.policy, |_| self.source.fetch(endpoint)).await?;

        match &*self.validation.decode(&body).await {
            DecodeOutcome::Decoded { listings, rejected } => {
                if !rejected.is_empty() {
                    warn!(endpoint, count = rejected.len(), "Dropped invalid listings");
                }
                Ok(Arc::new(Snapshot {
                    listings: listings.clone(),
                    rejected: rejected.clone(),
                }))
            }
            DecodeOutcome::Malformed(reason) => Err(FetchError::Malformed(reason.clone())),
        }
    }

    async fn fallback(&self, endpoint: &str, error: FetchError) -> FeedState {
        match self.last_good.get(endpoint).await {
            Some(snapshot) => {
                warn!(endpoint, error = %error, "Serving last good listings");
                FeedState {
                    listings: snapshot.listings.clone(),
                    origin: FeedOrigin::Stale,
                    error: Some(error),
                    rejected: snapshot.rejected.clone(),
                }
            }
            None => {
                warn!(endpoint, error = %error, "Serving placeholder listings");
                FeedState {
                    listings: placeholder_listings(),
                    origin: FeedOrigin::Placeholder,
                    error: Some(error),
                    rejected: Vec::new(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted responses; the last one repeats.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Vec<u8>, FetchError>>>,
        calls: AtomicUsize,
        latency: Duration,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Vec<u8>, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                latency: Duration::from_millis(50),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelSource for ScriptedSource {
        async fn fetch(&self, _endpoint: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap()
            }
        }
    }

    fn body() -> Vec<u8> {
        json!([
            {"id": 10, "title": "Chess Set", "description": "Full set", "creatorName": "a",
             "category": "gaming", "price": 1200, "directPrintEnabled": true},
            {"id": 11, "title": "Hinge", "description": "Spare", "creatorName": "b",
             "category": "Utility", "price": 300, "directPrintEnabled": false},
            {"id": 12, "title": "Broken", "description": "x", "creatorName": "c",
             "category": "Gaming", "price": -1, "directPrintEnabled": true}
        ])
        .to_string()
        .into_bytes()
    }

    fn server_error() -> FetchError {
        FetchError::Status {
            status: 503,
            message: "Service Unavailable".into(),
        }
    }

    fn feed(source: Arc<ScriptedSource>) -> ModelFeed {
        ModelFeed::new(source, RetryPolicy::default(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_load_returns_valid_listings_and_rejections() {
        let source = ScriptedSource::new(vec![Ok(body())]);
        let state = feed(source).load("/api/models", None).await;

        assert_eq!(state.origin, FeedOrigin::Network);
        assert_eq!(state.error, None);
        assert_eq!(state.listings.iter().map(|l| l.id).collect::<Vec<_>>(), vec![10, 11]);
        assert_eq!(state.rejected.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let source = ScriptedSource::new(vec![Ok(body())]);
        let feed = feed(source.clone());

        let (a, b, c) = tokio::join!(
            feed.load("/api/models", None),
            feed.load("/api/models", Some("Gaming")),
            feed.load("/api/models", Some("utility")),
        );

        assert_eq!(source.calls(), 1);
        assert_eq!(a.listings.len(), 2);
        assert_eq!(b.listings.iter().map(|l| l.id).collect::<Vec<_>>(), vec![10]);
        assert_eq!(c.listings.iter().map(|l| l.id).collect::<Vec<_>>(), vec![11]);

        feed.load("/api/models", None).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_falls_back_without_retry() {
        let source = ScriptedSource::new(vec![Err(FetchError::Unauthorized)]);
        let state = feed(source.clone()).load("/api/models", None).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(state.origin, FeedOrigin::Placeholder);
        assert_eq!(state.error, Some(FetchError::Unauthorized));
        assert_eq!(state.listings, placeholder_listings());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_serve_placeholder_with_error() {
        let source = ScriptedSource::new(vec![Err(server_error())]);
        let state = feed(source.clone()).load("/api/models", Some("Gaming")).await;

        assert_eq!(source.calls(), 4);
        assert_eq!(state.origin, FeedOrigin::Placeholder);
        assert_eq!(state.error, Some(server_error()));
        assert_eq!(state.listings.len(), 1);
        assert_eq!(state.listings[0].title, "Dragon Miniature");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_serves_last_good_snapshot() {
        let source = ScriptedSource::new(vec![Ok(body()), Err(server_error())]);
        let feed = feed(source.clone());

        assert_eq!(feed.load("/api/models", None).await.origin, FeedOrigin::Network);
        let state = feed.refresh("/api/models", None).await;

        assert_eq!(state.origin, FeedOrigin::Stale);
        assert_eq!(state.error, Some(server_error()));
        assert_eq!(state.listings.len(), 2);
        assert_eq!(source.calls(), 5);
    }

    #[tokio::test]
    async fn test_malformed_body_is_terminal() {
        let source = ScriptedSource::new(vec![Ok(b"<html>oops</html>".to_vec())]);
        let state = feed(source.clone()).load("/api/models", None).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(state.origin, FeedOrigin::Placeholder);
        assert!(matches!(state.error, Some(FetchError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let source = ScriptedSource::new(vec![Err(FetchError::Unauthorized), Ok(body())]);
        let feed = feed(source.clone());

        assert_eq!(feed.load("/api/models", None).await.origin, FeedOrigin::Placeholder);
        let state = feed.load("/api/models", None).await;

        assert_eq!(state.origin, FeedOrigin::Network);
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn test_http_source_error_message() {
        let body = r#"{"error":{"code":"NOT_FOUND","message":"Model not found"}}"#;
        assert_eq!(
            HttpSource::error_message(StatusCode::NOT_FOUND, body),
            "Model not found"
        );
        assert_eq!(
            HttpSource::error_message(StatusCode::BAD_GATEWAY, "<html>"),
            "Bad Gateway"
        );
        assert!(HttpSource::new("not a url").is_err());
    }
}
