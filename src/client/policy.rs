//! Retry policy and `fetch_with_policy`
//!
//! A policy bundles the retry bound, the backoff schedule and the predicate
//! that decides which failures are worth another attempt.

use backon::{ExponentialBuilder, Retryable};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::config::ClientConfig;

/// Why a fetch failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// 401 from the server
    #[error("Unauthorized")]
    Unauthorized,

    /// Any other non-success status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection, DNS, timeout or body transfer failure
    #[error("Network error: {0}")]
    Network(String),

    /// The body was not a JSON array of listings
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(500..=599))
    }
}

/// Network failures and 5xx are retried. 401, other 4xx and malformed
/// bodies are terminal.
pub fn default_retryable(error: &FetchError) -> bool {
    match error {
        FetchError::Network(_) => true,
        FetchError::Status { .. } => error.is_server_error(),
        FetchError::Unauthorized | FetchError::Malformed(_) => false,
    }
}

/// Exponential backoff: starts at `base`, doubles, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// Retry bound, backoff schedule and retry predicate
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first call
    pub max_retries: u32,
    pub backoff: Backoff,
    pub retryable: fn(&FetchError) -> bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
            retryable: default_retryable,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.max_retries,
            Backoff::exponential(
                Duration::from_millis(config.backoff_base_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
        )
    }

    /// Never retry
    pub fn none() -> Self {
        Self::new(0, Backoff::default())
    }

    pub fn with_retryable(mut self, retryable: fn(&FetchError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// The delay schedule, at most `max_retries` entries.
    pub fn backoff_builder(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.backoff.base)
            .with_factor(2.0)
            .with_max_delay(self.backoff.max)
            .with_max_times(self.max_retries as usize)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Backoff::default())
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Run `operation` until it succeeds, fails terminally, or the retry bound
/// is spent. The closure receives the zero-based attempt number.
pub async fn fetch_with_policy<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0;
    (|| {
        let current = attempt;
        attempt += 1;
        operation(current)
    })
    .retry(policy.backoff_builder())
    .sleep(tokio::time::sleep)
    .when(policy.retryable)
    .notify(|error: &FetchError, delay: Duration| {
        debug!(delay_ms = delay.as_millis() as u64, error = %error, "Retrying fetch");
    })
    .await
}
