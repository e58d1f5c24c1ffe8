//! Caller-side retry for cache reads.
//!
//! The cache never retries on its own. A failed fetch is recorded on the entry
//! with a failure count, and this policy decides whether and when to read again.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::cache::{CacheError, QueryClient, QueryKey};

/// Cap on the backoff doubling exponent
const MAX_BACKOFF_SHIFT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before the next attempt, given consecutive failures so far.
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        self.initial_backoff.saturating_mul(1u32 << shift)
    }

    /// `QueryClient::read`, re-issued after retryable failures.
    ///
    /// `fetcher` builds a fresh request for each attempt that starts a fetch.
    pub async fn read<T, F, Fut>(
        &self,
        client: &QueryClient,
        key: &QueryKey,
        mut fetcher: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let mut attempt = 0;
        loop {
            match client.read(key, &mut fetcher).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let failures = client
                        .store()
                        .peek(key)
                        .map(|entry| entry.failure_count)
                        .unwrap_or(attempt);
                    let delay = self.backoff_for(failures);
                    warn!(
                        key = %key,
                        attempt,
                        failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Read failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::cache::{EntityKind, EntryStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fetcher that fails with `error` for the first `failures` calls.
    fn flaky(
        calls: &Arc<AtomicUsize>,
        failures: usize,
        error: fn() -> ApiError,
    ) -> impl FnMut() -> futures::future::BoxFuture<'static, anyhow::Result<Vec<i64>>> {
        use futures::FutureExt;
        let calls = Arc::clone(calls);
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < failures {
                    Err(anyhow::Error::from(error()))
                } else {
                    Ok(vec![42])
                }
            }
            .boxed()
        }
    }

    fn server_error() -> ApiError {
        ApiError::ServerError("unavailable".to_string())
    }

    fn not_found() -> ApiError {
        ApiError::NotFound("project 9".to_string())
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(0), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures() {
        let client = QueryClient::default();
        let key = QueryKey::list(EntityKind::Activities);
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(100));

        let started = tokio::time::Instant::now();
        let value = policy
            .read(&client, &key, flaky(&calls, 2, server_error))
            .await
            .unwrap();

        assert_eq!(value, vec![42]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(client.store().get(&key).failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_retried() {
        let client = QueryClient::default();
        let key = QueryKey::detail(EntityKind::Projects, 9);
        let calls = Arc::new(AtomicUsize::new(0));

        let err = RetryPolicy::default()
            .read(&client, &key, flaky(&calls, 5, not_found))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let client = QueryClient::default();
        let key = QueryKey::list(EntityKind::Resources);
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(2, Duration::from_millis(10));

        let err = policy
            .read(&client, &key, flaky(&calls, 10, server_error))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let entry = client.store().get(&key);
        assert_eq!(entry.status, EntryStatus::Error);
        assert_eq!(entry.failure_count, 3);
        assert!(entry.retry_eligible());
    }
}
