//! Read coordination: serve fresh entries, otherwise fetch exactly once per key.
//!
//! Every fetch runs on its own Tokio task and is exposed to readers as a
//! `Shared` future, so any number of concurrent readers of one key await the
//! same network call and receive the same outcome. Dropping a reader never
//! cancels the fetch; its result still lands in the store.
//!
//! Lock order is always in-flight table, then store.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::entry::{decode_value, EntryStatus};
use super::error::CacheError;
use super::freshness::FreshnessPolicy;
use super::key::{KeyPattern, QueryKey};
use super::store::{CacheStore, Invalidated};

type FetchOutcome = Result<Value, CacheError>;
type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

struct InFlight {
    id: u64,
    future: SharedFetch,
    requesters: usize,
}

/// What a reader should do, decided atomically under the in-flight lock.
enum Plan {
    /// Fresh, or stale but acceptable to the caller; no suspension.
    Cached(Value),
    /// Stale value returned now while a fetch refreshes it.
    Revalidating(Value),
    Wait(SharedFetch),
}

/// Snapshot handed to UI-style consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub status: EntryStatus,
    pub error: Option<CacheError>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> QueryState<T> {
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.status == EntryStatus::Fetching
    }
}

#[derive(Clone)]
pub struct ReadCoordinator {
    store: CacheStore,
    freshness: Arc<FreshnessPolicy>,
    inflight: Arc<Mutex<HashMap<QueryKey, InFlight>>>,
    next_id: Arc<AtomicU64>,
}

impl ReadCoordinator {
    pub fn new(store: CacheStore, freshness: FreshnessPolicy) -> Self {
        Self {
            store,
            freshness: Arc::new(freshness),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn freshness(&self) -> &FreshnessPolicy {
        &self.freshness
    }

    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<QueryKey, InFlight>> {
        self.inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the value for `key`, fetching it with `fetcher` unless a fresh
    /// entry or an in-flight fetch already covers it.
    ///
    /// `fetcher` is invoked at most once, and only when this call starts the
    /// fetch. It must not touch the cache synchronously.
    pub async fn read<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        match self.plan(key, fetcher, false) {
            Plan::Cached(value) | Plan::Revalidating(value) => decode_value(&value),
            Plan::Wait(fetch) => decode_value(&fetch.await?),
        }
    }

    /// Like `read`, but reports state instead of failing, and serves a stale
    /// value immediately while it is being refreshed. Waits only when there is
    /// nothing to show yet.
    pub async fn query<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> QueryState<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        match self.plan(key, fetcher, true) {
            Plan::Cached(value) => self.state_from(key, Ok(value), EntryStatus::Idle),
            Plan::Revalidating(value) => self.state_from(key, Ok(value), EntryStatus::Fetching),
            Plan::Wait(fetch) => {
                let outcome = fetch.await;
                let status = if outcome.is_ok() {
                    EntryStatus::Idle
                } else {
                    EntryStatus::Error
                };
                self.state_from(key, outcome, status)
            }
        }
    }

    /// Start a fetch for `key` if it is neither fresh nor in flight, without
    /// waiting for it. Must be called from within a Tokio runtime.
    /// Returns true when a new fetch was started.
    pub fn prefetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> bool
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let mut inflight = self.lock_inflight();
        if inflight.contains_key(key) || self.is_fresh(key) {
            return false;
        }
        self.start_fetch(&mut inflight, key, fetcher());
        true
    }

    fn state_from<T: DeserializeOwned>(
        &self,
        key: &QueryKey,
        outcome: FetchOutcome,
        status: EntryStatus,
    ) -> QueryState<T> {
        let entry = self.store.peek(key);
        let fetched_at = entry.as_ref().and_then(|e| e.fetched_at);
        match outcome.and_then(|value| decode_value::<T>(&value)) {
            Ok(data) => QueryState {
                data: Some(data),
                status,
                error: None,
                fetched_at,
            },
            Err(error) => QueryState {
                // Keep showing whatever was there before the failure
                data: entry
                    .and_then(|e| e.decode::<T>())
                    .and_then(|decoded| decoded.ok()),
                status: EntryStatus::Error,
                error: Some(error),
                fetched_at,
            },
        }
    }

    fn is_fresh(&self, key: &QueryKey) -> bool {
        self.store
            .get(key)
            .is_fresh(self.freshness.window(key.kind()), Utc::now())
    }

    fn plan<T, F, Fut>(&self, key: &QueryKey, fetcher: F, serve_stale: bool) -> Plan
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let mut inflight = self.lock_inflight();
        let entry = self.store.get(key);

        if let Some(record) = inflight.get_mut(key) {
            record.requesters += 1;
            debug!(key = %key, requesters = record.requesters, "Joining in-flight fetch");
            return match entry.value {
                Some(value) if serve_stale => Plan::Revalidating(value),
                _ => Plan::Wait(record.future.clone()),
            };
        }

        if entry.is_fresh(self.freshness.window(key.kind()), Utc::now()) {
            if let Some(value) = entry.value {
                debug!(key = %key, "Cache hit");
                return Plan::Cached(value);
            }
        }

        debug!(key = %key, status = %entry.status, "Cache miss");
        let fetch = self.start_fetch(&mut inflight, key, fetcher());
        match entry.value {
            Some(value) if serve_stale => Plan::Revalidating(value),
            _ => Plan::Wait(fetch),
        }
    }

    /// Spawn the fetch and register it. The caller holds the in-flight lock.
    fn start_fetch<T, Fut>(
        &self,
        inflight: &mut HashMap<QueryKey, InFlight>,
        key: &QueryKey,
        fetch: Fut,
    ) -> SharedFetch
    where
        T: Serialize + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let this = self.clone();
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(fetch).catch_unwind().await {
                Ok(Ok(data)) => serde_json::to_value(&data).map_err(|e| CacheError::Transport {
                    status: None,
                    message: format!("Failed to encode response: {}", e),
                }),
                Ok(Err(e)) => Err(CacheError::from_anyhow(&e)),
                Err(_) => Err(CacheError::Transport {
                    status: None,
                    message: "Fetch panicked".to_string(),
                }),
            };
            this.settle(&task_key, id, &outcome);
            outcome
        });

        let future = async move {
            handle.await.unwrap_or_else(|e| {
                Err(CacheError::Transport {
                    status: None,
                    message: format!("Fetch task failed: {}", e),
                })
            })
        }
        .boxed()
        .shared();

        inflight.insert(
            key.clone(),
            InFlight {
                id,
                future: future.clone(),
                requesters: 1,
            },
        );
        self.store.mark_fetching(key);
        info!(key = %key, fetch_id = id, "Fetch started");
        future
    }

    /// Store the outcome of fetch `id`, unless it was detached meanwhile.
    fn settle(&self, key: &QueryKey, id: u64, outcome: &FetchOutcome) {
        let mut inflight = self.lock_inflight();
        match inflight.get(key) {
            Some(record) if record.id == id => {}
            _ => {
                debug!(key = %key, fetch_id = id, "Detached fetch finished, result not stored");
                return;
            }
        }
        let requesters = inflight.remove(key).map(|r| r.requesters).unwrap_or(0);

        match outcome {
            Ok(value) => self.store.put(key, value.clone()),
            Err(error) => self.store.fail(key, error.clone()),
        }
        info!(key = %key, fetch_id = id, requesters, ok = outcome.is_ok(), "Fetch finished");
    }

    /// Forget in-flight fetches for the affected keys, then stale and evict
    /// them in the store. Both happen under the in-flight lock, so no reader
    /// can join a pre-invalidation fetch afterwards, and a detached fetch
    /// never writes its result.
    ///
    /// A detached fetch keeps running until its request completes. The next
    /// read of the same key registers a new fetch right away rather than
    /// waiting for it, so for that window two requests for one key can be
    /// on the wire. Only the registered one is ever stored.
    pub fn invalidate(&self, patterns: &[KeyPattern], evict: &[QueryKey]) -> Invalidated {
        let mut inflight = self.lock_inflight();
        let before = inflight.len();
        inflight.retain(|key, _| {
            !(evict.contains(key) || patterns.iter().any(|p| p.matches(key)))
        });
        let detached = before - inflight.len();
        if detached > 0 {
            debug!(detached, "Detached in-flight fetches");
        }
        self.store.invalidate(patterns, evict)
    }

    /// Forget every in-flight fetch and empty the store.
    pub fn teardown(&self) {
        let mut inflight = self.lock_inflight();
        inflight.clear();
        self.store.clear();
    }

    /// Number of readers attached to the in-flight fetch for `key`.
    pub fn requester_count(&self, key: &QueryKey) -> Option<usize> {
        self.lock_inflight().get(key).map(|r| r.requesters)
    }

    pub fn in_flight(&self) -> usize {
        self.lock_inflight().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::cache::key::EntityKind;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    fn coordinator() -> ReadCoordinator {
        ReadCoordinator::new(CacheStore::new(), FreshnessPolicy::default())
    }

    /// Fetcher that counts invocations and answers after `delay`.
    fn counted<T: Send + 'static>(
        calls: &Arc<AtomicUsize>,
        delay_ms: u64,
        result: T,
    ) -> impl FnOnce() -> BoxFuture<'static, anyhow::Result<T>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(StdDuration::from_millis(delay_ms)).await;
                Ok(result)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_share_one_fetch() {
        let reads = coordinator();
        let key = QueryKey::list(EntityKind::WorkLogs);
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            reads.read(&key, counted(&calls, 50, vec![1, 2])),
            reads.read(&key, counted(&calls, 50, vec![9])),
            reads.read(&key, counted(&calls, 50, vec![9])),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), vec![1, 2]);
        assert_eq!(b.unwrap(), vec![1, 2]);
        assert_eq!(c.unwrap(), vec![1, 2]);
        assert_eq!(reads.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requesters_are_counted() {
        let reads = coordinator();
        let key = QueryKey::list(EntityKind::Skills);
        let calls = Arc::new(AtomicUsize::new(0));

        assert!(reads.prefetch(&key, counted(&calls, 50, vec!["rust"])));
        assert_eq!(reads.requester_count(&key), Some(1));
        assert!(!reads.prefetch(&key, counted(&calls, 50, vec!["go"])));

        let value: Vec<String> = {
            let first = reads.read(&key, counted(&calls, 50, vec!["go".to_string()]));
            tokio::pin!(first);
            // Poll once so the reader registers before we look at the count
            assert!(futures::poll!(&mut first).is_pending());
            assert_eq!(reads.requester_count(&key), Some(2));
            first.await.unwrap()
        };
        assert_eq!(value, vec!["rust".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_entry_is_served_without_fetch() {
        let reads = coordinator();
        let key = QueryKey::list(EntityKind::Projects);
        let calls = Arc::new(AtomicUsize::new(0));

        let first: Vec<i64> = reads.read(&key, counted(&calls, 0, vec![7])).await.unwrap();
        let second: Vec<i64> = reads.read(&key, counted(&calls, 0, vec![8])).await.unwrap();

        assert_eq!(first, vec![7]);
        assert_eq!(second, vec![7]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refetches_after_window_elapses() {
        let reads = coordinator();
        let key = QueryKey::list(EntityKind::Users);
        let calls = Arc::new(AtomicUsize::new(0));

        let _: Vec<i64> = reads.read(&key, counted(&calls, 0, vec![1])).await.unwrap();
        let _: Vec<i64> = reads.read(&key, counted(&calls, 0, vec![1])).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        reads.store().backdate(&key, chrono::Duration::seconds(61));
        let again: Vec<i64> = reads.read(&key, counted(&calls, 0, vec![2])).await.unwrap();
        assert_eq!(again, vec![2]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_window_always_refetches() {
        let reads = coordinator();
        let key = QueryKey::list(EntityKind::Activities);
        let calls = Arc::new(AtomicUsize::new(0));

        let _: Vec<i64> = reads.read(&key, counted(&calls, 0, vec![1])).await.unwrap();
        let _: Vec<i64> = reads.read(&key, counted(&calls, 0, vec![1])).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_broadcast_and_not_sticky() {
        let reads = coordinator();
        let key = QueryKey::detail(EntityKind::Projects, 7);
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = |calls: &Arc<AtomicUsize>| {
            let calls = Arc::clone(calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(StdDuration::from_millis(10)).await;
                    Err::<i64, anyhow::Error>(ApiError::ServerError("down".to_string()).into())
                }
            }
        };

        let (a, b) = tokio::join!(
            reads.read::<i64, _, _>(&key, failing(&calls)),
            reads.read::<i64, _, _>(&key, failing(&calls)),
        );
        let a = a.unwrap_err();
        assert_eq!(a, b.unwrap_err());
        assert_eq!(a.status(), Some(500));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let entry = reads.store().get(&key);
        assert_eq!(entry.status, EntryStatus::Error);
        assert_eq!(entry.failure_count, 1);
        assert!(entry.retry_eligible());

        let value: i64 = reads.read(&key, counted(&calls, 0, 7)).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(reads.store().get(&key).failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_fetch_still_populates_cache() {
        let reads = coordinator();
        let key = QueryKey::list(EntityKind::Resources);
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let read = reads.read::<Vec<i64>, _, _>(&key, counted(&calls, 100, vec![3]));
            tokio::pin!(read);
            assert!(futures::poll!(&mut read).is_pending());
            // Reader goes away before the fetch completes
        }

        tokio::time::sleep(StdDuration::from_millis(200)).await;
        let entry = reads.store().get(&key);
        assert_eq!(entry.status, EntryStatus::Idle);
        assert_eq!(entry.value, Some(serde_json::json!([3])));
        assert_eq!(reads.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_serves_stale_value_while_revalidating() {
        let reads = coordinator();
        let key = QueryKey::list(EntityKind::Skills);
        let calls = Arc::new(AtomicUsize::new(0));

        let first: QueryState<Vec<String>> = reads
            .query(&key, counted(&calls, 10, vec!["first".to_string()]))
            .await;
        assert_eq!(first.data, Some(vec!["first".to_string()]));
        assert_eq!(first.status, EntryStatus::Idle);

        reads.invalidate(&[KeyPattern::Lists(EntityKind::Skills)], &[]);

        let second: QueryState<Vec<String>> = reads
            .query(&key, counted(&calls, 10, vec!["second".to_string()]))
            .await;
        assert_eq!(second.data, Some(vec!["first".to_string()]));
        assert_eq!(second.status, EntryStatus::Fetching);
        assert_eq!(reads.store().get(&key).status, EntryStatus::Fetching);
        assert_eq!(reads.requester_count(&key), Some(1));

        // A second view joins the running refetch and is counted
        let third: QueryState<Vec<String>> = reads
            .query(&key, counted(&calls, 10, vec!["third".to_string()]))
            .await;
        assert_eq!(third.data, Some(vec!["first".to_string()]));
        assert_eq!(third.status, EntryStatus::Fetching);
        assert_eq!(reads.requester_count(&key), Some(2));

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        let entry = reads.store().get(&key);
        assert_eq!(entry.value, Some(serde_json::json!(["second"])));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_query_reports_error_state() {
        let reads = coordinator();
        let key = QueryKey::detail(EntityKind::Projects, 99);

        let state: QueryState<i64> = reads
            .query(&key, || async {
                Err::<i64, anyhow::Error>(ApiError::NotFound("project 99".to_string()).into())
            })
            .await;

        assert!(state.data.is_none());
        assert_eq!(state.status, EntryStatus::Error);
        assert!(state.error.unwrap().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidated_fetch_does_not_overwrite() {
        let reads = coordinator();
        let key = QueryKey::detail(EntityKind::Projects, 7);
        let calls = Arc::new(AtomicUsize::new(0));

        assert!(reads.prefetch(&key, counted(&calls, 50, 1i64)));
        let result = reads.invalidate(&[], std::slice::from_ref(&key));
        assert_eq!(result.removed, vec![key.clone()]);
        assert_eq!(reads.in_flight(), 0);

        tokio::time::sleep(StdDuration::from_millis(100)).await;
        assert!(reads.store().peek(&key).is_none());

        let value: i64 = reads.read(&key, counted(&calls, 0, 2i64)).await.unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_teardown_empties_everything() {
        let reads = coordinator();
        let key = QueryKey::list(EntityKind::Projects);
        let _: Vec<i64> = reads.read(&key, || async { Ok::<_, anyhow::Error>(vec![1]) }).await.unwrap();
        assert_eq!(reads.store().len(), 1);

        reads.teardown();
        assert!(reads.store().is_empty());
        assert_eq!(reads.in_flight(), 0);
    }
}
