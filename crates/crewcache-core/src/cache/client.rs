//! The per-session cache context.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use super::error::CacheError;
use super::freshness::FreshnessPolicy;
use super::key::QueryKey;
use super::mutation::{Invalidation, Mutation, MutationCoordinator};
use super::read::{QueryState, ReadCoordinator};
use super::store::{CacheEvent, CacheStore, KeyWatcher};

/// One store plus the coordinators that operate on it.
///
/// Created at login and torn down at logout. Clones share the same cache.
#[derive(Clone)]
pub struct QueryClient {
    store: CacheStore,
    reads: ReadCoordinator,
    mutations: MutationCoordinator,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(FreshnessPolicy::default())
    }
}

impl QueryClient {
    pub fn new(freshness: FreshnessPolicy) -> Self {
        let store = CacheStore::new();
        let reads = ReadCoordinator::new(store.clone(), freshness);
        let mutations = MutationCoordinator::new(reads.clone());
        Self {
            store,
            reads,
            mutations,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn reads(&self) -> &ReadCoordinator {
        &self.reads
    }

    pub async fn read<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.reads.read(key, fetcher).await
    }

    pub async fn query<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> QueryState<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.reads.query(key, fetcher).await
    }

    pub fn prefetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> bool
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.reads.prefetch(key, fetcher)
    }

    pub async fn mutate<R, Fut>(&self, invalidation: &Invalidation, operation: Fut) -> anyhow::Result<R>
    where
        Fut: Future<Output = anyhow::Result<R>>,
    {
        self.mutations.mutate(invalidation, operation).await
    }

    pub async fn run<R, Fut>(&self, mutation: Mutation, operation: Fut) -> anyhow::Result<R>
    where
        Fut: Future<Output = anyhow::Result<R>>,
    {
        self.mutations.run(mutation, operation).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.store.subscribe()
    }

    pub fn watch(&self, key: QueryKey) -> KeyWatcher {
        self.store.watch(key)
    }

    /// Drop every cached entry and forget in-flight fetches. Fetches already
    /// running finish on their own but their results are discarded.
    pub fn teardown(&self) {
        let entries = self.store.len();
        self.reads.teardown();
        info!(entries, "Query client torn down");
    }
}
