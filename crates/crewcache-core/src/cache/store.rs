//! Cache store: one entry per query key plus a change feed.
//!
//! The store is the only shared mutable state of the query cache. Every
//! change goes through the methods below, each taking the lock once and
//! emitting a `CacheEvent` after releasing it. Clones share the same state.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::entry::{CacheEntry, EntryStatus};
use super::error::CacheError;
use super::key::{KeyPattern, QueryKey};

/// Buffer size of the change feed.
/// A subscriber that falls further behind than this re-reads current state.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A change to the store, as seen by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    Fetching(QueryKey),
    Updated(QueryKey),
    Failed(QueryKey, CacheError),
    /// Every key staled by one invalidation, delivered together.
    Stale(Vec<QueryKey>),
    Removed(QueryKey),
    Cleared,
}

impl CacheEvent {
    pub fn affects(&self, key: &QueryKey) -> bool {
        match self {
            CacheEvent::Fetching(k)
            | CacheEvent::Updated(k)
            | CacheEvent::Failed(k, _)
            | CacheEvent::Removed(k) => k == key,
            CacheEvent::Stale(keys) => keys.contains(key),
            CacheEvent::Cleared => true,
        }
    }
}

/// Keys touched by one invalidation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invalidated {
    pub staled: Vec<QueryKey>,
    pub removed: Vec<QueryKey>,
}

#[derive(Clone)]
pub struct CacheStore {
    entries: Arc<Mutex<HashMap<QueryKey, CacheEntry>>>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, CacheEntry>> {
        // Nothing panics while holding the lock, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Entry for `key`, creating an absent one if none exists.
    pub fn get(&self, key: &QueryKey) -> CacheEntry {
        self.lock()
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::absent(key.clone()))
            .clone()
    }

    /// Entry for `key` without creating it.
    pub fn peek(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Replace the value, mark idle and refresh the fetch time.
    pub fn put(&self, key: &QueryKey, value: Value) {
        {
            let mut entries = self.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::absent(key.clone()));
            entry.value = Some(value);
            entry.status = EntryStatus::Idle;
            entry.fetched_at = Some(Utc::now());
            entry.error = None;
            entry.failure_count = 0;
        }
        debug!(key = %key, "Cache entry updated");
        self.emit(CacheEvent::Updated(key.clone()));
    }

    /// Flag a fetch as started. The previous value stays readable.
    pub fn mark_fetching(&self, key: &QueryKey) {
        {
            let mut entries = self.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::absent(key.clone()));
            entry.status = EntryStatus::Fetching;
        }
        self.emit(CacheEvent::Fetching(key.clone()));
    }

    /// Record a failed fetch. The previous value, if any, is kept.
    pub fn fail(&self, key: &QueryKey, error: CacheError) {
        let failures = {
            let mut entries = self.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::absent(key.clone()));
            entry.status = EntryStatus::Error;
            entry.error = Some(error.clone());
            entry.failure_count = entry.failure_count.saturating_add(1);
            entry.failure_count
        };
        warn!(key = %key, failures, error = %error, "Cache fetch failed");
        self.emit(CacheEvent::Failed(key.clone(), error));
    }

    /// Mark every existing entry matched by any pattern as stale.
    /// Entries that do not exist yet are not created.
    pub fn mark_stale(&self, patterns: &[KeyPattern]) -> Vec<QueryKey> {
        self.invalidate(patterns, &[]).staled
    }

    /// Delete an entry entirely.
    pub fn remove(&self, key: &QueryKey) -> Option<CacheEntry> {
        let removed = self.lock().remove(key);
        if removed.is_some() {
            debug!(key = %key, "Cache entry removed");
            self.emit(CacheEvent::Removed(key.clone()));
        }
        removed
    }

    /// Stale `patterns` and remove `evict` under a single lock, so no reader
    /// observes part of the invalidation.
    pub fn invalidate(&self, patterns: &[KeyPattern], evict: &[QueryKey]) -> Invalidated {
        let mut result = Invalidated::default();
        {
            let mut entries = self.lock();
            for key in evict {
                if entries.remove(key).is_some() {
                    result.removed.push(key.clone());
                }
            }
            for (key, entry) in entries.iter_mut() {
                if patterns.iter().any(|p| p.matches(key)) {
                    entry.status = EntryStatus::Stale;
                    result.staled.push(key.clone());
                }
            }
        }
        result.staled.sort();

        if !result.staled.is_empty() {
            debug!(count = result.staled.len(), "Cache entries marked stale");
            self.emit(CacheEvent::Stale(result.staled.clone()));
        }
        for key in &result.removed {
            self.emit(CacheEvent::Removed(key.clone()));
        }
        result
    }

    /// Drop every entry. Used at session teardown.
    pub fn clear(&self) {
        let count = {
            let mut entries = self.lock();
            let count = entries.len();
            entries.clear();
            count
        };
        debug!(count, "Cache cleared");
        self.emit(CacheEvent::Cleared);
    }

    /// Copy of every entry, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<QueryKey, CacheEntry> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Receive every change to the store.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Receive the entry for `key` each time it changes.
    pub fn watch(&self, key: QueryKey) -> KeyWatcher {
        KeyWatcher {
            rx: self.subscribe(),
            store: self.clone(),
            key,
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, key: &QueryKey, by: chrono::Duration) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.fetched_at = entry.fetched_at.map(|at| at - by);
        }
    }
}

/// Subscription to one key.
pub struct KeyWatcher {
    rx: broadcast::Receiver<CacheEvent>,
    store: CacheStore,
    key: QueryKey,
}

impl KeyWatcher {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Wait for the next change to the watched key and return its entry.
    /// A removed key yields an absent entry. Returns `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<CacheEntry> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.affects(&self.key) => return Some(self.current()),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(key = %self.key, skipped, "Watcher lagged, re-reading entry");
                    return Some(self.current());
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn current(&self) -> CacheEntry {
        self.store
            .peek(&self.key)
            .unwrap_or_else(|| CacheEntry::absent(self.key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::{EntityKind, Scope};
    use serde_json::json;

    fn projects() -> QueryKey {
        QueryKey::list(EntityKind::Projects)
    }

    fn project(id: i64) -> QueryKey {
        QueryKey::detail(EntityKind::Projects, id)
    }

    #[test]
    fn test_get_creates_absent_entry() {
        let store = CacheStore::new();
        assert!(store.peek(&projects()).is_none());

        let entry = store.get(&projects());
        assert!(!entry.has_value());
        assert_eq!(entry.status, EntryStatus::Idle);
        assert!(store.contains(&projects()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_put_sets_idle_and_clears_error() {
        let store = CacheStore::new();
        store.fail(&projects(), CacheError::Validation("bad".to_string()));
        store.fail(&projects(), CacheError::Validation("bad".to_string()));
        assert_eq!(store.get(&projects()).failure_count, 2);

        store.put(&projects(), json!([{"id": 1}]));
        let entry = store.get(&projects());
        assert_eq!(entry.status, EntryStatus::Idle);
        assert_eq!(entry.value, Some(json!([{"id": 1}])));
        assert!(entry.fetched_at.is_some());
        assert!(entry.error.is_none());
        assert_eq!(entry.failure_count, 0);
    }

    #[test]
    fn test_fail_keeps_previous_value() {
        let store = CacheStore::new();
        store.put(&projects(), json!([1]));
        store.fail(
            &projects(),
            CacheError::Transport {
                status: Some(500),
                message: "boom".to_string(),
            },
        );

        let entry = store.get(&projects());
        assert_eq!(entry.status, EntryStatus::Error);
        assert_eq!(entry.value, Some(json!([1])));
        assert!(entry.retry_eligible());
    }

    #[test]
    fn test_mark_stale_leaves_value_and_other_keys() {
        let store = CacheStore::new();
        store.put(&projects(), json!([1]));
        store.put(&project(7), json!({"id": 7}));
        store.put(&project(8), json!({"id": 8}));
        store.put(&QueryKey::list(EntityKind::Skills), json!([]));

        let staled = store.mark_stale(&[KeyPattern::Lists(EntityKind::Projects), project(7).into()]);
        assert_eq!(staled, vec![projects(), project(7)]);

        assert_eq!(store.get(&projects()).status, EntryStatus::Stale);
        assert_eq!(store.get(&projects()).value, Some(json!([1])));
        assert_eq!(store.get(&project(7)).status, EntryStatus::Stale);
        assert_eq!(store.get(&project(8)).status, EntryStatus::Idle);
        assert_eq!(
            store.get(&QueryKey::list(EntityKind::Skills)).status,
            EntryStatus::Idle
        );
    }

    #[test]
    fn test_bare_list_key_stales_filtered_lists() {
        let store = CacheStore::new();
        let active = QueryKey::filtered(EntityKind::Projects, [("status", "active")]);
        store.put(&projects(), json!([1, 2]));
        store.put(&active, json!([1]));
        store.put(&project(7), json!({"id": 7}));

        let staled = store.mark_stale(&[projects().into()]);
        assert_eq!(staled, vec![projects(), active.clone()]);

        assert_eq!(store.get(&active).status, EntryStatus::Stale);
        assert_eq!(store.get(&project(7)).status, EntryStatus::Idle);
    }

    #[test]
    fn test_mark_stale_does_not_create_entries() {
        let store = CacheStore::new();
        let staled = store.mark_stale(&[project(7).into()]);
        assert!(staled.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_kind_pattern_covers_relationship_keys() {
        let store = CacheStore::new();
        let alice = QueryKey::scoped(EntityKind::UserSkills, Scope::user(1));
        let bob = QueryKey::scoped(EntityKind::UserSkills, Scope::user(2));
        store.put(&alice, json!([]));
        store.put(&bob, json!([]));

        let staled = store.mark_stale(&[KeyPattern::Kind(EntityKind::UserSkills)]);
        assert_eq!(staled.len(), 2);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = CacheStore::new();
        store.put(&project(7), json!({"id": 7}));
        store.put(&projects(), json!([]));

        assert!(store.remove(&project(7)).is_some());
        assert!(store.remove(&project(7)).is_none());
        assert!(!store.contains(&project(7)));

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let store = CacheStore::new();
        let other = store.clone();
        store.put(&projects(), json!([1]));
        assert_eq!(other.get(&projects()).value, Some(json!([1])));
    }

    #[tokio::test]
    async fn test_invalidation_is_one_event() {
        let store = CacheStore::new();
        store.put(&projects(), json!([]));
        store.put(&project(7), json!({}));
        store.put(&project(8), json!({}));
        let mut rx = store.subscribe();

        let result = store.invalidate(&[KeyPattern::Lists(EntityKind::Projects), project(7).into()], &[project(8)]);
        assert_eq!(result.staled, vec![projects(), project(7)]);
        assert_eq!(result.removed, vec![project(8)]);

        assert_eq!(
            rx.recv().await.unwrap(),
            CacheEvent::Stale(vec![projects(), project(7)])
        );
        assert_eq!(rx.recv().await.unwrap(), CacheEvent::Removed(project(8)));
    }

    #[tokio::test]
    async fn test_watcher_sees_only_its_key() {
        let store = CacheStore::new();
        let mut watcher = store.watch(project(7));

        store.put(&project(8), json!({"id": 8}));
        store.put(&project(7), json!({"id": 7}));

        let entry = watcher.changed().await.unwrap();
        assert_eq!(entry.key, project(7));
        assert_eq!(entry.value, Some(json!({"id": 7})));

        store.remove(&project(7));
        let entry = watcher.changed().await.unwrap();
        assert!(!entry.has_value());
    }
}
