use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::error::CacheError;
use super::key::QueryKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Idle,
    Fetching,
    Stale,
    Error,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryStatus::Idle => "idle",
            EntryStatus::Fetching => "fetching",
            EntryStatus::Stale => "stale",
            EntryStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// The cache's view of one key.
///
/// Values are held as JSON so the store stays independent of entity types;
/// readers deserialize into the type they asked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub value: Option<Value>,
    pub status: EntryStatus,
    pub fetched_at: Option<DateTime<Utc>>,
    pub error: Option<CacheError>,
    /// Consecutive failed fetches since the last success. Consulted by the
    /// caller's retry policy; the cache itself never retries.
    pub failure_count: u32,
}

impl CacheEntry {
    pub(crate) fn absent(key: QueryKey) -> Self {
        Self {
            key,
            value: None,
            status: EntryStatus::Idle,
            fetched_at: None,
            error: None,
            failure_count: 0,
        }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Fresh iff idle, holding a value, and younger than `window`.
    /// A zero window is never fresh.
    pub fn is_fresh(&self, window: Duration, now: DateTime<Utc>) -> bool {
        if self.status != EntryStatus::Idle || self.value.is_none() {
            return false;
        }
        match self.fetched_at {
            Some(at) => now - at < window,
            None => false,
        }
    }

    /// True when the last fetch failed and the caller may try again.
    pub fn retry_eligible(&self) -> bool {
        self.status == EntryStatus::Error
            && self.error.as_ref().map(|e| e.is_retryable()).unwrap_or(false)
    }

    /// Decode the cached value.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<Result<T, CacheError>> {
        self.value.as_ref().map(decode_value::<T>)
    }

    pub fn age_minutes(&self) -> Option<i64> {
        self.fetched_at.map(|at| (Utc::now() - at).num_minutes())
    }

    pub fn age_display(&self) -> String {
        let minutes = match self.age_minutes() {
            Some(minutes) => minutes,
            None => return "never".to_string(),
        };
        if minutes < 1 {
            // Includes negative ages from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

pub(crate) fn decode_value<T: DeserializeOwned>(value: &Value) -> Result<T, CacheError> {
    serde_json::from_value(value.clone()).map_err(|e| CacheError::Transport {
        status: None,
        message: format!("Cached value has unexpected shape: {}", e),
    })
}
