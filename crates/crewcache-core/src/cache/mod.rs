//! Client-side data cache and invalidation layer.
//!
//! Fetched entity collections are stored per `QueryKey` as JSON, served while
//! fresh, fetched at most once per key under concurrent readers, and staled or
//! evicted when a mutation declares them affected.
//!
//! Freshness windows:
//! - Users: 60 seconds
//! - Projects: 5 minutes
//! - Everything else: refetched on every read not covered by an in-flight fetch

pub mod client;
pub mod entry;
pub mod error;
pub mod freshness;
pub mod key;
pub mod mutation;
pub mod read;
pub mod store;

pub use client::QueryClient;
pub use entry::{CacheEntry, EntryStatus};
pub use error::CacheError;
pub use freshness::FreshnessPolicy;
pub use key::{key_for, EntityKind, KeyPattern, ParamValue, Params, QueryKey, Scope};
pub use mutation::{Invalidation, Mutation, MutationCoordinator};
pub use read::{QueryState, ReadCoordinator};
pub use store::{CacheEvent, CacheStore, Invalidated, KeyWatcher};
