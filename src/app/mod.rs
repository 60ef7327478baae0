//! Core application logic for the query cache
//!
//! This module contains the cache store that owns entries and the query layer
//! that binds consumers to them.

pub mod cache;
pub mod query;

// Re-export main public API
pub use cache::{
    CacheConfig, CacheEntry, CacheKey, CacheStore, EntryState, QueryStatus, SettlementPolicy,
    StoreStats, SubscriberId,
};
pub use query::{FetchFuture, Fetcher, QueryBinding, QueryHandle, QueryResult, from_fn};
