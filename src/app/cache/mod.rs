//! Cache store and entry model
//!
//! This module provides the store that owns every cache entry and the types
//! describing an entry: its tagged fetch state and its ordered subscriber list.
//! Entries are reference counted by their subscribers; the store never keeps
//! an entry nobody observes.
//!
//! # Module Organization
//!
//! - [`config`] - Store configuration and settlement policy
//! - [`entry`] - Entry state, subscribers and status
//! - [`store`] - The store itself and its map contract
//! - [`stats`] - Store activity counters
//!
//! # Examples
//!
//! ```rust
//! use query_cache::app::cache::{CacheEntry, CacheStore};
//!
//! let store: CacheStore<&str, String, String> = CacheStore::new();
//! store.set("user:1", CacheEntry::new());
//!
//! assert!(store.has(&"user:1"));
//! assert!(store.delete(&"user:1"));
//! assert!(store.is_empty());
//! ```

pub mod config;
pub mod entry;
pub mod stats;
pub mod store;

// Re-export main public API
pub use config::{CacheConfig, SettlementPolicy};
pub use entry::{CacheEntry, EntryState, Listener, QueryStatus, Subscriber, SubscriberId};
pub use stats::StoreStats;
pub use store::{CacheKey, CacheStore};
