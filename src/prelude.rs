//! Prelude module for the query cache
//!
//! Re-exports the items needed for typical usage with a single
//! `use query_cache::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust
//! use query_cache::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! LocalSet::new()
//!     .run_until(async {
//!         let store: CacheStore<u32, String, String> = CacheStore::new();
//!         let binding = QueryBinding::attach(&store, Some(7), from_fn(|| Ok("seven".to_string())), |_| {});
//!         assert_eq!(binding.current().status(), Some(QueryStatus::Loading));
//!     })
//!     .await;
//! # }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Essential components
pub use crate::app::{
    CacheConfig, CacheEntry, CacheKey, CacheStore, EntryState, Fetcher, QueryBinding, QueryHandle,
    QueryResult, QueryStatus, SettlementPolicy, StoreStats, from_fn,
};

// Configuration file model
pub use crate::config::AppConfig;

// Standard library re-exports that are commonly needed
pub use std::rc::Rc;

// Bindings run on a LocalSet
pub use tokio::task::LocalSet;
