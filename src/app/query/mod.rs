//! Query bindings, results and fetchers
//!
//! A [`QueryBinding`] connects one consumer to the shared entry of a key in a
//! [`CacheStore`](crate::app::cache::CacheStore). Every change to the entry is
//! published as a [`QueryResult`] to all bindings observing the key, in attach
//! order, within the same turn.
//!
//! # Module Organization
//!
//! - [`binding`] - Attach/detach lifecycle and fetch triggering
//! - [`result`] - Result projection and the `set_data`/`refetch` actions
//! - [`fetcher`] - The fetcher abstraction
//!
//! # Examples
//!
//! ```rust
//! use query_cache::app::cache::CacheStore;
//! use query_cache::app::query::{QueryBinding, from_fn};
//! use tokio::task::LocalSet;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! LocalSet::new()
//!     .run_until(async {
//!         let store: CacheStore<&str, u32, String> = CacheStore::new();
//!         let binding = QueryBinding::attach(&store, Some("answer"), from_fn(|| Ok(42)), |result| {
//!             println!("status: {:?}", result.status());
//!         });
//!         assert!(binding.current().is_loading());
//!
//!         tokio::task::yield_now().await;
//!         tokio::task::yield_now().await;
//!         assert_eq!(binding.current().data(), Some(&42));
//!     })
//!     .await;
//! # }
//! ```

pub mod binding;
pub mod fetcher;
pub mod result;

// Re-export main public API
pub use binding::QueryBinding;
pub use fetcher::{FetchFuture, Fetcher, FromFn, from_fn};
pub use result::{QueryHandle, QueryResult};
