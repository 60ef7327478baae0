//! Query Cache Library
//!
//! A client-side data-fetching cache. Consumers attach to a key with a fetcher;
//! concurrent consumers of the same key share one request and one entry, and
//! every state change is delivered to all of them synchronously. Entries are
//! removed as soon as their last consumer detaches.

pub mod app;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
