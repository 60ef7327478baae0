//! Application constants for the query cache
//!
//! Defaults shared by the configuration layer, the cache store and the
//! simulation binary.

/// Cache behaviour defaults
pub mod cache {
    /// Whether an attach to an already settled entry triggers a revalidation
    pub const REVALIDATE_ON_ATTACH: bool = true;

    /// First subscriber id handed out by a fresh store
    pub const FIRST_SUBSCRIBER_ID: u64 = 1;

    /// First fetch attempt id handed out by a fresh store
    pub const FIRST_FETCH_ID: u64 = 1;
}

/// Logging defaults
pub mod logging {
    /// Tracing target used by this crate
    pub const TARGET: &str = "query_cache";

    /// Default log level
    pub const DEFAULT_LEVEL: &str = "info";

    /// Levels accepted in configuration files
    pub const VALID_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
}

/// Configuration file defaults
pub mod config {
    /// Config file looked up in the working directory when none is given
    pub const DEFAULT_FILE_NAME: &str = "query-cache.toml";
}

/// Simulation binary defaults
pub mod simulation {
    /// Number of distinct keys queried
    pub const DEFAULT_KEY_COUNT: usize = 4;

    /// Number of simulated consumers
    pub const DEFAULT_CONSUMER_COUNT: usize = 16;

    /// Rounds each consumer performs
    pub const DEFAULT_ROUNDS: usize = 5;

    /// Minimum simulated fetch latency (milliseconds)
    pub const MIN_LATENCY_MS: u64 = 5;

    /// Maximum simulated fetch latency (milliseconds)
    pub const MAX_LATENCY_MS: u64 = 50;

    /// Fraction of fetches that fail
    pub const DEFAULT_FAILURE_RATE: f64 = 0.1;
}

// Re-export commonly used constants at module level for convenience
pub use cache::REVALIDATE_ON_ATTACH;
pub use logging::DEFAULT_LEVEL as DEFAULT_LOG_LEVEL;
