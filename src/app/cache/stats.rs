//! Cache statistics
//!
//! Counters maintained by a store as entries are created and removed,
//! subscribers come and go, and fetches are issued and settled.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Counters describing the activity of one store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Entries created on first attach
    pub entries_created: u64,
    /// Entries removed after their last subscriber detached
    pub entries_removed: u64,
    /// Subscribers registered
    pub subscribers_attached: u64,
    /// Subscribers removed
    pub subscribers_detached: u64,
    /// Fetches issued
    pub fetches_started: u64,
    /// Fetches that settled with data
    pub fetches_succeeded: u64,
    /// Fetches that settled with an error
    pub fetches_failed: u64,
    /// Settlements dropped because their entry was gone or a newer fetch was issued
    pub settlements_discarded: u64,
    /// Explicit data writes that bypassed the fetcher
    pub manual_updates: u64,
    /// Listener invocations
    pub notifications_delivered: u64,
}

impl StoreStats {
    /// Create zeroed statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches that have settled and were applied
    pub fn fetches_settled(&self) -> u64 {
        self.fetches_succeeded + self.fetches_failed
    }

    /// Fetches still outstanding
    pub fn fetches_in_flight(&self) -> u64 {
        self.fetches_started
            .saturating_sub(self.fetches_settled() + self.settlements_discarded)
    }

    /// Success rate over applied settlements as a percentage
    pub fn success_rate(&self) -> f64 {
        let settled = self.fetches_settled();
        if settled == 0 {
            0.0
        } else {
            (self.fetches_succeeded as f64 / settled as f64) * 100.0
        }
    }

    /// Entries currently alive according to the counters
    pub fn live_entries(&self) -> u64 {
        self.entries_created.saturating_sub(self.entries_removed)
    }
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entries {}/{} (created/removed), subscribers {}/{} (attached/detached), \
             fetches {} started, {} ok, {} failed, {} discarded ({:.1}% success), \
             {} manual updates, {} notifications",
            self.entries_created,
            self.entries_removed,
            self.subscribers_attached,
            self.subscribers_detached,
            self.fetches_started,
            self.fetches_succeeded,
            self.fetches_failed,
            self.settlements_discarded,
            self.success_rate(),
            self.manual_updates,
            self.notifications_delivered,
        )
    }
}
