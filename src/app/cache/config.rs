//! Cache configuration types and defaults
//!
//! This module contains the runtime configuration of a cache store: how
//! overlapping fetch settlements are resolved and whether attaching to an
//! already settled entry triggers a revalidation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::cache;
use crate::errors::ConfigError;

/// How a settlement is applied when several fetches for one key overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPolicy {
    /// Every settlement is applied in completion order; the last one to
    /// complete wins, even if a newer fetch was issued after it started
    #[default]
    LastSettled,
    /// Only the most recently issued fetch for an entry may settle it;
    /// settlements of superseded attempts are discarded
    LatestIssued,
}

impl SettlementPolicy {
    /// Name used in configuration files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementPolicy::LastSettled => "last_settled",
            SettlementPolicy::LatestIssued => "latest_issued",
        }
    }
}

impl fmt::Display for SettlementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "last_settled" => Ok(SettlementPolicy::LastSettled),
            "latest_issued" => Ok(SettlementPolicy::LatestIssued),
            _ => Err(ConfigError::InvalidValue {
                field: "settlement".to_string(),
                value: s.to_string(),
                reason: "Expected last_settled or latest_issued".to_string(),
            }),
        }
    }
}

/// Configuration for a cache store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Resolution of overlapping fetch settlements
    pub settlement: SettlementPolicy,
    /// Refetch when attaching to an entry that already succeeded or failed
    pub revalidate_on_attach: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            settlement: SettlementPolicy::default(),
            revalidate_on_attach: cache::REVALIDATE_ON_ATTACH,
        }
    }
}

impl CacheConfig {
    /// Set the settlement policy
    pub fn with_settlement(mut self, settlement: SettlementPolicy) -> Self {
        self.settlement = settlement;
        self
    }

    /// Enable or disable revalidation when attaching to a settled entry
    pub fn with_revalidate_on_attach(mut self, enabled: bool) -> Self {
        self.revalidate_on_attach = enabled;
        self
    }
}
