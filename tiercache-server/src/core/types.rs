use super::error::CacheError;
use serde::{Deserialize, Deserializer, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Value handle held by the tier stores.
///
/// Entries are shared by reference: a hit hands out another `Arc` to the
/// same allocation, so callers must copy before mutating.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// One of the three fixed cache tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Short-lived results (5 minutes by default)
    Hot,
    /// Medium-lived results (30 minutes by default)
    Warm,
    /// Long-lived results (24 hours by default)
    Cold,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Hot, Tier::Warm, Tier::Cold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }
}

impl FromStr for Tier {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" => Ok(Self::Hot),
            "warm" => Ok(Self::Warm),
            "cold" => Ok(Self::Cold),
            other => Err(CacheError::UnknownTier(other.to_string())),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TTL and sweep settings for a single tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Default time-to-live applied to every entry stored in the tier
    pub ttl_secs: u64,
    /// Interval of the background purge of expired entries
    pub sweep_interval_secs: u64,
}

impl TierConfig {
    pub fn new(ttl_secs: u64, sweep_interval_secs: u64) -> Self {
        Self {
            ttl_secs,
            sweep_interval_secs,
        }
    }

    /// Built-in defaults for a tier
    pub fn default_for(tier: Tier) -> Self {
        match tier {
            Tier::Hot => Self::new(300, 60),
            Tier::Warm => Self::new(1800, 300),
            Tier::Cold => Self::new(86400, 3600),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        // tokio::time::interval panics on a zero period
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Tier block as written in a config file, with every field optional
#[derive(Deserialize)]
struct PartialTierConfig {
    ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

/// Fill the fields a tier block leaves out from that tier's defaults
fn deserialize_tier<'de, D>(tier: Tier, deserializer: D) -> Result<TierConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let partial = PartialTierConfig::deserialize(deserializer)?;
    let defaults = TierConfig::default_for(tier);
    Ok(TierConfig {
        ttl_secs: partial.ttl_secs.unwrap_or(defaults.ttl_secs),
        sweep_interval_secs: partial
            .sweep_interval_secs
            .unwrap_or(defaults.sweep_interval_secs),
    })
}

fn deserialize_hot<'de, D: Deserializer<'de>>(d: D) -> Result<TierConfig, D::Error> {
    deserialize_tier(Tier::Hot, d)
}

fn deserialize_warm<'de, D: Deserializer<'de>>(d: D) -> Result<TierConfig, D::Error> {
    deserialize_tier(Tier::Warm, d)
}

fn deserialize_cold<'de, D: Deserializer<'de>>(d: D) -> Result<TierConfig, D::Error> {
    deserialize_tier(Tier::Cold, d)
}

/// Configuration for the tiered cache engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(deserialize_with = "deserialize_hot")]
    pub hot: TierConfig,
    #[serde(deserialize_with = "deserialize_warm")]
    pub warm: TierConfig,
    #[serde(deserialize_with = "deserialize_cold")]
    pub cold: TierConfig,
    /// Estimated price of one producer call, used for `estimated_cost_saved`
    pub cost_per_call: f64,
    /// Periodic stats log interval in seconds, 0 disables the reporter
    pub stats_report_interval_secs: u64,
}

impl CacheConfig {
    pub fn tier(&self, tier: Tier) -> TierConfig {
        match tier {
            Tier::Hot => self.hot,
            Tier::Warm => self.warm,
            Tier::Cold => self.cold,
        }
    }

    pub fn tier_mut(&mut self, tier: Tier) -> &mut TierConfig {
        match tier {
            Tier::Hot => &mut self.hot,
            Tier::Warm => &mut self.warm,
            Tier::Cold => &mut self.cold,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot: TierConfig::default_for(Tier::Hot),
            warm: TierConfig::default_for(Tier::Warm),
            cold: TierConfig::default_for(Tier::Cold),
            cost_per_call: 0.002,
            stats_report_interval_secs: 300,
        }
    }
}

/// Entry held inside a tier store
#[derive(Debug, Clone)]
pub struct StoredEntry<V> {
    pub value: V,
    /// `None` when the TTL is too large to represent as an instant
    pub expires_at: Option<Instant>,
}

impl<V> StoredEntry<V> {
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Statistics kept by a tier store itself.
///
/// These include lookups that the engine does not count (peeks, reads that
/// hit an expired entry), so they need not match the engine counters.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Live keys at the time of the snapshot
    pub keys: usize,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Entries dropped because their TTL elapsed
    pub expired: u64,
    /// Completed sweep passes
    pub sweeps: u64,
}

/// Engine-wide counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineCounters {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub total_saved: u64,
}

impl EngineCounters {
    /// Hit percentage, `None` before the first lookup
    pub fn hit_ratio(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        if total == 0 {
            None
        } else {
            Some(self.hits as f64 / total as f64 * 100.0)
        }
    }
}

/// Per-tier part of a stats snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSnapshot {
    pub keys: usize,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub store: StoreStats,
}

/// Point-in-time copy of the engine statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub total_saved: u64,
    /// `hits / (hits + misses)` formatted as `"NN.NN%"`
    pub hit_rate: String,
    pub estimated_cost_saved: f64,
    pub tiers: BTreeMap<String, TierSnapshot>,
}

/// Per-tier removal counts of an invalidate or clear call
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationReport {
    pub removed: BTreeMap<String, usize>,
}

impl InvalidationReport {
    pub fn total(&self) -> usize {
        self.removed.values().sum()
    }

    pub fn removed_from(&self, tier: Tier) -> usize {
        self.removed.get(tier.as_str()).copied().unwrap_or(0)
    }
}
