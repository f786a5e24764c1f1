use super::types::{StoreStats, StoredEntry, Tier, TierConfig};
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Expiring key-value store backing one cache tier.
///
/// Keys live in a radix trie so that all keys of an operation (which share
/// the `<operation>:` prefix) can be found without a full scan. Every entry
/// gets the tier's TTL at insertion time; expired entries are dropped when
/// read and by the periodic sweeper.
#[derive(Clone)]
pub struct TierStore<V> {
    tier: Tier,
    config: TierConfig,
    data: Arc<RwLock<Trie<String, StoredEntry<V>>>>,
    stats: Arc<RwLock<StoreStats>>,
}

impl<V: Clone + Send + Sync + 'static> TierStore<V> {
    pub fn new(tier: Tier, config: TierConfig) -> Self {
        debug!(
            "Initializing {} tier (ttl={}s, sweep={}s)",
            tier, config.ttl_secs, config.sweep_interval_secs
        );

        Self {
            tier,
            config,
            data: Arc::new(RwLock::new(Trie::new())),
            stats: Arc::new(RwLock::new(StoreStats::default())),
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn config(&self) -> TierConfig {
        self.config
    }

    /// Start background sweep of expired entries
    pub fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let period = self.config.sweep_interval();
        info!("Starting {} tier sweeper (interval={:?})", self.tier, period);

        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                store.sweep_expired();
            }
        })
    }

    /// Look up a live entry
    pub fn get(&self, key: &str) -> Option<V> {
        let mut data = self.data.write();
        let mut stats = self.stats.write();

        let expired = match data.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                stats.misses += 1;
                return None;
            }
        };

        if expired {
            debug!("Key expired in {} tier: {}", self.tier, key);
            data.remove(key);
            stats.expired += 1;
            stats.misses += 1;
            return None;
        }

        stats.hits += 1;
        data.get(key).map(|entry| entry.value.clone())
    }

    /// Store a value, replacing whatever was under the key
    pub fn set(&self, key: &str, value: V) {
        let entry = StoredEntry::new(value, self.config.ttl());

        let mut data = self.data.write();
        data.insert(key.to_string(), entry);

        self.stats.write().sets += 1;
    }

    /// Remove a single key
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.data.write().remove(key).is_some();
        if removed {
            self.stats.write().deletes += 1;
        }
        removed
    }

    /// Remove every key starting with `prefix`
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut data = self.data.write();

        let keys: Vec<String> = data
            .get_raw_descendant(prefix)
            .map(|subtrie| {
                subtrie
                    .keys()
                    .filter(|k| k.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for key in &keys {
            data.remove(key.as_str());
        }

        let count = keys.len();
        if count > 0 {
            self.stats.write().deletes += count as u64;
        }
        count
    }

    /// Drop every entry, returning how many were held
    pub fn clear(&self) -> usize {
        let mut data = self.data.write();
        let count = data.len();
        *data = Trie::new();

        self.stats.write().deletes += count as u64;
        count
    }

    /// Number of live (unexpired) keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data
            .read()
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists, without touching the hit counters
    pub fn contains(&self, key: &str) -> bool {
        self.data
            .read()
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Purge expired entries in one linear pass
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut data = self.data.write();

        let expired_keys: Vec<String> = data
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired_keys {
            data.remove(key.as_str());
        }
        drop(data);

        let count = expired_keys.len();
        let mut stats = self.stats.write();
        stats.sweeps += 1;
        stats.expired += count as u64;

        if count > 0 {
            debug!("Swept {} expired keys from {} tier", count, self.tier);
        }
        count
    }

    /// Snapshot of the store-level statistics
    pub fn stats(&self) -> StoreStats {
        let mut stats = self.stats.read().clone();
        stats.keys = self.len();
        stats
    }
}
