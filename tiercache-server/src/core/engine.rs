//! Tiered cache engine
//!
//! Wraps expensive async producers so that repeated calls with an
//! equivalent payload are answered from one of three expiring tiers.
//!
//! There is no single-flight de-duplication: concurrent callers that miss on
//! the same key each run their producer, and the last one to finish leaves
//! its result in the tier.

use super::key::{derive_key, operation_prefix};
use super::tier_store::TierStore;
use super::types::{
    CacheConfig, CacheStats, CachedValue, EngineCounters, InvalidationReport, Tier, TierSnapshot,
};
use crate::metrics;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Multi-tier response cache.
///
/// Cloning is cheap and every clone shares the same tiers and counters.
#[derive(Clone)]
pub struct TieredCache {
    config: Arc<CacheConfig>,
    tiers: Arc<HashMap<Tier, TierStore<CachedValue>>>,
    counters: Arc<RwLock<EngineCounters>>,
}

impl TieredCache {
    /// Create an engine with empty tiers and zeroed counters
    pub fn new(config: CacheConfig) -> Self {
        let tiers = Tier::ALL
            .iter()
            .map(|&tier| (tier, TierStore::new(tier, config.tier(tier))))
            .collect();

        info!(
            "Initializing tiered cache (hot={}s, warm={}s, cold={}s)",
            config.hot.ttl_secs, config.warm.ttl_secs, config.cold.ttl_secs
        );

        Self {
            config: Arc::new(config),
            tiers: Arc::new(tiers),
            counters: Arc::new(RwLock::new(EngineCounters::default())),
        }
    }

    /// Names of the configured tiers
    pub fn tier_names(&self) -> Vec<&'static str> {
        Tier::ALL.iter().map(Tier::as_str).collect()
    }

    fn store(&self, tier: &str) -> Option<&TierStore<CachedValue>> {
        tier.parse::<Tier>().ok().and_then(|t| self.tiers.get(&t))
    }

    /// Stores addressed by an optional tier name; `None` selects all tiers
    fn select(&self, tier: Option<&str>) -> Vec<&TierStore<CachedValue>> {
        match tier {
            Some(name) => self.store(name).into_iter().collect(),
            None => Tier::ALL.iter().filter_map(|t| self.tiers.get(t)).collect(),
        }
    }

    /// Return the cached result for `(operation, payload)` in `tier`, or run
    /// `producer` and cache its successful result.
    ///
    /// An unknown tier name (or a payload that cannot be serialized into a
    /// key) bypasses the cache entirely and returns the producer's result
    /// uncached. Producer errors are counted and returned unchanged; nothing
    /// is stored for them.
    pub async fn with_cache<P, T, E, F, Fut>(
        &self,
        operation: &str,
        tier: &str,
        payload: &P,
        producer: F,
    ) -> Result<Arc<T>, E>
    where
        P: Serialize + ?Sized,
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(store) = self.store(tier) else {
            error!(
                "Unknown cache tier '{}' for operation '{}', bypassing cache",
                tier, operation
            );
            return producer().await.map(Arc::new);
        };

        let key = match derive_key(operation, payload) {
            Ok(key) => key,
            Err(e) => {
                error!(
                    "Cannot derive cache key for operation '{}': {}, bypassing cache",
                    operation, e
                );
                return producer().await.map(Arc::new);
            }
        };

        if let Some(cached) = store.get(&key) {
            match cached.downcast::<T>() {
                Ok(value) => {
                    {
                        let mut counters = self.counters.write();
                        counters.hits += 1;
                        counters.total_saved += 1;
                    }
                    metrics::record_lookup(tier, "hit");
                    debug!("Cache HIT {} ({} tier)", key, tier);
                    return Ok(value);
                }
                Err(_) => warn!("Cached value for {} has an unexpected type, recomputing", key),
            }
        }

        self.counters.write().misses += 1;
        metrics::record_lookup(tier, "miss");
        debug!("Cache MISS {} ({} tier)", key, tier);

        let started = Instant::now();
        let outcome = producer().await;
        metrics::record_producer(tier, started.elapsed().as_secs_f64());

        match outcome {
            Ok(value) => {
                let value = Arc::new(value);
                store.set(&key, value.clone() as CachedValue);
                debug!("Cached {} in {} tier", key, tier);
                Ok(value)
            }
            Err(err) => {
                self.counters.write().errors += 1;
                metrics::record_producer_error(tier);
                error!("Producer failed for {} ({} tier), result not cached", key, tier);
                Err(err)
            }
        }
    }

    /// Read a cached result without running a producer.
    ///
    /// Engine counters are left alone; the tier's own store statistics still
    /// see the lookup. An expired entry found this way is removed from the
    /// tier and counted in its `expired` statistic, as on any other read.
    pub fn get<T, P>(&self, operation: &str, tier: &str, payload: &P) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
        P: Serialize + ?Sized,
    {
        let store = self.store(tier)?;
        let key = derive_key(operation, payload).ok()?;
        store.get(&key)?.downcast::<T>().ok()
    }

    /// Delete all keys of `operation` from one tier, or from every tier when
    /// `tier` is `None`. Unknown tier names match nothing.
    pub fn invalidate(&self, operation: &str, tier: Option<&str>) -> InvalidationReport {
        let prefix = operation_prefix(operation);
        let mut report = InvalidationReport::default();

        for store in self.select(tier) {
            let removed = store.delete_prefix(&prefix);
            metrics::record_removed(store.tier().as_str(), "invalidate", removed);
            info!(
                "Invalidated {} keys for '{}' in {} tier",
                removed,
                operation,
                store.tier()
            );
            report.removed.insert(store.tier().as_str().to_string(), removed);
        }

        if report.removed.is_empty() {
            warn!(
                "Invalidate '{}' skipped: unknown tier {:?}",
                operation, tier
            );
        }

        report
    }

    /// Flush one tier, or all of them when `tier` is `None`
    pub fn clear(&self, tier: Option<&str>) -> InvalidationReport {
        let mut report = InvalidationReport::default();

        for store in self.select(tier) {
            let cleared = store.clear();
            metrics::record_removed(store.tier().as_str(), "clear", cleared);
            info!("Cleared {} keys from {} tier", cleared, store.tier());
            report.removed.insert(store.tier().as_str().to_string(), cleared);
        }

        if report.removed.is_empty() {
            warn!("Clear skipped: unknown tier {:?}", tier);
        }

        report
    }

    /// Snapshot of counters and per-tier state
    pub fn get_stats(&self) -> CacheStats {
        let counters = *self.counters.read();

        let hit_rate = match counters.hit_ratio() {
            Some(ratio) => format!("{:.2}%", ratio),
            None => "0.00%".to_string(),
        };

        let tiers = Tier::ALL
            .iter()
            .filter_map(|tier| self.tiers.get(tier))
            .map(|store| {
                let stats = store.stats();
                let config = store.config();
                (
                    store.tier().as_str().to_string(),
                    TierSnapshot {
                        keys: stats.keys,
                        ttl_secs: config.ttl_secs,
                        sweep_interval_secs: config.sweep_interval_secs,
                        store: stats,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        CacheStats {
            hits: counters.hits,
            misses: counters.misses,
            errors: counters.errors,
            total_saved: counters.total_saved,
            hit_rate,
            estimated_cost_saved: counters.total_saved as f64 * self.config.cost_per_call,
            tiers,
        }
    }

    /// Start the per-tier sweepers and, if enabled, the stats reporter
    pub fn start_background_tasks(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles: Vec<_> = Tier::ALL
            .iter()
            .filter_map(|tier| self.tiers.get(tier))
            .map(TierStore::start_sweeper)
            .collect();

        if self.config.stats_report_interval_secs > 0 {
            handles.push(
                self.start_stats_reporter(Duration::from_secs(
                    self.config.stats_report_interval_secs,
                )),
            );
        }

        handles
    }

    /// Periodically log a stats snapshot
    pub fn start_stats_reporter(&self, period: Duration) -> tokio::task::JoinHandle<()> {
        info!("Starting cache stats reporter (interval={:?})", period);

        let cache = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; skip the empty report.
            interval.tick().await;

            loop {
                interval.tick().await;
                cache.report_stats();
            }
        })
    }

    fn report_stats(&self) {
        let stats = self.get_stats();
        let keys = |tier: Tier| stats.tiers.get(tier.as_str()).map_or(0, |t| t.keys);

        for tier in Tier::ALL {
            metrics::set_keys(tier.as_str(), keys(tier));
        }

        info!(
            hits = stats.hits,
            misses = stats.misses,
            errors = stats.errors,
            hit_rate = %stats.hit_rate,
            estimated_cost_saved = %format!("${:.2}", stats.estimated_cost_saved),
            hot_keys = keys(Tier::Hot),
            warm_keys = keys(Tier::Warm),
            cold_keys = keys(Tier::Cold),
            "Cache statistics"
        );
    }
}

impl Default for TieredCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_hit_returns_same_allocation() {
        let cache = TieredCache::default();
        let payload = json!({"prompt": "resume tips"});

        let first = cache
            .with_cache("chat", "hot", &payload, || async {
                Ok::<_, String>(vec!["tip".to_string()])
            })
            .await
            .unwrap();
        let second = cache
            .with_cache("chat", "hot", &payload, || async {
                Err::<Vec<String>, _>("must not run".to_string())
            })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss() {
        let cache = TieredCache::default();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        cache
            .with_cache("op", "warm", &json!({}), || async { Ok::<_, ()>(1u32) })
            .await
            .unwrap();

        let value = cache
            .with_cache("op", "warm", &json!({}), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>("text".to_string())
            })
            .await
            .unwrap();

        assert_eq!(value.as_str(), "text");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get_stats().misses, 2);
    }

    #[tokio::test]
    async fn test_get_does_not_count() {
        let cache = TieredCache::default();
        cache
            .with_cache("op", "cold", &json!({"a": 1}), || async { Ok::<_, ()>(7i64) })
            .await
            .unwrap();

        let peeked = cache.get::<i64, _>("op", "cold", &json!({"a": 1}));
        assert_eq!(peeked.as_deref(), Some(&7));
        assert!(cache.get::<i64, _>("op", "hot", &json!({"a": 1})).is_none());

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_unknown_tier_is_noop_for_invalidate_and_clear() {
        let cache = TieredCache::default();
        cache
            .with_cache("op", "hot", &json!({}), || async { Ok::<_, ()>(()) })
            .await
            .unwrap();

        assert_eq!(cache.invalidate("op", Some("lukewarm")).total(), 0);
        assert_eq!(cache.clear(Some("lukewarm")).total(), 0);
        assert_eq!(cache.get_stats().tiers["hot"].keys, 1);
    }

    #[tokio::test]
    async fn test_clear_reports_per_tier() {
        let cache = TieredCache::default();
        for (tier, n) in [("hot", 1), ("warm", 2), ("cold", 3)] {
            for i in 0..n {
                cache
                    .with_cache("op", tier, &json!({ "i": i }), || async move { Ok::<_, ()>(i) })
                    .await
                    .unwrap();
            }
        }

        let report = cache.clear(None);
        assert_eq!(report.removed_from(Tier::Hot), 1);
        assert_eq!(report.removed_from(Tier::Warm), 2);
        assert_eq!(report.removed_from(Tier::Cold), 3);
        assert_eq!(report.total(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_drops_expired_entry() {
        let cache = TieredCache::default();
        cache
            .with_cache("op", "hot", &json!({}), || async { Ok::<_, ()>(1u8) })
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;

        assert!(cache.get::<u8, _>("op", "hot", &json!({})).is_none());
        let store = cache.store("hot").unwrap();
        assert_eq!(store.stats().expired, 1);
        assert!(store.is_empty());
        assert_eq!(cache.get_stats().misses, 1);
    }

    #[test]
    fn test_tier_names() {
        assert_eq!(TieredCache::default().tier_names(), vec!["hot", "warm", "cold"]);
    }

    #[tokio::test]
    async fn test_zero_lookup_hit_rate() {
        let stats = TieredCache::default().get_stats();
        assert_eq!(stats.hit_rate, "0.00%");
        assert_eq!(stats.estimated_cost_saved, 0.0);
        assert_eq!(stats.tiers.len(), 3);
    }

    #[tokio::test]
    async fn test_estimated_cost_saved() {
        let config = CacheConfig {
            cost_per_call: 0.5,
            ..Default::default()
        };
        let cache = TieredCache::new(config);

        for _ in 0..3 {
            cache
                .with_cache("op", "hot", &json!({}), || async { Ok::<_, ()>(0u8) })
                .await
                .unwrap();
        }

        let stats = cache.get_stats();
        assert_eq!(stats.total_saved, 2);
        assert_eq!(stats.estimated_cost_saved, 1.0);
    }

    #[tokio::test]
    async fn test_stats_snapshot_is_detached() {
        let cache = TieredCache::default();
        let before = cache.get_stats();

        cache
            .with_cache("op", "hot", &json!({}), || async { Ok::<_, ()>(0u8) })
            .await
            .unwrap();

        assert_eq!(before.misses, 0);
        assert_eq!(cache.get_stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_tasks() {
        let config = CacheConfig {
            stats_report_interval_secs: 10,
            ..Default::default()
        };
        let cache = TieredCache::new(config);
        let handles = cache.start_background_tasks();
        assert_eq!(handles.len(), 4);

        tokio::time::sleep(Duration::from_secs(25)).await;
        for handle in handles {
            handle.abort();
        }
    }
}
