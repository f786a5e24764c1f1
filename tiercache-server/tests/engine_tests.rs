// Tiered cache engine tests
// Key derivation, wrapped execution, expiry, invalidation and stats

use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tiercache_server::{CacheConfig, Tier, TierConfig, TieredCache, derive_key};

#[derive(Debug, Clone, PartialEq)]
struct Advice {
    text: String,
}

#[test]
fn test_key_determinism_under_reordering() {
    let first = json!({"role": "backend", "years": 3, "skills": ["rust", "sql"]});
    let second = json!({"skills": ["rust", "sql"], "years": 3, "role": "backend"});

    for op in ["career_advice", "quiz", "x"] {
        assert_eq!(
            derive_key(op, &first).unwrap(),
            derive_key(op, &second).unwrap()
        );
    }
}

#[test]
fn test_struct_and_json_payloads_agree() {
    #[derive(Serialize)]
    struct Query {
        zeta: u32,
        alpha: &'static str,
    }

    let from_struct = derive_key("op", &Query { zeta: 1, alpha: "a" }).unwrap();
    let from_json = derive_key("op", &json!({"alpha": "a", "zeta": 1})).unwrap();
    assert_eq!(from_struct, from_json);
}

#[test]
fn test_keys_pairwise_distinct() {
    let keys: HashSet<String> = (0..10_000)
        .map(|i| derive_key("chat", &json!({ "message": format!("question {}", i) })).unwrap())
        .collect();

    assert_eq!(keys.len(), 10_000);
}

#[tokio::test]
async fn test_hit_skips_producer() {
    let cache = TieredCache::default();
    let counter = AtomicUsize::new(0);
    let calls = &counter;
    let payload = json!({"user": 42});

    for _ in 0..2 {
        let value = cache
            .with_cache("career_advice", "warm", &payload, || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(Advice {
                        text: "learn rust".into(),
                    })
                } else {
                    Err("producer called twice")
                }
            })
            .await
            .unwrap();

        assert_eq!(value.text, "learn rust");
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fresh_key_runs_producer_once() {
    let cache = TieredCache::default();
    let counter = AtomicUsize::new(0);
    let calls = &counter;

    let value = cache
        .with_cache("quiz", "hot", &json!({"topic": "networking"}), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(vec![1, 2, 3])
        })
        .await
        .unwrap();

    assert_eq!(*value, vec![1, 2, 3]);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

async fn ask(cache: &TieredCache, payload: &Value, calls: &AtomicUsize) -> Arc<String> {
    cache
        .with_cache("chat", "hot", payload, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>("answer".to_string())
        })
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_hot_entry_expires_after_ttl() {
    let cache = TieredCache::default();
    let calls = AtomicUsize::new(0);
    let payload = json!({"q": "ttl"});

    ask(&cache, &payload, &calls).await;
    assert!(cache.get::<String, _>("chat", "hot", &payload).is_some());

    tokio::time::advance(Duration::from_secs(299)).await;
    ask(&cache, &payload, &calls).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(cache.get::<String, _>("chat", "hot", &payload).is_none());

    ask(&cache, &payload, &calls).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_short_ttl_tier() {
    let config = CacheConfig {
        hot: TierConfig::new(1, 1),
        ..Default::default()
    };
    let cache = TieredCache::new(config);
    let payload = json!({});

    cache
        .with_cache("op", "hot", &payload, || async { Ok::<_, ()>(1u8) })
        .await
        .unwrap();
    assert_eq!(cache.get_stats().tiers["hot"].keys, 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get_stats().tiers["hot"].keys, 0);
}

#[tokio::test]
async fn test_failure_is_not_cached() {
    let cache = TieredCache::default();
    let counter = AtomicUsize::new(0);
    let calls = &counter;
    let payload = json!({"resume": "draft"});

    let producer = || async move {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err("upstream timeout".to_string())
        } else {
            Ok("feedback".to_string())
        }
    };

    let first = cache.with_cache("resume_review", "cold", &payload, producer).await;
    assert_eq!(first.unwrap_err(), "upstream timeout");

    let second = cache.with_cache("resume_review", "cold", &payload, producer).await;
    assert_eq!(second.unwrap().as_str(), "feedback");
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

async fn store(cache: &TieredCache, op: &str, tier: &str, id: u32) {
    cache
        .with_cache(op, tier, &json!({ "id": id }), || async move { Ok::<_, ()>(id) })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_invalidation_is_scoped_to_operation() {
    let cache = TieredCache::default();
    store(&cache, "a", "hot", 1).await;
    store(&cache, "a", "hot", 2).await;
    store(&cache, "b", "hot", 1).await;

    let report = cache.invalidate("a", Some("hot"));
    assert_eq!(report.removed_from(Tier::Hot), 2);
    assert_eq!(report.removed.len(), 1);

    let before = cache.get_stats().hits;
    store(&cache, "b", "hot", 1).await;
    assert_eq!(cache.get_stats().hits, before + 1);

    assert!(cache.get::<u32, _>("a", "hot", &json!({"id": 1})).is_none());
}

#[tokio::test]
async fn test_invalidation_other_tier_untouched() {
    let cache = TieredCache::default();
    store(&cache, "a", "hot", 1).await;
    store(&cache, "a", "warm", 1).await;

    cache.invalidate("a", Some("hot"));
    assert!(cache.get::<u32, _>("a", "warm", &json!({"id": 1})).is_some());
}

#[tokio::test]
async fn test_global_invalidation() {
    let cache = TieredCache::default();
    for tier in ["hot", "warm", "cold"] {
        store(&cache, "a", tier, 1).await;
        store(&cache, "b", tier, 1).await;
    }

    let report = cache.invalidate("a", None);
    assert_eq!(report.total(), 3);
    for tier in Tier::ALL {
        assert_eq!(report.removed_from(tier), 1);
        assert!(cache.get::<u32, _>("a", tier.as_str(), &json!({"id": 1})).is_none());
        assert!(cache.get::<u32, _>("b", tier.as_str(), &json!({"id": 1})).is_some());
    }
}

#[tokio::test]
async fn test_stats_scenario() {
    let cache = TieredCache::default();
    let k = json!({"key": "K"});
    let j = json!({"key": "J"});

    for _ in 0..3 {
        cache
            .with_cache("op", "hot", &k, || async { Ok::<_, String>("k".to_string()) })
            .await
            .unwrap();
    }

    let failed = cache
        .with_cache("op", "hot", &j, || async { Err::<String, _>("boom".to_string()) })
        .await;
    assert!(failed.is_err());

    let stats = cache.get_stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.total_saved, 2);
    assert_eq!(stats.hit_rate, "50.00%");
    assert_eq!(stats.tiers["hot"].keys, 1);
    assert_eq!(stats.tiers["warm"].keys, 0);
}

#[tokio::test]
async fn test_unknown_tier_fails_open() {
    let cache = TieredCache::default();
    let counter = AtomicUsize::new(0);
    let calls = &counter;

    for _ in 0..2 {
        let value = cache
            .with_cache("op", "nonexistent_tier", &json!({}), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>("direct")
            })
            .await
            .unwrap();
        assert_eq!(*value, "direct");
    }

    // Never cached, never counted
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    let stats = cache.get_stats();
    assert_eq!(stats.hits + stats.misses, 0);
}

#[tokio::test]
async fn test_unknown_tier_propagates_producer_error() {
    let cache = TieredCache::default();
    let result = cache
        .with_cache("op", "lukewarm", &json!({}), || async { Err::<(), _>(7u8) })
        .await;
    assert_eq!(result.unwrap_err(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_both_run_producer() {
    let cache = TieredCache::default();
    let counter = AtomicUsize::new(0);
    let calls = &counter;
    let payload = json!({"same": true});

    let call = |delay: u64, value: &'static str| {
        let cache = &cache;
        let payload = &payload;
        async move {
            cache
                .with_cache("op", "hot", payload, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok::<_, ()>(value)
                })
                .await
                .unwrap()
        }
    };

    let (first, second) = tokio::join!(call(10, "first"), call(20, "second"));
    assert_eq!(*first, "first");
    assert_eq!(*second, "second");
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    // Last writer wins
    let cached = cache.get::<&'static str, _>("op", "hot", &payload).unwrap();
    assert_eq!(*cached, "second");
}

#[tokio::test]
async fn test_clear_single_tier() {
    let cache = TieredCache::default();
    store(&cache, "a", "hot", 1).await;
    store(&cache, "a", "cold", 1).await;

    let report = cache.clear(Some("hot"));
    assert_eq!(report.total(), 1);
    assert_eq!(cache.get_stats().tiers["cold"].keys, 1);
}
