pub mod engine;
pub mod error;
pub mod key;
pub mod tier_store;
pub mod types;

pub use engine::TieredCache;
pub use error::{CacheError, Result};
pub use key::{derive_key, operation_prefix};
pub use tier_store::TierStore;
pub use types::{
    CacheConfig, CacheStats, CachedValue, EngineCounters, InvalidationReport, StoreStats,
    StoredEntry, Tier, TierConfig, TierSnapshot,
};
