pub mod config;
pub mod core;
pub mod metrics;
pub mod server;
pub mod upstream;

// Re-export commonly used types
pub use config::ServerConfig;
pub use core::{
    CacheConfig, CacheError, CacheStats, InvalidationReport, Tier, TierConfig, TieredCache,
    derive_key,
};
pub use server::{AppState, create_router};
pub use upstream::UpstreamClient;
