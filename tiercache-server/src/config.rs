use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use crate::core::{CacheConfig, Tier};

/// Main server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: Server,
    pub cache: CacheConfig,
    pub upstream: UpstreamConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 15600,
        }
    }
}

/// Expensive HTTP API that the proxy routes put behind the cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL; operations are POSTed to `{base_url}/{operation}`
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" or "pretty"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: ServerConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Apply `TIERCACHE_*` environment variables on top of the loaded values
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("TIERCACHE_HOST") {
            self.server.host = host;
        }
        override_parsed(&lookup, "TIERCACHE_PORT", &mut self.server.port);

        for tier in Tier::ALL {
            let name = tier.as_str().to_uppercase();
            let tier_config = self.cache.tier_mut(tier);
            override_parsed(
                &lookup,
                &format!("TIERCACHE_{}_TTL_SECS", name),
                &mut tier_config.ttl_secs,
            );
            override_parsed(
                &lookup,
                &format!("TIERCACHE_{}_SWEEP_SECS", name),
                &mut tier_config.sweep_interval_secs,
            );
        }

        override_parsed(
            &lookup,
            "TIERCACHE_COST_PER_CALL",
            &mut self.cache.cost_per_call,
        );
        override_parsed(
            &lookup,
            "TIERCACHE_STATS_INTERVAL_SECS",
            &mut self.cache.stats_report_interval_secs,
        );

        if let Some(url) = lookup("TIERCACHE_UPSTREAM_URL") {
            self.upstream.base_url = Some(url).filter(|u| !u.is_empty());
        }
        override_parsed(
            &lookup,
            "TIERCACHE_UPSTREAM_TIMEOUT_SECS",
            &mut self.upstream.timeout_secs,
        );

        if let Some(level) = lookup("TIERCACHE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Cache engine part of the configuration
    pub fn to_cache_config(&self) -> CacheConfig {
        self.cache.clone()
    }

    /// Get server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn override_parsed<F, T>(lookup: &F, name: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(name) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("Ignoring {}={:?}: not a valid value", name, raw),
        }
    }
}
