//! Configuration for the Agora platform services.
//!
//! All sections are serde structs with named field defaults so a missing
//! config file yields a fully working single-instance setup (memory cache,
//! billing disabled).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod loader;
pub mod observability;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheSettings,
    /// Session store configuration
    #[serde(default)]
    pub session: SessionSettings,
    /// Usage metering configuration
    #[serde(default)]
    pub metering: MeteringSettings,
    /// Billing provider configuration
    #[serde(default)]
    pub billing: BillingSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default derived via field defaults

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Redis validations
        if self.redis.enabled {
            if self.redis.url.is_empty() {
                return Err("redis.enabled=true requires redis.url".into());
            }
            if !self.redis.url.starts_with("redis://") && !self.redis.url.starts_with("rediss://") {
                return Err("redis.url must start with redis:// or rediss://".into());
            }
            if self.redis.pool_size == 0 {
                return Err("redis.pool_size must be > 0".into());
            }
            if self.redis.timeout_ms == 0 {
                return Err("redis.timeout_ms must be > 0".into());
            }
        }
        // Cache validations
        if self.cache.default_ttl_secs == 0 {
            return Err("cache.default_ttl_secs must be > 0".into());
        }
        if self.cache.stats_refresh_secs == 0 {
            return Err("cache.stats_refresh_secs must be > 0".into());
        }
        // Session validations
        if self.session.ttl_secs == 0 {
            return Err("session.ttl_secs must be > 0".into());
        }
        // Metering validations: limits below -1 are meaningless
        for (tier, limits) in &self.metering.tiers {
            for (metric, limit) in limits {
                if *limit < -1 {
                    return Err(format!(
                        "metering.tiers.{tier}.{metric} must be >= -1 (-1 means unlimited)"
                    ));
                }
            }
        }
        // Billing validations
        if self.billing.enabled {
            match self.billing.endpoint.as_deref() {
                None | Some("") => {
                    return Err("billing.enabled=true requires billing.endpoint".into());
                }
                Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                    return Err("billing.endpoint must be an http(s) URL".into());
                }
                _ => {}
            }
            if self.billing.timeout_ms == 0 {
                return Err("billing.timeout_ms must be > 0".into());
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

/// Redis configuration for horizontal scaling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades without it)
    /// Default: false (disabled for single-instance deployments)
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Default TTL in seconds for entries written without an explicit TTL
    /// by higher-level helpers (the client itself never applies it implicitly)
    #[serde(default = "default_cache_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Interval for refreshing store-level statistics (key count, memory)
    #[serde(default = "default_stats_refresh_secs")]
    pub stats_refresh_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_stats_refresh_secs() -> u64 {
    30
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_cache_ttl_secs(),
            stats_refresh_secs: default_stats_refresh_secs(),
        }
    }
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Session TTL in seconds (default 24h)
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_session_ttl_secs() -> u64 {
    86_400
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
        }
    }
}

/// Usage metering configuration.
///
/// `tiers` maps tier name -> metric name -> monthly limit. A limit of -1
/// means unlimited. An empty table falls back to the built-in catalog.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MeteringSettings {
    #[serde(default)]
    pub tiers: BTreeMap<String, BTreeMap<String, i64>>,
}

/// Billing provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingSettings {
    /// Enable usage reporting to the billing provider
    #[serde(default)]
    pub enabled: bool,

    /// Billing provider usage-report endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    /// API key sent as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_billing_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_billing_timeout_ms() -> u64 {
    10_000
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key: None,
            timeout_ms: default_billing_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.redis.enabled);
        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert_eq!(config.session.ttl_secs, 86_400);
        assert_eq!(config.cache.default_ttl_secs, 3600);
        assert!(!config.billing.enabled);
    }

    #[test]
    fn test_redis_validation() {
        let mut config = AppConfig::default();
        config.redis.enabled = true;
        config.redis.url = "localhost:6379".into();
        assert!(config.validate().is_err());

        config.redis.url = "redis://localhost:6379".into();
        assert!(config.validate().is_ok());

        config.redis.pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_billing_requires_endpoint() {
        let mut config = AppConfig::default();
        config.billing.enabled = true;
        assert!(config.validate().is_err());

        config.billing.endpoint = Some("https://billing.example.com/usage".into());
        assert!(config.validate().is_ok());

        config.billing.endpoint = Some("ftp://billing.example.com".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tier_limit_validation() {
        let mut config = AppConfig::default();
        let mut limits = BTreeMap::new();
        limits.insert("ai_interactions".to_string(), -2);
        config.metering.tiers.insert("free".to_string(), limits);
        assert!(config.validate().is_err());

        config
            .metering
            .tiers
            .get_mut("free")
            .unwrap()
            .insert("ai_interactions".to_string(), -1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_logging_level_validation() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".into();
        assert!(config.validate().is_err());

        config.logging.level = "DEBUG".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.redis.pool_size, config.redis.pool_size);
        assert_eq!(parsed.session.ttl_secs, config.session.ttl_secs);
    }
}
