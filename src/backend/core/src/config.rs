//! Configuration management.

use serde::Deserialize;
use std::time::Duration;

use crate::error::Result;
use crate::telemetry::logging::LoggingConfig;

/// Main configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Access engine configuration
    #[serde(default)]
    pub access: AccessConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Upper bound on a single cache operation; slower ones count as misses
    #[serde(default = "default_redis_op_timeout", with = "humantime_serde")]
    pub op_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            op_timeout: default_redis_op_timeout(),
        }
    }
}

/// Settings for the permission engine, its cache and the hierarchy guards.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    /// TTL for cached allow/deny decisions
    #[serde(default = "default_decision_ttl", with = "humantime_serde")]
    pub decision_ttl: Duration,

    /// TTL for cached property -> organization lookups
    #[serde(default = "default_property_org_ttl", with = "humantime_serde")]
    pub property_org_ttl: Duration,

    /// Whether a stored admin-ownership row grants property access
    #[serde(default)]
    pub enforce_property_ownership: bool,

    /// Prefix for every cache key written by the engine
    #[serde(default = "default_cache_key_prefix")]
    pub cache_key_prefix: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            decision_ttl: default_decision_ttl(),
            property_org_ttl: default_property_org_ttl(),
            enforce_property_ownership: false,
            cache_key_prefix: default_cache_key_prefix(),
        }
    }
}

impl AccessConfig {
    pub fn with_ownership_enforcement(mut self, enabled: bool) -> Self {
        self.enforce_property_ownership = enabled;
        self
    }
}

// Default value functions
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 5 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_redis_op_timeout() -> Duration { Duration::from_millis(250) }
fn default_decision_ttl() -> Duration { Duration::from_secs(10 * 60) }
fn default_property_org_ttl() -> Duration { Duration::from_secs(24 * 60 * 60) }
fn default_cache_key_prefix() -> String { "gatehouse:".to_string() }

impl Config {
    /// Load configuration from the environment (and a `.env` file if present).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("GATEHOUSE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("GATEHOUSE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}
