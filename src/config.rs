//! Configuration management

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Text provider defaults
    pub provider: ProviderConfig,
    /// Response cache configuration
    pub cache: CacheConfig,
    /// Scene lock registry configuration
    pub locks: LockConfig,
}

/// Provider name and default generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider name, part of every cache key
    pub name: String,
    /// Model used when a request does not name one
    pub default_model: String,
    /// Default sampling temperature
    pub temperature: f32,
    /// Default completion token limit
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "openai".to_string(),
            default_model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

/// Cache configuration for provider responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching
    pub enabled: bool,
    /// Age after which an entry reads as a miss
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Maximum number of entries before eviction
    pub max_entries: usize,
    /// Number of oldest entries removed per eviction
    pub evict_batch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(30 * 60),
            max_entries: 1000,
            evict_batch: 100,
        }
    }
}

/// Scene lock registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Idle time after which an unheld lock may be swept
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Entry count above which the sweep removes idle locks
    pub max_entries: usize,
    /// Interval between sweeps
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(10 * 60),
            max_entries: 1000,
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file and `TALEFORGE_` env vars
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // TALEFORGE_CACHE__TTL=10m -> cache.ttl
        figment = figment.merge(Env::prefixed("TALEFORGE_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    /// Reject values that would disable eviction or the sweeper
    pub fn validate(&self) -> Result<()> {
        if self.provider.name.trim().is_empty() {
            return Err(Error::Config("provider.name must not be empty".into()));
        }
        if self.cache.ttl.is_zero() {
            return Err(Error::Config("cache.ttl must be greater than zero".into()));
        }
        if self.cache.max_entries == 0 {
            return Err(Error::Config("cache.max_entries must be at least 1".into()));
        }
        if self.cache.evict_batch == 0 {
            return Err(Error::Config("cache.evict_batch must be at least 1".into()));
        }
        if self.locks.max_entries == 0 {
            return Err(Error::Config("locks.max_entries must be at least 1".into()));
        }
        if self.locks.cleanup_interval.is_zero() {
            return Err(Error::Config(
                "locks.cleanup_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.cache.ttl, Duration::from_secs(1800));
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.cache.evict_batch, 100);
        assert!(config.cache.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_yaml_with_humantime_durations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taleforge.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "provider:\n  name: anthropic\n  default_model: story-large").unwrap();
        writeln!(f, "cache:\n  ttl: 5m\n  max_entries: 50\n  evict_batch: 5").unwrap();
        writeln!(f, "locks:\n  idle_timeout: 90s").unwrap();
        drop(f);

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.provider.name, "anthropic");
        assert_eq!(config.provider.default_model, "story-large");
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.cache.max_entries, 50);
        assert_eq!(config.cache.evict_batch, 5);
        assert_eq!(config.locks.idle_timeout, Duration::from_secs(90));
        // Unset fields keep their defaults
        assert_eq!(config.locks.max_entries, 1000);
    }

    #[test]
    fn validate_rejects_zero_evict_batch() {
        let mut config = Config::default();
        config.cache.evict_batch = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_cleanup_interval() {
        let mut config = Config::default();
        config.locks.cleanup_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
