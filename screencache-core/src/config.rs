//! Cache configuration loading.
//!
//! `store_path` is required; every other field has a default. Values come
//! from a TOML file, then `SCREENCACHE_*` environment overrides, then
//! validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_MAP_SIZE_MB: usize = 16;
/// Largest LMDB map `validate` accepts.
pub const MAX_MAP_SIZE_MB: usize = 16_384;
pub const DEFAULT_FRESHNESS_WINDOW_MS: u64 = 30_000;
pub const DEFAULT_LATEST_FRESHNESS_WINDOW_MS: u64 = 300_000;
pub const DEFAULT_RECHECK_DELAY_MS: u64 = 2_500;

/// Bounds for the advisory re-check delay.
pub const RECHECK_DELAY_RANGE_MS: std::ops::RangeInclusive<u64> = 1_000..=10_000;

pub const ENV_CONFIG_PATH: &str = "SCREENCACHE_CONFIG";
pub const ENV_STORE_PATH: &str = "SCREENCACHE_STORE_PATH";
pub const ENV_FRESHNESS_WINDOW_MS: &str = "SCREENCACHE_FRESHNESS_WINDOW_MS";
pub const ENV_LATEST_FRESHNESS_WINDOW_MS: &str = "SCREENCACHE_LATEST_FRESHNESS_WINDOW_MS";
pub const ENV_RECHECK_DELAY_MS: &str = "SCREENCACHE_RECHECK_DELAY_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Directory holding the shared store, usually the app-group container.
    pub store_path: PathBuf,
    #[serde(default = "default_map_size_mb")]
    pub map_size_mb: usize,
    /// Per-key freshness window.
    #[serde(default = "default_freshness_window_ms")]
    pub freshness_window_ms: u64,
    /// Freshness window applied to the latest pointer fallback.
    #[serde(default = "default_latest_freshness_window_ms")]
    pub latest_freshness_window_ms: u64,
    /// Delay before the single re-check after a stale display.
    #[serde(default = "default_recheck_delay_ms")]
    pub recheck_delay_ms: u64,
}

fn default_map_size_mb() -> usize {
    DEFAULT_MAP_SIZE_MB
}

fn default_freshness_window_ms() -> u64 {
    DEFAULT_FRESHNESS_WINDOW_MS
}

fn default_latest_freshness_window_ms() -> u64 {
    DEFAULT_LATEST_FRESHNESS_WINDOW_MS
}

fn default_recheck_delay_ms() -> u64 {
    DEFAULT_RECHECK_DELAY_MS
}

impl CacheConfig {
    /// Config with defaults for everything but the store location.
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            map_size_mb: DEFAULT_MAP_SIZE_MB,
            freshness_window_ms: DEFAULT_FRESHNESS_WINDOW_MS,
            latest_freshness_window_ms: DEFAULT_LATEST_FRESHNESS_WINDOW_MS,
            recheck_delay_ms: DEFAULT_RECHECK_DELAY_MS,
        }
    }

    /// Load from `path`, or from `SCREENCACHE_CONFIG` when `path` is `None`,
    /// then apply env overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(config_path_from_env)
            .ok_or(ConfigError::MissingConfigPath)?;
        let mut config = Self::from_path(&path)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Apply `SCREENCACHE_*` overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_STORE_PATH) {
            self.store_path = PathBuf::from(path);
        }
        if let Some(value) = lookup(ENV_FRESHNESS_WINDOW_MS) {
            self.freshness_window_ms = parse_ms(ENV_FRESHNESS_WINDOW_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_LATEST_FRESHNESS_WINDOW_MS) {
            self.latest_freshness_window_ms = parse_ms(ENV_LATEST_FRESHNESS_WINDOW_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_RECHECK_DELAY_MS) {
            self.recheck_delay_ms = parse_ms(ENV_RECHECK_DELAY_MS, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_path.as_os_str().is_empty() {
            return Err(invalid("store_path", "", "must not be empty"));
        }
        if self.map_size_mb == 0 || self.map_size_mb > MAX_MAP_SIZE_MB {
            return Err(invalid(
                "map_size_mb",
                &self.map_size_mb.to_string(),
                "must be between 1 and 16384",
            ));
        }
        if self.freshness_window_ms == 0 {
            return Err(invalid("freshness_window_ms", "0", "must be > 0"));
        }
        if self.latest_freshness_window_ms < self.freshness_window_ms {
            return Err(invalid(
                "latest_freshness_window_ms",
                &self.latest_freshness_window_ms.to_string(),
                "must be >= freshness_window_ms",
            ));
        }
        if !RECHECK_DELAY_RANGE_MS.contains(&self.recheck_delay_ms) {
            return Err(invalid(
                "recheck_delay_ms",
                &self.recheck_delay_ms.to_string(),
                "must be between 1000 and 10000",
            ));
        }
        Ok(())
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_window_ms)
    }

    pub fn latest_freshness_window(&self) -> Duration {
        Duration::from_millis(self.latest_freshness_window_ms)
    }

    pub fn recheck_delay(&self) -> Duration {
        Duration::from_millis(self.recheck_delay_ms)
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_ms(field: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(field, value, "must be a whole number of milliseconds"))
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from)
}
