//! Configuration management for kvsync
//!
//! This module provides file- and environment-based configuration with
//! defaults and validation. Only the declarative options live here;
//! migration functions, custom conflict handlers, observers and cross-tab
//! handlers are registered in code.

use crate::conflict::ResolutionPolicy;
use crate::logging::LogLevel;
use crate::sync::StrategyKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote synchronisation
    #[serde(default)]
    pub sync: SyncConfig,

    /// Schema migration
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Cross-context change propagation
    #[serde(default)]
    pub cross_tab: CrossTabConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote endpoint URL; sync is unavailable without one
    pub endpoint: Option<String>,

    /// Strategy used to push pending items
    pub strategy: StrategyKind,

    /// Named conflict resolution policy
    pub conflict_resolution: ResolutionPolicy,

    /// Interval between batch passes (batch strategy only)
    #[serde(with = "humantime_serde")]
    pub sync_interval: Option<Duration>,

    /// Attempts per item before it is considered exhausted
    pub max_retries: u32,

    /// Delay inserted before each retried item
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Items per batch
    pub batch_size: usize,

    /// Per-request timeout handed to the HTTP client
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Extra request headers
    pub headers: BTreeMap<String, String>,
}

/// Migration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Target schema version
    pub version: u32,

    /// Persist migrated collections automatically on load
    pub auto_migrate: bool,
}

/// Cross-tab configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossTabConfig {
    /// Propagate changes to sibling contexts
    pub enable_cross_tab_sync: bool,

    /// Skip the broadcast hub and use store mutation events
    pub force_storage_events: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            strategy: StrategyKind::Immediate,
            conflict_resolution: ResolutionPolicy::LastWriteWins,
            sync_interval: None,
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            batch_size: 50,
            request_timeout: Duration::from_secs(30),
            headers: BTreeMap::new(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self { version: 1, auto_migrate: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn override_parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    target: &mut T,
) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(value) = lookup(var) {
        *target = value
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnv { var, value, reason: e.to_string() })?;
    }
    Ok(())
}

fn override_duration(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    target: &mut Duration,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(var) {
        *target = humantime_serde::re::humantime::parse_duration(&value)
            .map_err(|e| ConfigError::InvalidEnv { var, value, reason: e.to_string() })?;
    }
    Ok(())
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: KVSYNC_<SECTION>_<KEY>
    /// Example: KVSYNC_SYNC_BATCH_SIZE=100
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|var| env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read { path: path.to_path_buf(), reason: e.to_string() })?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse { path: path.to_path_buf(), reason: e.to_string() })?;

        config.validate()?;
        Ok(config)
    }

    /// Load from an optional file, then let the environment override it
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|var| env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `KVSYNC_<SECTION>_<KEY>` overrides read through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        // Sync config
        if let Some(endpoint) = lookup("KVSYNC_SYNC_ENDPOINT") {
            self.sync.endpoint = Some(endpoint);
        }
        override_parsed(&lookup, "KVSYNC_SYNC_STRATEGY", &mut self.sync.strategy)?;
        override_parsed(&lookup, "KVSYNC_SYNC_CONFLICT_RESOLUTION", &mut self.sync.conflict_resolution)?;
        override_parsed(&lookup, "KVSYNC_SYNC_MAX_RETRIES", &mut self.sync.max_retries)?;
        override_parsed(&lookup, "KVSYNC_SYNC_BATCH_SIZE", &mut self.sync.batch_size)?;
        override_duration(&lookup, "KVSYNC_SYNC_RETRY_DELAY", &mut self.sync.retry_delay)?;
        override_duration(&lookup, "KVSYNC_SYNC_REQUEST_TIMEOUT", &mut self.sync.request_timeout)?;
        if lookup("KVSYNC_SYNC_SYNC_INTERVAL").is_some() {
            let mut interval = Duration::ZERO;
            override_duration(&lookup, "KVSYNC_SYNC_SYNC_INTERVAL", &mut interval)?;
            self.sync.sync_interval = Some(interval);
        }

        // Migration config
        override_parsed(&lookup, "KVSYNC_MIGRATION_VERSION", &mut self.migration.version)?;
        override_parsed(&lookup, "KVSYNC_MIGRATION_AUTO_MIGRATE", &mut self.migration.auto_migrate)?;

        // Cross-tab config
        override_parsed(
            &lookup,
            "KVSYNC_CROSS_TAB_ENABLE_CROSS_TAB_SYNC",
            &mut self.cross_tab.enable_cross_tab_sync,
        )?;
        override_parsed(
            &lookup,
            "KVSYNC_CROSS_TAB_FORCE_STORAGE_EVENTS",
            &mut self.cross_tab.force_storage_events,
        )?;

        // Logging config
        if let Some(level) = lookup("KVSYNC_LOGGING_LEVEL") {
            self.logging.level = level;
        }
        override_parsed(&lookup, "KVSYNC_LOGGING_JSON_FORMAT", &mut self.logging.json_format)?;
        override_parsed(&lookup, "KVSYNC_LOGGING_WITH_TIMESTAMP", &mut self.logging.with_timestamp)?;
        override_parsed(&lookup, "KVSYNC_LOGGING_WITH_TARGET", &mut self.logging.with_target)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate sync config
        if let Some(endpoint) = &self.sync.endpoint {
            reqwest::Url::parse(endpoint)
                .map_err(|e| ConfigError::invalid("sync", format!("endpoint '{}': {}", endpoint, e)))?;
        }

        if self.sync.batch_size == 0 {
            return Err(ConfigError::invalid("sync", "batch_size must be greater than 0"));
        }

        if self.sync.max_retries == 0 {
            return Err(ConfigError::invalid("sync", "max_retries must be greater than 0"));
        }

        if self.sync.sync_interval == Some(Duration::ZERO) {
            return Err(ConfigError::invalid("sync", "sync_interval must be greater than 0"));
        }

        // Validate migration config
        if self.migration.version == 0 {
            return Err(ConfigError::invalid("migration", "version must be at least 1"));
        }

        // Validate logging config
        if let Err(e) = self.logging.level.parse::<LogLevel>() {
            return Err(ConfigError::invalid("logging", e));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Write { path: path.to_path_buf(), reason: e.to_string() })?;

        Ok(())
    }
}
