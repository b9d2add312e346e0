//! Configuration management for heraldd.
//!
//! Loads settings from /etc/herald/config.toml or uses defaults. The data
//! directory can be overridden with `HERALD_DATA_DIR`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/herald/config.toml";

/// Environment override for the data directory
pub const DATA_DIR_ENV: &str = "HERALD_DATA_DIR";

/// Primary record set file, inside the data directory
pub const DATA_FILE_NAME: &str = "herald.json";

/// Best-effort raw dump written when the primary save fails
pub const EMERGENCY_FILE_NAME: &str = "herald.json.emergency";

/// Backup directory, inside the data directory
pub const BACKUP_DIR_NAME: &str = "backups";

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub flush: FlushConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Where the record set and its backups live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the data file and the backup directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Backup snapshots retained after pruning
    #[serde(default = "default_backup_keep")]
    pub backup_keep: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/herald")
}

fn default_backup_keep() -> usize {
    10
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backup_keep: default_backup_keep(),
        }
    }
}

/// Background flush worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushConfig {
    /// Bounded depth of the dirty-mark queue; a full queue means a flush
    /// is already pending and further marks coalesce
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Periodic flush so a quiet process still converges to disk
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_secs: u64,
}

fn default_queue_depth() -> usize {
    8
}

fn default_autosave_interval() -> u64 {
    900
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            autosave_interval_secs: default_autosave_interval(),
        }
    }
}

/// Volatile cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How often the sweep task drops expired entries
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// TTL for memoized rendered profiles
    #[serde(default = "default_profile_ttl")]
    pub profile_ttl_secs: u64,
}

fn default_sweep_interval() -> u64 {
    600
}

fn default_profile_ttl() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            profile_ttl_secs: default_profile_ttl(),
        }
    }
}

impl Config {
    /// Load config from file, or return defaults
    pub fn load() -> Self {
        let config = Self::load_from_path(CONFIG_PATH).unwrap_or_else(|e| {
            warn!("Config not found, using defaults: {}", e);
            Config::default()
        });
        config.apply_env()
    }

    /// Load config from specific path
    fn load_from_path(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path);
        Ok(config)
    }

    fn apply_env(mut self) -> Self {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            info!("Data directory overridden by {}: {}", DATA_DIR_ENV, dir);
            self.storage.data_dir = PathBuf::from(dir);
        }
        self
    }

    /// Path of the primary record set file
    pub fn data_file(&self) -> PathBuf {
        self.storage.data_dir.join(DATA_FILE_NAME)
    }

    /// Path of the emergency dump sidecar
    pub fn emergency_file(&self) -> PathBuf {
        self.storage.data_dir.join(EMERGENCY_FILE_NAME)
    }

    /// Path of the backup directory
    pub fn backup_dir(&self) -> PathBuf {
        self.storage.data_dir.join(BACKUP_DIR_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.backup_keep, 10);
        assert_eq!(config.flush.autosave_interval_secs, 900);
        assert_eq!(config.cache.profile_ttl_secs, 300);
        assert!(config.data_file().ends_with(DATA_FILE_NAME));
        assert!(config.backup_dir().ends_with(BACKUP_DIR_NAME));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            data_dir = "/tmp/herald-test"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/herald-test"));
        assert_eq!(config.storage.backup_keep, 10);
        assert_eq!(config.flush.queue_depth, 8);
    }
}
