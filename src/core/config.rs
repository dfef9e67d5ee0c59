//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SentinelError};

/// Full sentinel configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub lists: ListsConfig,
    pub daemon: DaemonConfig,
    pub copy: CopyConfig,
    pub paths: PathsConfig,
}

/// Path index sizing. The bucket count is fixed for the life of the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexConfig {
    pub capacity: usize,
}

/// Initial capacity of the per-cycle change lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListsConfig {
    pub initial_capacity: usize,
}

/// Polling cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Pause between change detection and reconciliation.
    pub poll_interval_ms: u64,
    /// Granularity at which the pause re-checks the shutdown flag.
    pub shutdown_check_ms: u64,
}

/// File content copy behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CopyConfig {
    pub chunk_size_bytes: usize,
    /// Give newly created destination entries the source permission bits.
    pub preserve_permissions: bool,
}

/// Filesystem paths used by the sentinel itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub activity_log: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { capacity: 400 }
    }
}

impl Default for ListsConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 400,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            shutdown_check_ms: 100,
        }
    }
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 256,
            preserve_permissions: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[SNT-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("sentinel").join("config.toml");
        let data = home_dir.join(".local").join("share").join("sentinel");
        Self {
            config_file: cfg,
            activity_log: data.join("activity.jsonl"),
        }
    }
}

impl DaemonConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn shutdown_check(&self) -> Duration {
        Duration::from_millis(self.shutdown_check_ms)
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| SentinelError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(SentinelError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the activity log.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SENTINEL_INDEX_CAPACITY") {
            self.index.capacity = parse_env_usize("SENTINEL_INDEX_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("SENTINEL_LIST_CAPACITY") {
            self.lists.initial_capacity = parse_env_usize("SENTINEL_LIST_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("SENTINEL_POLL_INTERVAL_MS") {
            self.daemon.poll_interval_ms = parse_env_u64("SENTINEL_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("SENTINEL_COPY_CHUNK_BYTES") {
            self.copy.chunk_size_bytes = parse_env_usize("SENTINEL_COPY_CHUNK_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("SENTINEL_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.index.capacity == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "index.capacity must be > 0".to_string(),
            });
        }
        if self.lists.initial_capacity == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "lists.initial_capacity must be > 0".to_string(),
            });
        }
        if self.copy.chunk_size_bytes == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "copy.chunk_size_bytes must be > 0".to_string(),
            });
        }
        if self.daemon.shutdown_check_ms == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "daemon.shutdown_check_ms must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| SentinelError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_usize(name: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|error| SentinelError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
