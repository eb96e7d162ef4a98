//! Configuration structures for the WebDAV media scanner.
//!
//! This module provides configuration types for all components:
//!
//! - [`ScanSettings`] - Walk budgets (batch size, depth, file count, timeout)
//! - [`TaskRetention`] - How long finished scan tasks stay visible
//! - [`StorageConfig`] - Where the scan cache and scan logs live
//! - [`ScheduleConfig`] - Periodic rescan interval
//! - [`ServerConfig`] - A WebDAV server, its credentials, and root paths
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`] and deserialize with
//! `#[serde(default)]`, so a configuration file only needs the fields it
//! overrides.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Budgets applied to a single directory walk.
///
/// The settings used for a scan are stored alongside its cache entry.
///
/// # Examples
///
/// ```
/// use wm_core::ScanSettings;
///
/// let settings = ScanSettings::default();
/// assert_eq!(settings.batch_size, 5);
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Number of directories listed concurrently per batch.
    ///
    /// This is the only throttle on request concurrency against the server.
    pub batch_size: usize,

    /// Maximum directory depth below the root that is listed.
    ///
    /// `0` lists only the root directory itself.
    pub max_depth: u32,

    /// Maximum number of media files collected before the walk stops.
    pub max_files: usize,

    /// Walk time budget in milliseconds, checked between batches.
    pub timeout_ms: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_depth: 10,
            max_files: 10_000,
            timeout_ms: 300_000,
        }
    }
}

impl ScanSettings {
    /// Returns the walk time budget as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Checks that the settings describe a walk that can make progress.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] if `batch_size` or `max_files`
    /// is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid_option(
                "scan.batch_size",
                "must be at least 1",
            ));
        }
        if self.max_files == 0 {
            return Err(ConfigError::invalid_option(
                "scan.max_files",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Retention windows for scan task records.
///
/// Completed and failed tasks stay visible for a while so callers can poll
/// their final state; a periodic sweep removes anything older than
/// `stale_after_secs` regardless of status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRetention {
    /// Seconds a completed task remains in the registry.
    pub completed_ttl_secs: u64,
    /// Seconds a failed task remains in the registry.
    pub failed_ttl_secs: u64,
    /// Age (from start) after which the sweep removes any task.
    pub stale_after_secs: u64,
    /// Interval between sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for TaskRetention {
    fn default() -> Self {
        Self {
            completed_ttl_secs: 5 * 60,
            failed_ttl_secs: 60,
            stale_after_secs: 30 * 60,
            sweep_interval_secs: 10 * 60,
        }
    }
}

impl TaskRetention {
    /// Retention of completed tasks.
    #[inline]
    #[must_use]
    pub const fn completed_ttl(&self) -> Duration {
        Duration::from_secs(self.completed_ttl_secs)
    }

    /// Retention of failed tasks.
    #[inline]
    #[must_use]
    pub const fn failed_ttl(&self) -> Duration {
        Duration::from_secs(self.failed_ttl_secs)
    }

    /// Maximum age of any task record.
    #[inline]
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Interval between stale-task sweeps.
    #[inline]
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Location of durable scan state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root data directory. Cache entries go to `<data_dir>/cache`, scan
    /// logs to `<data_dir>/logs`.
    pub data_dir: Utf8PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: Utf8PathBuf::from(".wm-scan"),
        }
    }
}

impl StorageConfig {
    /// Directory holding one JSON file per cache entry.
    #[must_use]
    pub fn cache_dir(&self) -> Utf8PathBuf {
        self.data_dir.join("cache")
    }

    /// Directory holding one append-only log file per scan target.
    #[must_use]
    pub fn log_dir(&self) -> Utf8PathBuf {
        self.data_dir.join("logs")
    }
}

/// Periodic rescan settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds between rescans of every configured server.
    pub interval_secs: u64,
    /// Whether scheduled scans bypass the cache.
    pub force_rescan: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60 * 60,
            force_rescan: true,
        }
    }
}

impl ScheduleConfig {
    /// Interval between scheduled rescans.
    #[inline]
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// A WebDAV server and the root paths scanned on it.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server base URL, e.g. `https://dav.example.com/remote.php/webdav`.
    pub url: String,
    /// Username sent to the server.
    pub username: String,
    /// Password sent to the server. Never part of any cache key.
    pub password: String,
    /// Local directory where this share is mounted, if scanned through a mount.
    pub mount_root: Option<Utf8PathBuf>,
    /// Remote root paths to scan.
    pub paths: Vec<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mount_root", &self.mount_root)
            .field("paths", &self.paths)
            .finish()
    }
}

/// Root configuration for the scanner.
///
/// # Examples
///
/// ```
/// use wm_core::Config;
///
/// let config: Config = serde_json::from_str(r#"{"scan": {"batch_size": 8}}"#).unwrap();
/// assert_eq!(config.scan.batch_size, 8);
/// assert_eq!(config.tasks.completed_ttl_secs, 300);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default walk budgets.
    pub scan: ScanSettings,
    /// Task record retention.
    pub tasks: TaskRetention,
    /// Durable state location.
    pub storage: StorageConfig,
    /// Periodic rescan settings.
    pub schedule: ScheduleConfig,
    /// Configured servers.
    pub servers: Vec<ServerConfig>,
}

impl Config {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not valid JSON for this schema, and
    /// [`ConfigError::InvalidOption`] if validation fails.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_std_path())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates scan settings and server entries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scan.validate()?;

        if self.schedule.interval_secs == 0 {
            return Err(ConfigError::invalid_option(
                "schedule.interval_secs",
                "must be at least 1",
            ));
        }

        for (index, server) in self.servers.iter().enumerate() {
            if server.url.trim().is_empty() {
                return Err(ConfigError::invalid_option(
                    format!("servers[{index}].url"),
                    "must not be empty",
                ));
            }
            if server.paths.iter().any(|p| !p.starts_with('/')) {
                return Err(ConfigError::invalid_option(
                    format!("servers[{index}].paths"),
                    "paths must be absolute (start with '/')",
                ));
            }
        }

        Ok(())
    }

    /// Finds the configured server matching a URL and username.
    #[must_use]
    pub fn server(&self, url: &str, username: &str) -> Option<&ServerConfig> {
        self.servers
            .iter()
            .find(|s| s.url == url && s.username == username)
    }
}
