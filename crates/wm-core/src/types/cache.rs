//! Scan cache keys and entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::ScanResult;
use crate::config::ScanSettings;
use crate::hash::key_digest;

/// Identity of a cached scan: server, username, and root path.
///
/// The password is deliberately absent. Any credentials with the same URL
/// and username share cache entries, including across password changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// Server base URL.
    pub server_url: String,
    /// Username on that server.
    pub username: String,
    /// Scanned root path.
    pub path: String,
}

impl CacheKey {
    /// Creates a cache key.
    #[must_use]
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            username: username.into(),
            path: path.into(),
        }
    }

    /// Content digest naming this key's persisted partitions.
    ///
    /// # Examples
    ///
    /// ```
    /// use wm_core::CacheKey;
    ///
    /// let key = CacheKey::new("https://x", "a", "/p");
    /// assert_eq!(key.digest(), CacheKey::new("https://x", "a", "/p").digest());
    /// ```
    #[must_use]
    pub fn digest(&self) -> String {
        key_digest(&[&self.server_url, &self.username, &self.path])
    }

    /// Returns `true` if this key belongs to the given server and user.
    #[inline]
    #[must_use]
    pub fn is_for(&self, server_url: &str, username: &str) -> bool {
        self.server_url == server_url && self.username == username
    }
}

/// The most recent successful scan for a [`CacheKey`].
///
/// Entries are always replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The key this entry is stored under.
    pub key: CacheKey,
    /// The scan result.
    pub result: ScanResult,
    /// When the scan finished.
    pub last_scan: DateTime<Utc>,
    /// The budgets the scan ran with.
    pub settings: ScanSettings,
}

impl CacheEntry {
    /// Summarises this entry without its file list.
    #[must_use]
    pub fn summary(&self) -> CacheSummary {
        CacheSummary {
            total: self.result.total_files,
            images: self.result.image_count,
            videos: self.result.video_count,
            last_scan: self.last_scan,
            truncated: self.result.is_truncated(),
        }
    }
}

/// Per-path counts answering "which of my paths are already scanned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSummary {
    /// Total media files.
    pub total: u64,
    /// Image files.
    pub images: u64,
    /// Video files.
    pub videos: u64,
    /// When the cached scan finished.
    pub last_scan: DateTime<Utc>,
    /// Whether the cached scan was cut short by a budget.
    pub truncated: bool,
}
