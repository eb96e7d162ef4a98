//! Persistent cache of scan results.
//!
//! This module provides [`ScanCache`], a thread-safe map from [`CacheKey`]
//! to the most recent successful [`CacheEntry`], optionally backed by a
//! directory of JSON files.
//!
//! # Safety Pattern
//!
//! - **Never exposes guards** publicly
//! - **Clones entries** on `get()` and listing operations
//! - **Holds the write lock** across the durable write and the in-memory
//!   swap, so readers see either the old entry or the new one
//!
//! # On-disk layout
//!
//! One file per key, `<digest>.json`, where the digest is
//! [`CacheKey::digest`]. Files are written to a temporary name and renamed
//! into place.
//!
//! # Examples
//!
//! ```
//! use chrono::Utc;
//! use wm_core::{CacheEntry, CacheKey, ScanResult, ScanSettings};
//! use wm_scanner::ScanCache;
//!
//! let cache = ScanCache::new();
//! let key = CacheKey::new("https://dav.example", "alice", "/photos");
//!
//! cache.save(CacheEntry {
//!     key: key.clone(),
//!     result: ScanResult::new("/photos", Vec::new(), 12),
//!     last_scan: Utc::now(),
//!     settings: ScanSettings::default(),
//! })?;
//!
//! assert!(cache.get(&key).is_some());
//! # Ok::<(), wm_scanner::ScanError>(())
//! ```

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::RwLock;
use tracing::{debug, warn};
use wm_core::{CacheEntry, CacheKey, FxHashMap};

use crate::error::ScanError;

const ENTRY_EXTENSION: &str = "json";

/// A thread-safe store of the latest scan per `(server, user, path)`.
///
/// Entries are replaced wholesale on [`save`](Self::save); there is no
/// partial update and no TTL.
#[derive(Debug, Default)]
pub struct ScanCache {
    entries: RwLock<FxHashMap<CacheKey, CacheEntry>>,
    dir: Option<Utf8PathBuf>,
}

impl ScanCache {
    /// Creates an empty in-memory cache.
    ///
    /// # Examples
    ///
    /// ```
    /// use wm_scanner::ScanCache;
    ///
    /// let cache = ScanCache::new();
    /// assert!(cache.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a directory-backed cache, creating the directory if needed and
    /// loading every readable entry.
    ///
    /// Unreadable or malformed files are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Store`] if the directory cannot be created or
    /// read.
    pub fn open(dir: impl Into<Utf8PathBuf>) -> Result<Self, ScanError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| ScanError::store(&dir, err))?;

        let mut entries = FxHashMap::default();
        for item in dir.read_dir_utf8().map_err(|err| ScanError::store(&dir, err))? {
            let item = item.map_err(|err| ScanError::store(&dir, err))?;
            let path = item.path();
            if path.extension() != Some(ENTRY_EXTENSION) {
                continue;
            }

            match read_entry(path) {
                Ok(entry) => {
                    entries.insert(entry.key.clone(), entry);
                }
                Err(err) => warn!(path = %path, error = %err, "Skipping unreadable cache entry"),
            }
        }

        debug!(dir = %dir, entries = entries.len(), "Opened scan cache");
        Ok(Self {
            entries: RwLock::new(entries),
            dir: Some(dir),
        })
    }

    /// Returns a clone of the entry for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Returns `true` if an entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Stores `entry`, replacing any previous entry for its key.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Encode`] or [`ScanError::Store`] if the entry
    /// cannot be persisted. The in-memory map is unchanged in that case.
    pub fn save(&self, entry: CacheEntry) -> Result<(), ScanError> {
        let mut entries = self.entries.write();
        if let Some(dir) = &self.dir {
            write_entry(dir, &entry)?;
        }
        entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    /// Removes the entry for `key`. Returns `true` if one existed.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Store`] if the persisted file cannot be removed.
    pub fn delete(&self, key: &CacheKey) -> Result<bool, ScanError> {
        let mut entries = self.entries.write();
        if let Some(dir) = &self.dir {
            let path = entry_path(dir, key);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(ScanError::store(path, err)),
            }
        }
        Ok(entries.remove(key).is_some())
    }

    /// Returns every entry for `server_url` and `username`, sorted by path.
    #[must_use]
    pub fn list_by_server(&self, server_url: &str, username: &str) -> Vec<CacheEntry> {
        let mut found: Vec<CacheEntry> = self
            .entries
            .read()
            .values()
            .filter(|entry| entry.key.is_for(server_url, username))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.key.path.cmp(&b.key.path));
        found
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// The backing directory, for persistent caches.
    #[inline]
    #[must_use]
    pub fn dir(&self) -> Option<&Utf8Path> {
        self.dir.as_deref()
    }
}

fn entry_path(dir: &Utf8Path, key: &CacheKey) -> Utf8PathBuf {
    dir.join(format!("{}.{ENTRY_EXTENSION}", key.digest()))
}

fn read_entry(path: &Utf8Path) -> Result<CacheEntry, ScanError> {
    let bytes = fs::read(path).map_err(|err| ScanError::store(path, err))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_entry(dir: &Utf8Path, entry: &CacheEntry) -> Result<(), ScanError> {
    let path = entry_path(dir, &entry.key);
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(entry)?;

    fs::write(&tmp, bytes).map_err(|err| ScanError::store(&tmp, err))?;
    fs::rename(&tmp, &path).map_err(|err| ScanError::store(&path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wm_core::{MediaFileEntry, MediaKind, ScanResult, ScanSettings};

    fn make_entry(user: &str, path: &str, files: usize) -> CacheEntry {
        let files = (0..files)
            .map(|i| MediaFileEntry::new(format!("{path}/{i}.jpg"), 1, MediaKind::Image, None))
            .collect();
        CacheEntry {
            key: CacheKey::new("https://dav.example", user, path),
            result: ScanResult::new(path, files, 5),
            last_scan: Utc::now(),
            settings: ScanSettings::default(),
        }
    }

    fn utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("cache")).unwrap()
    }

    #[test]
    fn test_cache_new() {
        let cache = ScanCache::new();
        assert!(cache.is_empty());
        assert!(cache.dir().is_none());
    }

    #[test]
    fn test_save_replaces_whole_entry() {
        let cache = ScanCache::new();
        cache.save(make_entry("a", "/p", 5)).unwrap();
        cache.save(make_entry("a", "/p", 7)).unwrap();

        let key = CacheKey::new("https://dav.example", "a", "/p");
        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.result.total_files, 7);
        assert_eq!(entry.result.files.len(), 7);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_delete() {
        let cache = ScanCache::new();
        let entry = make_entry("a", "/p", 1);
        let key = entry.key.clone();
        cache.save(entry).unwrap();

        assert!(cache.delete(&key).unwrap());
        assert!(!cache.delete(&key).unwrap());
        assert!(!cache.contains(&key));
    }

    #[test]
    fn test_list_by_server_filters_and_sorts() {
        let cache = ScanCache::new();
        cache.save(make_entry("a", "/z", 1)).unwrap();
        cache.save(make_entry("a", "/b", 2)).unwrap();
        cache.save(make_entry("other", "/c", 3)).unwrap();

        let listed = cache.list_by_server("https://dav.example", "a");
        let paths: Vec<_> = listed.iter().map(|e| e.key.path.as_str()).collect();
        assert_eq!(paths, ["/b", "/z"]);
        assert!(cache.list_by_server("https://elsewhere", "a").is_empty());
    }

    #[test]
    fn test_persistent_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = utf8_dir(&tmp);

        let entry = make_entry("a", "/p", 3);
        let key = entry.key.clone();
        {
            let cache = ScanCache::open(&dir).unwrap();
            cache.save(entry.clone()).unwrap();
            assert!(dir.join(format!("{}.json", key.digest())).exists());
        }

        let reopened = ScanCache::open(&dir).unwrap();
        assert_eq!(reopened.get(&key), Some(entry));
    }

    #[test]
    fn test_persistent_delete_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = utf8_dir(&tmp);

        let cache = ScanCache::open(&dir).unwrap();
        let entry = make_entry("a", "/p", 1);
        let key = entry.key.clone();
        cache.save(entry).unwrap();
        cache.delete(&key).unwrap();

        assert!(!dir.join(format!("{}.json", key.digest())).exists());
        assert!(ScanCache::open(&dir).unwrap().is_empty());
    }

    #[test]
    fn test_open_skips_malformed_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = utf8_dir(&tmp);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("garbage.json"), b"{not json").unwrap();
        fs::write(dir.join("ignored.txt"), b"whatever").unwrap();

        let cache = ScanCache::open(&dir).unwrap();
        assert!(cache.is_empty());
    }
}
