//! An in-memory WebDAV tree.
//!
//! [`MemoryDav`] is both a [`DavClient`] and a [`DavConnector`]. Clones share
//! the same tree, so a test can keep a handle, hand another to the scanner,
//! and mutate or inspect the tree while a scan is in flight.
//!
//! # Examples
//!
//! ```
//! use wm_scanner::MemoryDav;
//!
//! let dav = MemoryDav::new();
//! dav.add_file("/photos/a.jpg", 1024);
//! dav.add_file("/photos/2024/b.mp4", 4096);
//!
//! assert_eq!(dav.file_count(), 2);
//! assert_eq!(dav.list_calls(), 0);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Semaphore;
use wm_core::FxHashMap;

use crate::client::{Credentials, DavClient, DavConnector, DavEntry, join_path, normalize_path};
use crate::error::ClientError;

/// Builds the error returned for an injected failure.
pub type FailureFn = fn(&str) -> ClientError;

#[derive(Default)]
struct Tree {
    /// Directory path to its children, keyed by name.
    dirs: FxHashMap<String, BTreeMap<String, DavEntry>>,
    failures: FxHashMap<String, FailureFn>,
}

#[derive(Default)]
struct Shared {
    tree: RwLock<Tree>,
    gate: RwLock<Option<Arc<Semaphore>>>,
    latency: RwLock<Option<Duration>>,
    calls: AtomicU64,
}

/// A shared, mutable in-memory directory tree.
///
/// Listing a directory that was never created fails with
/// [`ClientError::NotFound`]. The root `/` always exists.
#[derive(Clone, Default)]
pub struct MemoryDav {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MemoryDav {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDav")
            .field("directories", &self.directory_count())
            .field("files", &self.file_count())
            .field("list_calls", &self.list_calls())
            .finish_non_exhaustive()
    }
}

impl MemoryDav {
    /// Creates a tree containing only the root directory.
    #[must_use]
    pub fn new() -> Self {
        let dav = Self::default();
        dav.shared.tree.write().dirs.entry("/".to_owned()).or_default();
        dav
    }

    /// Adds a directory and any missing parents.
    pub fn add_dir(&self, path: &str) {
        let mut tree = self.shared.tree.write();
        ensure_dir(&mut tree, &normalize_path(path));
    }

    /// Adds a file and any missing parent directories.
    pub fn add_file(&self, path: &str, size: u64) {
        self.add_file_modified(path, size, None);
    }

    /// Adds a file with a modification time.
    pub fn add_file_modified(&self, path: &str, size: u64, last_modified: Option<DateTime<Utc>>) {
        let path = normalize_path(path);
        let (parent, name) = split_parent(&path);

        let mut tree = self.shared.tree.write();
        ensure_dir(&mut tree, parent);
        if let Some(children) = tree.dirs.get_mut(parent) {
            children.insert(
                name.to_owned(),
                DavEntry::file(path.clone(), size, last_modified),
            );
        }
    }

    /// Removes a file or an entire subtree.
    pub fn remove(&self, path: &str) {
        let path = normalize_path(path);
        let (parent, name) = split_parent(&path);
        let prefix = format!("{path}/");

        let mut tree = self.shared.tree.write();
        if let Some(children) = tree.dirs.get_mut(parent) {
            children.remove(name);
        }
        tree.dirs.retain(|dir, _| dir != &path && !dir.starts_with(&prefix));
    }

    /// Makes every listing of `path` fail with the error built by `failure`.
    ///
    /// ```
    /// use wm_scanner::{ClientError, MemoryDav};
    ///
    /// let dav = MemoryDav::new();
    /// dav.add_dir("/private");
    /// dav.fail("/private", |p| ClientError::PermissionDenied(p.to_owned()));
    /// ```
    pub fn fail(&self, path: &str, failure: FailureFn) {
        self.shared
            .tree
            .write()
            .failures
            .insert(normalize_path(path), failure);
    }

    /// Removes an injected failure.
    pub fn heal(&self, path: &str) {
        self.shared.tree.write().failures.remove(&normalize_path(path));
    }

    /// Makes every listing wait for a permit from `gate` first.
    ///
    /// Permits are returned when the listing completes, so adding a single
    /// permit releases all waiting listings one after another.
    pub fn set_gate(&self, gate: Arc<Semaphore>) {
        *self.shared.gate.write() = Some(gate);
    }

    /// Makes every listing sleep for `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.shared.latency.write() = Some(latency);
    }

    /// Number of `list_directory` calls made so far, including failed ones.
    #[inline]
    #[must_use]
    pub fn list_calls(&self) -> u64 {
        self.shared.calls.load(Ordering::Relaxed)
    }

    /// Resets the listing-call counter.
    pub fn reset_list_calls(&self) {
        self.shared.calls.store(0, Ordering::Relaxed);
    }

    /// Number of directories in the tree, including the root.
    #[must_use]
    pub fn directory_count(&self) -> usize {
        self.shared.tree.read().dirs.len()
    }

    /// Number of files in the tree, media or not.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.shared
            .tree
            .read()
            .dirs
            .values()
            .flat_map(BTreeMap::values)
            .filter(|entry| !entry.is_directory())
            .count()
    }
}

impl DavClient for MemoryDav {
    async fn list_directory(&self, path: &str) -> Result<Vec<DavEntry>, ClientError> {
        self.shared.calls.fetch_add(1, Ordering::Relaxed);
        let path = normalize_path(path);

        let gate = self.shared.gate.read().clone();
        let _permit = match gate {
            Some(gate) => Some(
                gate.acquire_owned()
                    .await
                    .map_err(|_| ClientError::Network("gate closed".to_owned()))?,
            ),
            None => None,
        };

        let latency = *self.shared.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let tree = self.shared.tree.read();
        if let Some(failure) = tree.failures.get(&path) {
            return Err(failure(&path));
        }
        tree.dirs
            .get(&path)
            .map(|children| children.values().cloned().collect())
            .ok_or(ClientError::NotFound(path))
    }
}

impl DavConnector for MemoryDav {
    type Client = Self;

    fn connect(&self, _credentials: &Credentials) -> Result<Self::Client, ClientError> {
        Ok(self.clone())
    }
}

fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("/", path),
    }
}

fn ensure_dir(tree: &mut Tree, path: &str) {
    if tree.dirs.contains_key(path) {
        return;
    }
    tree.dirs.insert(path.to_owned(), BTreeMap::new());
    if path == "/" {
        return;
    }

    let (parent, name) = split_parent(path);
    ensure_dir(tree, parent);
    if let Some(children) = tree.dirs.get_mut(parent) {
        children
            .entry(name.to_owned())
            .or_insert_with(|| DavEntry::directory(join_path(parent, name)));
    }
}
