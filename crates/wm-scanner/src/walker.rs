//! Budgeted breadth-first directory traversal.
//!
//! This module provides [`DirectoryWalker`], which walks a remote directory
//! tree through a [`DavClient`] and collects media files into a
//! [`ScanResult`].
//!
//! # Passes
//!
//! 1. **Estimation**: counts the directories reachable within `max_depth`
//!    so progress can be reported as a percentage. Listing failures count
//!    as empty directories.
//! 2. **Traversal**: dequeues up to `batch_size` directories at a time,
//!    lists them concurrently, collects classified files and enqueues
//!    subdirectories.
//!
//! # Budgets
//!
//! - `max_depth`: the root is depth 0; deeper directories are never listed
//! - `max_files`: the walk stops as soon as the cap is reached, mid-batch
//! - `timeout`: one clock for both passes, checked before each batch; an
//!   exhausted budget ends the walk with partial results, not an error.
//!   Estimation starts no batch after half of the budget is spent.
//!
//! Progress is pull-based: call [`DirectoryWalker::next_batch`] until it
//! returns `None`, then [`DirectoryWalker::finish`].
//!
//! # Examples
//!
//! ```
//! use wm_scanner::{DirectoryWalker, MemoryDav, WalkOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), wm_scanner::ScanError> {
//! let dav = MemoryDav::new();
//! dav.add_file("/photos/a.jpg", 10);
//! dav.add_file("/photos/trip/b.mp4", 20);
//!
//! let mut walker = DirectoryWalker::start(&dav, "/photos", WalkOptions::default()).await;
//! while let Some(progress) = walker.next_batch().await? {
//!     println!("{}%", progress.percentage);
//! }
//! let result = walker.finish();
//! assert_eq!(result.total_files, 2);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::Instant;
use tracing::{debug, warn};
use wm_core::{
    FxHashSet, MediaFileEntry, ScanProgress, ScanResult, ScanSettings, Truncation, classify,
    fx_hash_set,
};

use crate::client::{DavClient, DavEntry, normalize_path};
use crate::error::{ClientError, ScanError};

/// Maximum number of queued directories reported in a progress snapshot.
pub const PENDING_PREVIEW: usize = 20;

/// Budgets for a single walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// Deepest directory level that is listed (root = 0).
    pub max_depth: u32,
    /// Maximum number of media files collected.
    pub max_files: usize,
    /// Time budget for the traversal pass.
    pub timeout: Duration,
    /// Directories listed concurrently per batch.
    pub batch_size: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self::from(&ScanSettings::default())
    }
}

impl From<&ScanSettings> for WalkOptions {
    fn from(settings: &ScanSettings) -> Self {
        Self {
            max_depth: settings.max_depth,
            max_files: settings.max_files,
            timeout: settings.timeout(),
            batch_size: settings.batch_size.max(1),
        }
    }
}

/// A directory waiting to be listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDir {
    /// Normalised remote path.
    pub path: String,
    /// Depth below the walk root.
    pub depth: u32,
}

/// FIFO work queue for breadth-first traversal.
///
/// Each directory is enqueued at most once per walk, which also breaks
/// listing loops on servers that report a parent as a child.
///
/// # Examples
///
/// ```
/// use wm_scanner::TraversalQueue;
///
/// let mut queue = TraversalQueue::new("/", 1);
/// let root = queue.next_batch(5);
/// assert_eq!(root.len(), 1);
///
/// assert!(queue.push_child("/a".to_owned(), 0));
/// assert!(!queue.push_child("/a".to_owned(), 0));
/// assert!(!queue.push_child("/a/b".to_owned(), 1));
/// assert_eq!(queue.skipped_by_depth(), 1);
/// ```
#[derive(Debug)]
pub struct TraversalQueue {
    queue: VecDeque<PendingDir>,
    visited: FxHashSet<String>,
    max_depth: u32,
    skipped_by_depth: u64,
}

impl TraversalQueue {
    /// Creates a queue seeded with `root` at depth 0.
    #[must_use]
    pub fn new(root: &str, max_depth: u32) -> Self {
        let root = normalize_path(root);
        let mut visited = fx_hash_set();
        visited.insert(root.clone());

        Self {
            queue: VecDeque::from([PendingDir {
                path: root,
                depth: 0,
            }]),
            visited,
            max_depth,
            skipped_by_depth: 0,
        }
    }

    /// Enqueues a subdirectory found while listing a directory at
    /// `parent_depth`.
    ///
    /// Returns `false` if the directory was already seen or lies below
    /// `max_depth`.
    pub fn push_child(&mut self, path: String, parent_depth: u32) -> bool {
        let depth = parent_depth.saturating_add(1);
        if depth > self.max_depth {
            self.skipped_by_depth += 1;
            return false;
        }
        if !self.visited.insert(path.clone()) {
            return false;
        }
        self.queue.push_back(PendingDir { path, depth });
        true
    }

    /// Removes up to `n` directories from the front of the queue.
    pub fn next_batch(&mut self, n: usize) -> Vec<PendingDir> {
        let take = n.min(self.queue.len());
        self.queue.drain(..take).collect()
    }

    /// Paths of the first `limit` queued directories.
    #[must_use]
    pub fn pending_paths(&self, limit: usize) -> Vec<String> {
        self.queue.iter().take(limit).map(|d| d.path.clone()).collect()
    }

    /// Number of queued directories.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of subdirectories not enqueued because of `max_depth`.
    #[inline]
    #[must_use]
    pub const fn skipped_by_depth(&self) -> u64 {
        self.skipped_by_depth
    }
}

/// A walk in progress.
///
/// Created by [`start`](Self::start), driven by
/// [`next_batch`](Self::next_batch), and consumed by
/// [`finish`](Self::finish). The sequence of progress snapshots is finite
/// and cannot be restarted.
#[derive(Debug)]
pub struct DirectoryWalker<'a, C> {
    client: &'a C,
    root: String,
    options: WalkOptions,
    queue: TraversalQueue,
    files: Vec<MediaFileEntry>,
    created: Instant,
    estimated_directories: u64,
    scanned_directories: u64,
    failed_directories: u64,
    truncated: Option<Truncation>,
    done: bool,
}

impl<'a, C: DavClient> DirectoryWalker<'a, C> {
    /// Runs the estimation pass and prepares the traversal.
    ///
    /// Both passes share one time budget measured from this call. The
    /// estimation pass stops starting new batches once half of it is spent.
    ///
    /// Never fails: estimation errors only make the directory estimate
    /// smaller.
    pub async fn start(client: &'a C, root: &str, options: WalkOptions) -> Self {
        let created = Instant::now();
        let root = normalize_path(root);
        let estimated_directories = estimate_directories(client, &root, &options, created).await;
        debug!(root = %root, estimated_directories, "Estimated directory count");

        Self {
            client,
            queue: TraversalQueue::new(&root, options.max_depth),
            root,
            options,
            files: Vec::new(),
            created,
            estimated_directories,
            scanned_directories: 0,
            failed_directories: 0,
            truncated: None,
            done: false,
        }
    }

    /// Lists the next batch of directories.
    ///
    /// Returns `Ok(None)` once the walk is exhausted or a budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Listing`] if the server rejects the credentials.
    /// Every other listing failure is logged and counted instead.
    pub async fn next_batch(&mut self) -> Result<Option<ScanProgress>, ScanError> {
        if self.done || self.queue.is_empty() {
            self.done = true;
            return Ok(None);
        }
        if self.created.elapsed() > self.options.timeout {
            debug!(root = %self.root, "Walk time budget exhausted");
            self.truncated = Some(Truncation::Timeout);
            self.done = true;
            return Ok(None);
        }

        let batch = self.queue.next_batch(self.options.batch_size);
        let listings = list_batch(self.client, &batch).await;

        for (dir, listing) in batch.iter().zip(listings) {
            match listing {
                Ok(entries) => {
                    if !self.collect(dir, entries) {
                        self.truncated = Some(Truncation::MaxFiles);
                        self.done = true;
                        break;
                    }
                }
                Err(err) if err.is_fatal() => {
                    self.done = true;
                    return Err(ScanError::listing(&dir.path, err));
                }
                Err(err) => self.record_failure(dir, &err),
            }
        }

        self.scanned_directories += batch.len() as u64;
        if self.files.len() >= self.options.max_files && !self.queue.is_empty() {
            self.truncated = Some(Truncation::MaxFiles);
            self.done = true;
        }

        let current_path = batch.last().map(|d| d.path.clone()).unwrap_or_default();
        let total_directories = self
            .estimated_directories
            .max(self.scanned_directories + self.queue.len() as u64);

        Ok(Some(ScanProgress {
            current_path,
            scanned_directories: self.scanned_directories,
            total_directories,
            found_files: self.files.len() as u64,
            percentage: ScanProgress::percentage_of(self.scanned_directories, total_directories),
            pending_directories: self.queue.pending_paths(PENDING_PREVIEW),
            completed_directories: batch.into_iter().map(|d| d.path).collect(),
            failed_directories: self.failed_directories,
        }))
    }

    /// Consumes the walker and builds the result.
    #[must_use]
    pub fn finish(self) -> ScanResult {
        let truncated = self.truncated.or_else(|| {
            (self.queue.skipped_by_depth() > 0).then_some(Truncation::MaxDepth)
        });
        let duration_ms = u64::try_from(self.created.elapsed().as_millis()).unwrap_or(u64::MAX);

        ScanResult::new(self.root, self.files, duration_ms)
            .with_directories(self.scanned_directories, self.failed_directories)
            .with_truncation(truncated)
    }

    /// Number of media files collected so far.
    #[inline]
    #[must_use]
    pub fn found_files(&self) -> usize {
        self.files.len()
    }

    /// Adds the media files of one listing and enqueues its subdirectories.
    ///
    /// Returns `false` when a media file had to be dropped because the
    /// file cap was already reached.
    fn collect(&mut self, dir: &PendingDir, entries: Vec<DavEntry>) -> bool {
        for entry in entries {
            if entry.is_directory() {
                self.queue.push_child(normalize_path(&entry.path), dir.depth);
                continue;
            }
            let Some(kind) = classify(&entry.name) else {
                continue;
            };
            if self.files.len() >= self.options.max_files {
                return false;
            }
            self.files.push(MediaFileEntry::new(
                entry.path,
                entry.size,
                kind,
                entry.last_modified,
            ));
        }
        true
    }

    fn record_failure(&mut self, dir: &PendingDir, err: &ClientError) {
        warn!(root = %self.root, dir = %dir.path, error = %err, "Skipping unreadable directory");
        self.failed_directories += 1;
    }
}

/// Walks `root` to completion.
///
/// # Errors
///
/// See [`DirectoryWalker::next_batch`].
pub async fn scan<C: DavClient>(
    client: &C,
    root: &str,
    options: WalkOptions,
) -> Result<ScanResult, ScanError> {
    let mut walker = DirectoryWalker::start(client, root, options).await;
    while walker.next_batch().await?.is_some() {}
    Ok(walker.finish())
}

/// Lists every directory of a batch concurrently, preserving order.
async fn list_batch<C: DavClient>(
    client: &C,
    batch: &[PendingDir],
) -> Vec<Result<Vec<DavEntry>, ClientError>> {
    let mut pending = Vec::with_capacity(batch.len());
    for dir in batch {
        pending.push(client.list_directory(&dir.path));
    }
    join_all(pending).await
}

/// Counts the directories a traversal would list. No batch starts after
/// half of the walk's time budget has elapsed since `started`.
async fn estimate_directories<C: DavClient>(
    client: &C,
    root: &str,
    options: &WalkOptions,
    started: Instant,
) -> u64 {
    let budget = options.timeout / 2;
    let mut queue = TraversalQueue::new(root, options.max_depth);
    let mut count = 0u64;

    while !queue.is_empty() && started.elapsed() <= budget {
        let batch = queue.next_batch(options.batch_size);
        count += batch.len() as u64;

        let listings = list_batch(client, &batch).await;
        for (dir, listing) in batch.iter().zip(listings) {
            let Ok(entries) = listing else { continue };
            for entry in entries.iter().filter(|e| e.is_directory()) {
                queue.push_child(normalize_path(&entry.path), dir.depth);
            }
        }
    }

    count
}
