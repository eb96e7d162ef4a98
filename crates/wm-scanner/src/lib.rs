//! Budgeted WebDAV media scanning with caching and task de-duplication.
//!
//! This crate walks remote WebDAV directory trees, collects image and video
//! files, and serves repeated requests from a persistent cache. It never
//! speaks WebDAV itself: listings come from a [`DavClient`].
//!
//! # Overview
//!
//! The main entry point is [`ScanOrchestrator`], which combines:
//!
//! - [`DirectoryWalker`]: breadth-first batched traversal with depth, file,
//!   and time budgets
//! - [`ScanCache`]: latest result per `(server, user, path)`, in memory or
//!   as JSON files
//! - [`ScanTaskRegistry`]: one running task per target, with retention
//! - [`ScanLog`]: append-only per-target history
//! - [`ScanStats`]: atomic request counters
//!
//! [`RescanScheduler`] drives periodic background rescans of configured
//! servers.
//!
//! # Example
//!
//! ```
//! use wm_scanner::{Credentials, MemoryDav, ScanOrchestrator, ScanOutcome, ScanRequest};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), wm_scanner::ScanError> {
//! let dav = MemoryDav::new();
//! dav.add_file("/photos/a.jpg", 1024);
//! dav.add_file("/photos/2024/b.mov", 4096);
//!
//! let service = ScanOrchestrator::in_memory(dav.clone());
//! let credentials = Credentials::new("https://dav.example", "alice", "secret");
//!
//! // First request walks the tree
//! let outcome = service.run_scan(ScanRequest::new(credentials.clone(), "/photos")).await?;
//! assert!(matches!(outcome, ScanOutcome::Completed { .. }));
//!
//! // Second request is served from the cache
//! let calls = dav.list_calls();
//! let outcome = service.run_scan(ScanRequest::new(credentials, "/photos")).await?;
//! assert!(outcome.is_cached());
//! assert_eq!(dav.list_calls(), calls);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ScanOrchestrator (main entry point)
//!     │
//!     ├── ScanCache (FxHashMap + RwLock, JSON files)
//!     │
//!     ├── ScanTaskRegistry (FxHashMap + Mutex, tokio sweeper)
//!     │
//!     ├── ScanLog (JSON Lines per target)
//!     │
//!     ├── DavConnector ──► DavClient (HTTP PROPFIND, local mount, memory)
//!     │                       │
//!     │                       └── DirectoryWalker
//!     │                               └── TraversalQueue
//!     │
//!     └── ScanStats (atomic counters)
//! ```
//!
//! # Concurrency
//!
//! - **Listing**: up to `batch_size` requests in flight per walk, awaited
//!   together; batch size is the only throttle
//! - **Locking**: `parking_lot` locks, never held across `.await`
//! - **Cancellation**: none for a running walk; the timeout is cooperative

#![deny(clippy::all)]
#![warn(missing_docs)]

mod cache;
mod client;
mod error;
mod http;
mod log;
mod memory;
mod mount;
mod orchestrator;
mod registry;
mod routing;
mod schedule;
mod stats;
mod walker;

pub use cache::ScanCache;
pub use client::{Credentials, DavClient, DavConnector, DavEntry, EntryKind, join_path, normalize_path};
pub use error::{ClientError, ScanError};
pub use http::{
    DEFAULT_REQUEST_TIMEOUT, HttpDavClient, HttpDavConnector, parse_multistatus, status_error,
};
pub use log::ScanLog;
pub use memory::{FailureFn, MemoryDav};
pub use mount::{LocalMountClient, LocalMountConnector};
pub use orchestrator::{
    BackgroundScan, BackgroundTally, CachePeek, PathsSummary, ScanOrchestrator, ScanOutcome,
    ScanRequest,
};
pub use registry::{ScanTaskRegistry, TaskStart};
pub use routing::{RoutedClient, RoutingConnector};
pub use schedule::RescanScheduler;
pub use stats::{ScanStats, StatsSnapshot};
pub use walker::{DirectoryWalker, PENDING_PREVIEW, PendingDir, TraversalQueue, WalkOptions, scan};
