//! Domain types for the WebDAV media scanner.
//!
//! # Module Organization
//!
//! - [`media`] - Media kinds and extension-based classification
//! - [`file`] - Media file entries produced by a scan
//! - [`result`] - Scan results and truncation reasons
//! - [`progress`] - Per-batch progress snapshots
//! - [`status`] - Task and scan-log status enums
//! - [`task`] - Scan task records and their de-duplication key
//! - [`cache`] - Cache keys, entries, and summaries
//! - [`log`] - Append-only scan log records
//!
//! All public types are re-exported at this module level and at the crate
//! root:
//!
//! ```
//! use wm_core::{MediaKind, ScanResult, TaskStatus};
//! ```

pub mod cache;
pub mod file;
pub mod log;
pub mod media;
pub mod progress;
pub mod result;
pub mod status;
pub mod task;

pub use cache::{CacheEntry, CacheKey, CacheSummary};
pub use file::MediaFileEntry;
pub use log::{ScanLogRecord, ScanTrigger};
pub use media::{IMAGE_EXTENSIONS, MediaKind, VIDEO_EXTENSIONS, classify};
pub use progress::ScanProgress;
pub use result::{ScanResult, Truncation};
pub use status::{LogStatus, TaskStatus};
pub use task::{ScanTaskRecord, TaskKey};
