//! Scan results.
//!
//! A [`ScanResult`] is created once at the end of a successful walk and is
//! immutable afterwards. Its image and video counts are always derived from
//! its file list, never tracked separately.

use serde::{Deserialize, Serialize};

use super::file::MediaFileEntry;
use super::media::{MediaKind, classify};

/// The budget that cut a scan short.
///
/// A truncated scan is still a successful scan; this only tells callers
/// that the file list may be incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    /// The file count reached `max_files`.
    MaxFiles,
    /// The time budget ran out between batches.
    Timeout,
    /// Subdirectories deeper than `max_depth` were not listed.
    MaxDepth,
}

impl Truncation {
    /// Returns a human-readable label for this reason.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MaxFiles => "file limit reached",
            Self::Timeout => "time limit reached",
            Self::MaxDepth => "depth limit reached",
        }
    }
}

/// The outcome of one walk of a directory subtree.
///
/// # Invariants
///
/// - `image_count + video_count <= total_files`
/// - `total_files == files.len()`
/// - both counts equal what [`classify`] reports for the file names
///
/// # Examples
///
/// ```
/// use wm_core::{MediaFileEntry, MediaKind, ScanResult};
///
/// let files = vec![
///     MediaFileEntry::new("/p/a.jpg", 1, MediaKind::Image, None),
///     MediaFileEntry::new("/p/b.mp4", 2, MediaKind::Video, None),
/// ];
/// let result = ScanResult::new("/p", files, 15);
/// assert_eq!(result.total_files, 2);
/// assert_eq!(result.image_count, 1);
/// assert_eq!(result.video_count, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// The root path that was walked.
    pub root_path: String,

    /// Media files found, in discovery order.
    pub files: Vec<MediaFileEntry>,

    /// Number of files in `files`.
    pub total_files: u64,

    /// Number of files classified as images.
    pub image_count: u64,

    /// Number of files classified as videos.
    pub video_count: u64,

    /// Wall-clock duration of the walk in milliseconds.
    pub scan_duration_ms: u64,

    /// Directories that were listed (successfully or not).
    #[serde(default)]
    pub scanned_directories: u64,

    /// Directories whose listing failed and contributed nothing.
    #[serde(default)]
    pub failed_directories: u64,

    /// Set when a budget stopped the walk before the tree was exhausted.
    #[serde(default)]
    pub truncated: Option<Truncation>,
}

impl ScanResult {
    /// Builds a result from a file list, deriving all counts from it.
    #[must_use]
    pub fn new(root_path: impl Into<String>, files: Vec<MediaFileEntry>, scan_duration_ms: u64) -> Self {
        let (image_count, video_count) = count_kinds(&files);

        Self {
            root_path: root_path.into(),
            total_files: files.len() as u64,
            files,
            image_count,
            video_count,
            scan_duration_ms,
            scanned_directories: 0,
            failed_directories: 0,
            truncated: None,
        }
    }

    /// Records directory counters from the walk.
    #[must_use]
    pub const fn with_directories(mut self, scanned: u64, failed: u64) -> Self {
        self.scanned_directories = scanned;
        self.failed_directories = failed;
        self
    }

    /// Records why the walk stopped early.
    #[must_use]
    pub const fn with_truncation(mut self, truncated: Option<Truncation>) -> Self {
        self.truncated = truncated;
        self
    }

    /// Returns `true` if a budget cut the walk short.
    #[inline]
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated.is_some()
    }

    /// Recomputes the image and video counts from the file names.
    ///
    /// Used to check that stored counts never drift from the file list.
    #[must_use]
    pub fn recount(&self) -> (u64, u64) {
        self.files
            .iter()
            .fold((0, 0), |(images, videos), file| match classify(&file.base_name) {
                Some(MediaKind::Image) => (images + 1, videos),
                Some(MediaKind::Video) => (images, videos + 1),
                None => (images, videos),
            })
    }
}

fn count_kinds(files: &[MediaFileEntry]) -> (u64, u64) {
    files.iter().fold((0, 0), |(images, videos), file| match file.kind {
        MediaKind::Image => (images + 1, videos),
        MediaKind::Video => (images, videos + 1),
    })
}
