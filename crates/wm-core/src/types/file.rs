//! Media file entries produced by a scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::media::MediaKind;

/// A media file discovered during a scan.
///
/// Entries are immutable once produced. They are owned by the
/// [`ScanResult`](crate::ScanResult) that created them and copied into cache
/// entries and caller responses.
///
/// # Examples
///
/// ```
/// use wm_core::{MediaFileEntry, MediaKind};
///
/// let entry = MediaFileEntry::new("/photos/2024/beach.jpg", 2048, MediaKind::Image, None);
/// assert_eq!(entry.base_name, "beach.jpg");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFileEntry {
    /// Full remote path of the file.
    pub full_path: String,

    /// The final path component.
    pub base_name: String,

    /// File size in bytes as reported by the server.
    pub size_bytes: u64,

    /// Whether this is an image or a video.
    pub kind: MediaKind,

    /// Last modification time, when the server reports one.
    pub last_modified: Option<DateTime<Utc>>,
}

impl MediaFileEntry {
    /// Creates an entry, deriving the base name from the full path.
    #[must_use]
    pub fn new(
        full_path: impl Into<String>,
        size_bytes: u64,
        kind: MediaKind,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        let full_path = full_path.into();
        let base_name = full_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_owned();

        Self {
            full_path,
            base_name,
            size_bytes,
            kind,
            last_modified,
        }
    }

    /// Returns `true` if this entry is an image.
    #[inline]
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.kind == MediaKind::Image
    }

    /// Returns `true` if this entry is a video.
    #[inline]
    #[must_use]
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}
