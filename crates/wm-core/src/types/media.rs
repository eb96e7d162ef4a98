//! Extension-based media classification.
//!
//! [`classify`] is a pure function used by the walker to decide which files
//! belong in a scan result and by [`ScanResult`](crate::ScanResult) to derive
//! its image and video counts.

use serde::{Deserialize, Serialize};

/// Image file extensions (lowercase, without the dot).
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif", "svg", "ico",
];

/// Video file extensions (lowercase, without the dot).
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "webm", "mov", "avi", "mkv", "flv", "wmv", "m4v", "3gp", "ogv", "ts", "mts", "m2ts",
];

/// The kind of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A still image.
    Image,
    /// A video.
    Video,
}

impl MediaKind {
    /// Returns a human-readable label for this kind.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// Classifies a file name by its extension, ignoring case.
///
/// Returns `None` for anything that is neither an image nor a video,
/// including names without an extension and dotfiles such as `.jpg`.
///
/// # Examples
///
/// ```
/// use wm_core::{MediaKind, classify};
///
/// assert_eq!(classify("IMG_0001.JPG"), Some(MediaKind::Image));
/// assert_eq!(classify("clip.m2ts"), Some(MediaKind::Video));
/// assert_eq!(classify("notes.txt"), None);
/// ```
#[must_use]
pub fn classify(file_name: &str) -> Option<MediaKind> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }

    if IMAGE_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
        Some(MediaKind::Video)
    } else {
        None
    }
}
