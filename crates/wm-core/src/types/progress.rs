//! Per-batch progress snapshots.

use serde::{Deserialize, Serialize};

/// A snapshot of walk progress, produced after every processed batch.
///
/// Progress is transient: it lives for one walk and is only retained as the
/// latest snapshot on the running task record.
///
/// # Examples
///
/// ```
/// use wm_core::ScanProgress;
///
/// assert_eq!(ScanProgress::percentage_of(1, 3), 33);
/// assert_eq!(ScanProgress::percentage_of(2, 3), 67);
/// assert_eq!(ScanProgress::percentage_of(5, 0), 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// The first directory of the batch that was just processed.
    pub current_path: String,

    /// Directories listed so far.
    pub scanned_directories: u64,

    /// Directories the estimation pass expects to list.
    pub total_directories: u64,

    /// Media files collected so far.
    pub found_files: u64,

    /// `round(scanned / total * 100)`, clamped to `0..=100`.
    pub percentage: u8,

    /// Directories still queued (head of the queue only).
    pub pending_directories: Vec<String>,

    /// Directories completed in the batch that produced this snapshot.
    pub completed_directories: Vec<String>,

    /// Directories whose listing failed so far.
    pub failed_directories: u64,
}

impl ScanProgress {
    /// Computes a rounded percentage, `0` when `total` is zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percentage_of(scanned: u64, total: u64) -> u8 {
        if total == 0 {
            return 0;
        }
        let pct = (scanned as f64 / total as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }

    /// Renders a one-line summary used in scan log details.
    #[must_use]
    pub fn summary_line(&self, batch: u64) -> String {
        format!(
            "batch {batch}: {}/{} dirs ({}%), {} files, {} failed, at {}",
            self.scanned_directories,
            self.total_directories,
            self.percentage,
            self.found_files,
            self.failed_directories,
            self.current_path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(ScanProgress::percentage_of(0, 10), 0);
        assert_eq!(ScanProgress::percentage_of(1, 8), 13);
        assert_eq!(ScanProgress::percentage_of(10, 10), 100);
    }

    #[test]
    fn test_percentage_clamped_when_tree_grew() {
        assert_eq!(ScanProgress::percentage_of(12, 10), 100);
    }

    #[test]
    fn test_summary_line() {
        let progress = ScanProgress {
            current_path: "/photos/2024".to_owned(),
            scanned_directories: 3,
            total_directories: 6,
            found_files: 42,
            percentage: 50,
            failed_directories: 1,
            ..ScanProgress::default()
        };
        insta::assert_snapshot!(
            progress.summary_line(2),
            @"batch 2: 3/6 dirs (50%), 42 files, 1 failed, at /photos/2024"
        );
    }
}
