//! Append-only scan log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::ScanResult;
use super::status::LogStatus;

/// What triggered a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanTrigger {
    /// A caller asked for a scan that may be served from cache.
    #[default]
    Manual,
    /// A caller asked to bypass and replace the cache.
    Forced,
    /// A fire-and-forget multi-path background scan.
    Background,
    /// The periodic rescan scheduler.
    Scheduled,
}

impl ScanTrigger {
    /// Returns a human-readable label for this trigger.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Forced => "forced",
            Self::Background => "background",
            Self::Scheduled => "scheduled",
        }
    }
}

/// One scan attempt event in a target's log partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLogRecord {
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Scanned root path.
    pub path: String,
    /// What triggered the scan.
    pub scan_type: ScanTrigger,
    /// Started, completed, or failed.
    pub status: LogStatus,
    /// Task the event belongs to.
    #[serde(default)]
    pub task_id: Option<String>,
    /// Total media files (completed only).
    #[serde(default)]
    pub total_files: Option<u64>,
    /// Image files (completed only).
    #[serde(default)]
    pub image_count: Option<u64>,
    /// Video files (completed only).
    #[serde(default)]
    pub video_count: Option<u64>,
    /// Scan duration (completed and failed).
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Failure description (failed only).
    #[serde(default)]
    pub error_message: Option<String>,
    /// Free-text details, typically the per-batch progress log.
    #[serde(default)]
    pub log_details: Option<String>,
}

impl ScanLogRecord {
    /// A "started" record.
    #[must_use]
    pub fn started(path: impl Into<String>, scan_type: ScanTrigger, task_id: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            path: path.into(),
            scan_type,
            status: LogStatus::Started,
            task_id: Some(task_id.to_owned()),
            total_files: None,
            image_count: None,
            video_count: None,
            duration_ms: None,
            error_message: None,
            log_details: None,
        }
    }

    /// A "completed" record carrying the result's counts.
    #[must_use]
    pub fn completed(
        scan_type: ScanTrigger,
        task_id: &str,
        result: &ScanResult,
        log_details: Option<String>,
    ) -> Self {
        Self {
            status: LogStatus::Completed,
            total_files: Some(result.total_files),
            image_count: Some(result.image_count),
            video_count: Some(result.video_count),
            duration_ms: Some(result.scan_duration_ms),
            log_details,
            ..Self::started(result.root_path.clone(), scan_type, task_id)
        }
    }

    /// A "failed" record.
    #[must_use]
    pub fn failed(
        path: impl Into<String>,
        scan_type: ScanTrigger,
        task_id: &str,
        duration_ms: u64,
        error_message: impl Into<String>,
        log_details: Option<String>,
    ) -> Self {
        Self {
            status: LogStatus::Failed,
            duration_ms: Some(duration_ms),
            error_message: Some(error_message.into()),
            log_details,
            ..Self::started(path, scan_type, task_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_record_copies_counts() {
        let result = ScanResult::new("/p", Vec::new(), 42);
        let record = ScanLogRecord::completed(ScanTrigger::Forced, "t1", &result, None);
        assert_eq!(record.status, LogStatus::Completed);
        assert_eq!(record.path, "/p");
        assert_eq!(record.total_files, Some(0));
        assert_eq!(record.duration_ms, Some(42));
        assert_eq!(record.task_id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_failed_record() {
        let record = ScanLogRecord::failed("/p", ScanTrigger::Manual, "t2", 7, "boom", None);
        assert_eq!(record.status, LogStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("boom"));
        assert!(record.total_files.is_none());
    }

    #[test]
    fn test_record_json_round_trip() {
        let record = ScanLogRecord::started("/p", ScanTrigger::Scheduled, "t3");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""scan_type":"scheduled""#));
        let parsed: ScanLogRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
