//! Status enums for scan tasks and scan-log records.

use serde::{Deserialize, Serialize};

/// The lifecycle state of a scan task.
///
/// Tasks only move `Running -> Completed` or `Running -> Failed`.
///
/// # Examples
///
/// ```
/// use wm_core::TaskStatus;
///
/// assert!(TaskStatus::Running.is_running());
/// assert!(TaskStatus::Failed.is_finished());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The walk is in progress.
    #[default]
    Running,
    /// The walk finished and its result was cached.
    Completed,
    /// The walk or the cache write failed.
    Failed,
}

impl TaskStatus {
    /// Returns `true` while the task is still running.
    #[inline]
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` once the task has completed or failed.
    #[inline]
    #[must_use]
    pub const fn is_finished(self) -> bool {
        !self.is_running()
    }

    /// Returns a human-readable label for this status.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// The kind of event a scan-log record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    /// A scan was started.
    Started,
    /// A scan finished and was cached.
    Completed,
    /// A scan failed.
    Failed,
}

impl LogStatus {
    /// Returns a human-readable label for this status.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_transitions() {
        assert!(TaskStatus::Running.is_running());
        assert!(!TaskStatus::Completed.is_running());
        assert!(TaskStatus::Completed.is_finished());
        assert_eq!(TaskStatus::default(), TaskStatus::Running);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Completed).unwrap(),
            r#""completed""#
        );
        assert_eq!(serde_json::to_string(&LogStatus::Failed).unwrap(), r#""failed""#);
        assert_eq!(LogStatus::Started.label(), "started");
    }
}
