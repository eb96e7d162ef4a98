//! Scan task records.
//!
//! A [`TaskKey`] identifies "the same scan": server, username, and the set
//! of root paths. Two requests with the same key must never walk the tree
//! concurrently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::progress::ScanProgress;
use super::status::TaskStatus;

/// Canonical de-duplication key for a scan.
///
/// Paths are sorted and de-duplicated on construction, so the order in
/// which a caller lists them does not matter. The password is never part
/// of the key.
///
/// # Examples
///
/// ```
/// use wm_core::TaskKey;
///
/// let a = TaskKey::new("https://x", "alice", ["/b", "/a"]);
/// let b = TaskKey::new("https://x", "alice", ["/a", "/b", "/a"]);
/// assert_eq!(a, b);
/// assert!(a.covers("/a"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    /// Server base URL.
    pub server_url: String,
    /// Username on that server.
    pub username: String,
    /// Sorted, de-duplicated root paths.
    ///
    /// Inline storage for up to 4 paths; most scans cover one.
    pub paths: SmallVec<[String; 4]>,
}

impl TaskKey {
    /// Creates a canonical key.
    #[must_use]
    pub fn new<I, S>(server_url: impl Into<String>, username: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut paths: SmallVec<[String; 4]> = paths.into_iter().map(Into::into).collect();
        paths.sort_unstable();
        paths.dedup();

        Self {
            server_url: server_url.into(),
            username: username.into(),
            paths,
        }
    }

    /// Returns `true` if this key belongs to the given server and user.
    #[inline]
    #[must_use]
    pub fn is_for(&self, server_url: &str, username: &str) -> bool {
        self.server_url == server_url && self.username == username
    }

    /// Returns `true` if `path` is one of this key's root paths.
    #[must_use]
    pub fn covers(&self, path: &str) -> bool {
        self.paths.binary_search_by(|p| p.as_str().cmp(path)).is_ok()
    }
}

/// A registry record for one in-flight or recently finished scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTaskRecord {
    /// Opaque task identifier.
    pub task_id: String,
    /// The de-duplication key.
    pub key: TaskKey,
    /// When the task was started.
    pub started_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Failure description, set when `status` is `Failed`.
    pub error_message: Option<String>,
    /// When the task completed or failed.
    pub finished_at: Option<DateTime<Utc>>,
    /// Latest progress snapshot reported by the walk.
    pub progress: Option<ScanProgress>,
}

impl ScanTaskRecord {
    /// Creates a running record.
    #[must_use]
    pub fn running(task_id: impl Into<String>, key: TaskKey, started_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            key,
            started_at,
            status: TaskStatus::Running,
            error_message: None,
            finished_at: None,
            progress: None,
        }
    }
}
