//! In-flight scan task registry.
//!
//! This module provides [`ScanTaskRegistry`], which de-duplicates scans:
//! at most one task runs per [`TaskKey`] (server, username, and path set).
//! A second request for the same key joins the running task instead of
//! starting a new walk.
//!
//! # Retention
//!
//! Finished tasks stay queryable for a while so callers can poll their
//! outcome. Windows come from [`TaskRetention`]:
//!
//! | State     | Removed after             |
//! |-----------|---------------------------|
//! | completed | `completed_ttl` (5 min)   |
//! | failed    | `failed_ttl` (1 min)      |
//! | any       | `stale_after` (30 min) from start |
//!
//! Expired tasks are purged whenever the registry is touched, and by the
//! background sweeper started with [`ScanTaskRegistry::spawn_sweeper`].
//!
//! # Examples
//!
//! ```
//! use wm_scanner::{ScanTaskRegistry, TaskStart};
//!
//! let registry = ScanTaskRegistry::default();
//! let first = registry.begin_task("https://dav.example", "alice", ["/photos"]);
//! let second = registry.begin_task("https://dav.example", "alice", ["/photos"]);
//!
//! assert!(first.is_started());
//! assert_eq!(second, TaskStart::Joined(first.task_id().to_owned()));
//! ```

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;
use wm_core::{FxHashMap, ScanProgress, ScanTaskRecord, TaskKey, TaskRetention, TaskStatus};

/// Outcome of [`ScanTaskRegistry::begin_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStart {
    /// A new task was registered; the caller must run it.
    Started(String),
    /// A task for the same key was already running.
    Joined(String),
}

impl TaskStart {
    /// The task id, either new or joined.
    #[inline]
    #[must_use]
    pub fn task_id(&self) -> &str {
        match self {
            Self::Started(id) | Self::Joined(id) => id,
        }
    }

    /// Consumes the outcome and returns the task id.
    #[must_use]
    pub fn into_task_id(self) -> String {
        match self {
            Self::Started(id) | Self::Joined(id) => id,
        }
    }

    /// Returns `true` if the caller owns a newly started task.
    #[inline]
    #[must_use]
    pub const fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

#[derive(Debug)]
struct Slot {
    record: ScanTaskRecord,
    started: Instant,
    finished: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant, retention: &TaskRetention) -> bool {
        if now.duration_since(self.started) > retention.stale_after() {
            return true;
        }
        match (self.record.status, self.finished) {
            (TaskStatus::Completed, Some(at)) => now.duration_since(at) > retention.completed_ttl(),
            (TaskStatus::Failed, Some(at)) => now.duration_since(at) > retention.failed_ttl(),
            _ => false,
        }
    }
}

/// Tracks running and recently finished scan tasks.
///
/// A single mutex guards the task map, so exactly one of any number of
/// concurrent [`begin_task`](Self::begin_task) calls for the same key wins.
/// The lock is never held across an `.await`.
#[derive(Debug, Default)]
pub struct ScanTaskRegistry {
    tasks: Mutex<FxHashMap<String, Slot>>,
    retention: TaskRetention,
}

impl ScanTaskRegistry {
    /// Creates a registry with the given retention windows.
    #[must_use]
    pub fn new(retention: TaskRetention) -> Self {
        Self {
            tasks: Mutex::new(FxHashMap::default()),
            retention,
        }
    }

    /// Registers a task for the key, or joins the one already running.
    ///
    /// The check and the insert happen under one lock acquisition.
    pub fn begin_task<I, S>(&self, server_url: &str, username: &str, paths: I) -> TaskStart
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = TaskKey::new(server_url, username, paths);
        let mut tasks = self.tasks.lock();
        self.purge(&mut tasks);

        if let Some(slot) = find_running(&tasks, &key) {
            debug!(task_id = %slot.record.task_id, "Joining running scan task");
            return TaskStart::Joined(slot.record.task_id.clone());
        }

        let task_id = new_task_id();
        tasks.insert(
            task_id.clone(),
            Slot {
                record: ScanTaskRecord::running(task_id.clone(), key, Utc::now()),
                started: Instant::now(),
                finished: None,
            },
        );
        debug!(task_id = %task_id, "Registered scan task");
        TaskStart::Started(task_id)
    }

    /// Like [`begin_task`](Self::begin_task), returning only the task id.
    pub fn start_task<I, S>(&self, server_url: &str, username: &str, paths: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.begin_task(server_url, username, paths).into_task_id()
    }

    /// Returns `true` if a task is running for the key.
    pub fn is_task_running<I, S>(&self, server_url: &str, username: &str, paths: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.get_running_task(server_url, username, paths).is_some()
    }

    /// Returns the running task for the key, if any.
    pub fn get_running_task<I, S>(
        &self,
        server_url: &str,
        username: &str,
        paths: I,
    ) -> Option<ScanTaskRecord>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = TaskKey::new(server_url, username, paths);
        let mut tasks = self.tasks.lock();
        self.purge(&mut tasks);
        find_running(&tasks, &key).map(|slot| slot.record.clone())
    }

    /// Returns a task by id, running or finished, unless it has expired.
    #[must_use]
    pub fn get_task(&self, task_id: &str) -> Option<ScanTaskRecord> {
        let mut tasks = self.tasks.lock();
        self.purge(&mut tasks);
        tasks.get(task_id).map(|slot| slot.record.clone())
    }

    /// Marks a running task completed. Returns `false` for unknown or
    /// already finished tasks.
    pub fn complete_task(&self, task_id: &str) -> bool {
        self.finish(task_id, TaskStatus::Completed, None)
    }

    /// Marks a running task failed with `message`. Returns `false` for
    /// unknown or already finished tasks.
    pub fn fail_task(&self, task_id: &str, message: impl Into<String>) -> bool {
        self.finish(task_id, TaskStatus::Failed, Some(message.into()))
    }

    /// Publishes the latest progress snapshot of a running task.
    pub fn update_progress(&self, task_id: &str, progress: ScanProgress) -> bool {
        let mut tasks = self.tasks.lock();
        match tasks.get_mut(task_id) {
            Some(slot) if slot.record.status.is_running() => {
                slot.record.progress = Some(progress);
                true
            }
            _ => false,
        }
    }

    /// Filters `candidates` down to the paths not covered by any running
    /// task of the same server and user.
    ///
    /// # Examples
    ///
    /// ```
    /// use wm_scanner::ScanTaskRegistry;
    ///
    /// let registry = ScanTaskRegistry::default();
    /// registry.start_task("https://x", "a", ["/photos"]);
    ///
    /// let todo = registry.get_paths_to_scan("https://x", "a", &["/photos", "/videos"]);
    /// assert_eq!(todo, ["/videos"]);
    /// ```
    #[must_use]
    pub fn get_paths_to_scan<S: AsRef<str>>(
        &self,
        server_url: &str,
        username: &str,
        candidates: &[S],
    ) -> Vec<String> {
        let mut tasks = self.tasks.lock();
        self.purge(&mut tasks);

        let busy: Vec<&TaskKey> = tasks
            .values()
            .filter(|slot| slot.record.status.is_running())
            .map(|slot| &slot.record.key)
            .filter(|key| key.is_for(server_url, username))
            .collect();

        candidates
            .iter()
            .map(AsRef::as_ref)
            .filter(|path| !busy.iter().any(|key| key.covers(path)))
            .map(str::to_owned)
            .collect()
    }

    /// Snapshots of every running task.
    #[must_use]
    pub fn running_tasks(&self) -> Vec<ScanTaskRecord> {
        let mut tasks = self.tasks.lock();
        self.purge(&mut tasks);
        tasks
            .values()
            .filter(|slot| slot.record.status.is_running())
            .map(|slot| slot.record.clone())
            .collect()
    }

    /// Number of tracked tasks, finished ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Returns `true` if no tasks are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Removes expired finished tasks and every task started more than
    /// `stale_after` ago. Returns the number removed.
    pub fn sweep_stale(&self) -> usize {
        let mut tasks = self.tasks.lock();
        self.purge(&mut tasks)
    }

    /// Runs [`sweep_stale`](Self::sweep_stale) every `sweep_interval` until
    /// `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = self.retention.sweep_interval().max(std::time::Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("Task sweeper cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = registry.sweep_stale();
                        if removed > 0 {
                            info!(removed, "Swept expired scan tasks");
                        }
                    }
                }
            }
        })
    }

    fn finish(&self, task_id: &str, status: TaskStatus, message: Option<String>) -> bool {
        let mut tasks = self.tasks.lock();
        let Some(slot) = tasks.get_mut(task_id) else {
            return false;
        };
        if !slot.record.status.is_running() {
            return false;
        }

        slot.record.status = status;
        slot.record.error_message = message;
        slot.record.finished_at = Some(Utc::now());
        slot.finished = Some(Instant::now());
        true
    }

    fn purge(&self, tasks: &mut FxHashMap<String, Slot>) -> usize {
        let now = Instant::now();
        let before = tasks.len();
        tasks.retain(|_, slot| !slot.is_expired(now, &self.retention));
        before - tasks.len()
    }
}

fn find_running<'a>(tasks: &'a FxHashMap<String, Slot>, key: &TaskKey) -> Option<&'a Slot> {
    tasks
        .values()
        .find(|slot| slot.record.status.is_running() && &slot.record.key == key)
}

fn new_task_id() -> String {
    format!("scan-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const URL: &str = "https://dav.example";

    #[test]
    fn test_start_task_joins_same_key() {
        let registry = ScanTaskRegistry::default();
        let a = registry.start_task(URL, "u", ["/b", "/a"]);
        let b = registry.start_task(URL, "u", ["/a", "/b"]);
        assert_eq!(a, b);
        assert!(a.starts_with("scan-"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_different_keys_get_different_tasks() {
        let registry = ScanTaskRegistry::default();
        let a = registry.start_task(URL, "u", ["/a"]);
        let b = registry.start_task(URL, "v", ["/a"]);
        let c = registry.start_task(URL, "u", ["/a", "/b"]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.running_tasks().len(), 3);
    }

    #[test]
    fn test_finished_task_allows_restart() {
        let registry = ScanTaskRegistry::default();
        let a = registry.start_task(URL, "u", ["/a"]);
        assert!(registry.complete_task(&a));
        assert!(!registry.is_task_running(URL, "u", ["/a"]));

        let b = registry.begin_task(URL, "u", ["/a"]);
        assert!(b.is_started());
        assert_ne!(b.task_id(), a);
        assert_eq!(registry.get_task(&a).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_finish_only_once() {
        let registry = ScanTaskRegistry::default();
        let id = registry.start_task(URL, "u", ["/a"]);
        assert!(registry.fail_task(&id, "boom"));
        assert!(!registry.complete_task(&id));
        assert!(!registry.complete_task("scan-unknown"));

        let record = registry.get_task(&id).unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("boom"));
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_update_progress_only_while_running() {
        let registry = ScanTaskRegistry::default();
        let id = registry.start_task(URL, "u", ["/a"]);
        let progress = ScanProgress {
            scanned_directories: 2,
            ..ScanProgress::default()
        };

        assert!(registry.update_progress(&id, progress.clone()));
        assert_eq!(
            registry.get_task(&id).unwrap().progress.unwrap().scanned_directories,
            2
        );

        registry.complete_task(&id);
        assert!(!registry.update_progress(&id, progress));
    }

    #[test]
    fn test_get_paths_to_scan() {
        let registry = ScanTaskRegistry::default();
        registry.start_task(URL, "u", ["/a", "/b"]);
        registry.start_task(URL, "other", ["/c"]);

        let todo = registry.get_paths_to_scan(URL, "u", &["/a", "/c", "/d"]);
        assert_eq!(todo, ["/c", "/d"]);
    }

    #[test]
    fn test_concurrent_begin_has_one_winner() {
        let registry = Arc::new(ScanTaskRegistry::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.begin_task(URL, "u", ["/a"]))
            })
            .collect();

        let outcomes: Vec<TaskStart> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outcomes.iter().filter(|o| o.is_started()).count(), 1);
        let first = outcomes[0].task_id();
        assert!(outcomes.iter().all(|o| o.task_id() == first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_windows() {
        let registry = ScanTaskRegistry::default();
        let done = registry.start_task(URL, "u", ["/done"]);
        let failed = registry.start_task(URL, "u", ["/failed"]);
        let running = registry.start_task(URL, "u", ["/running"]);
        registry.complete_task(&done);
        registry.fail_task(&failed, "boom");

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(registry.get_task(&done).is_some());
        assert!(registry.get_task(&failed).is_none());

        tokio::time::advance(Duration::from_secs(240)).await;
        assert!(registry.get_task(&done).is_none());
        assert!(registry.get_task(&running).is_some());

        tokio::time::advance(Duration::from_secs(1500)).await;
        assert_eq!(registry.sweep_stale(), 1);
        assert!(!registry.is_task_running(URL, "u", ["/running"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_window_applies_to_finished_tasks() {
        let registry = ScanTaskRegistry::default();
        let id = registry.start_task(URL, "u", ["/slow"]);

        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        assert!(registry.complete_task(&id));

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert_eq!(registry.sweep_stale(), 1);
        assert!(registry.get_task(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_until_cancelled() {
        let registry = Arc::new(ScanTaskRegistry::new(TaskRetention {
            sweep_interval_secs: 10,
            failed_ttl_secs: 1,
            ..TaskRetention::default()
        }));
        let id = registry.start_task(URL, "u", ["/a"]);
        registry.fail_task(&id, "boom");

        let cancel = CancellationToken::new();
        let handle = registry.spawn_sweeper(cancel.clone());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(registry.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
