//! The scan service.
//!
//! [`ScanOrchestrator`] ties the pieces together: it answers from the
//! [`ScanCache`] when it can, de-duplicates concurrent requests through the
//! [`ScanTaskRegistry`], drives a [`DirectoryWalker`], and records every
//! attempt in the [`ScanLog`].
//!
//! # Request flow
//!
//! ```text
//! run_scan(request)
//!     │
//!     ├── cache hit and not forced ──────────────► Cached
//!     │
//!     ├── begin_task joins a running task ───────► AlreadyRunning
//!     │
//!     └── begin_task starts a new task
//!             ├── forced: delete cache entry
//!             ├── log "started"
//!             ├── connect + walk (progress → registry)
//!             ├── ok:  save cache, log "completed" ──► Completed
//!             └── err: log "failed", fail task ──────► Err
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use wm_core::{
    CacheEntry, CacheKey, CacheSummary, Config, ScanLogRecord, ScanProgress, ScanResult,
    ScanSettings, ScanTaskRecord, ScanTrigger,
};

use crate::cache::ScanCache;
use crate::client::{Credentials, DavConnector, normalize_path};
use crate::error::ScanError;
use crate::log::ScanLog;
use crate::registry::{ScanTaskRegistry, TaskStart};
use crate::stats::{ScanStats, StatsSnapshot};
use crate::walker::{DirectoryWalker, WalkOptions};

/// Parameters of a single-path scan.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Who to scan as.
    pub credentials: Credentials,
    /// Root path on the server.
    pub path: String,
    /// Walk budgets.
    pub settings: ScanSettings,
    /// Ignore and replace any cached result.
    pub force_rescan: bool,
    /// Recorded in the scan log.
    pub trigger: ScanTrigger,
}

impl ScanRequest {
    /// A cache-friendly manual scan with default settings.
    #[must_use]
    pub fn new(credentials: Credentials, path: impl Into<String>) -> Self {
        Self {
            credentials,
            path: path.into(),
            settings: ScanSettings::default(),
            force_rescan: false,
            trigger: ScanTrigger::Manual,
        }
    }

    /// Sets the walk budgets.
    #[must_use]
    pub const fn with_settings(mut self, settings: ScanSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Bypasses the cache. A manual trigger becomes [`ScanTrigger::Forced`].
    #[must_use]
    pub const fn forced(mut self) -> Self {
        self.force_rescan = true;
        if matches!(self.trigger, ScanTrigger::Manual) {
            self.trigger = ScanTrigger::Forced;
        }
        self
    }

    /// Sets the trigger recorded in the scan log.
    #[must_use]
    pub const fn with_trigger(mut self, trigger: ScanTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// The cache key of this request's target.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(
            self.credentials.server_url.as_str(),
            self.credentials.username.as_str(),
            normalize_path(&self.path),
        )
    }
}

/// What [`ScanOrchestrator::run_scan`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Served from the cache without touching the server.
    Cached {
        /// The cached entry.
        entry: CacheEntry,
        /// Always `true`.
        from_cache: bool,
    },
    /// A new walk ran to completion and was cached.
    Completed {
        /// The task that ran the walk.
        task_id: String,
        /// The walk result.
        result: ScanResult,
    },
    /// A walk for the same target was already in flight.
    AlreadyRunning {
        /// The running task.
        task_id: String,
    },
}

impl ScanOutcome {
    /// The scan result, unless the request joined a running task.
    #[must_use]
    pub fn result(&self) -> Option<&ScanResult> {
        match self {
            Self::Cached { entry, .. } => Some(&entry.result),
            Self::Completed { result, .. } => Some(result),
            Self::AlreadyRunning { .. } => None,
        }
    }

    /// The task id, for outcomes that involved a task.
    #[must_use]
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Cached { .. } => None,
            Self::Completed { task_id, .. } | Self::AlreadyRunning { task_id } => Some(task_id),
        }
    }

    /// Returns `true` if the outcome came from the cache.
    #[inline]
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        matches!(self, Self::Cached { .. })
    }
}

/// Cached state of a target without doing any work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachePeek {
    /// The cached entry, if any.
    pub entry: Option<CacheEntry>,
    /// The running task for the target, if any.
    pub running_task: Option<ScanTaskRecord>,
}

/// Totals of a synchronous multi-path run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PathsSummary {
    /// Media files across all paths.
    pub total_files: u64,
    /// Images across all paths.
    pub image_count: u64,
    /// Videos across all paths.
    pub video_count: u64,
    /// Per-path outcome.
    pub outcomes: BTreeMap<String, ScanOutcome>,
}

impl PathsSummary {
    fn add(&mut self, path: String, outcome: ScanOutcome) {
        if let Some(result) = outcome.result() {
            self.total_files += result.total_files;
            self.image_count += result.image_count;
            self.video_count += result.video_count;
        }
        self.outcomes.insert(path, outcome);
    }
}

/// Result counts of a background scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackgroundTally {
    /// Paths that completed, were cached, or joined a running task.
    pub succeeded: usize,
    /// Paths whose scan failed.
    pub failed: usize,
    /// Paths skipped because a running task already covered them.
    pub skipped: usize,
}

/// Handle to a background multi-path scan.
///
/// Dropping the handle does not cancel the scans.
#[derive(Debug)]
pub struct BackgroundScan {
    /// Paths a scan was spawned for.
    pub scheduled: Vec<String>,
    /// Paths already being scanned.
    pub skipped: Vec<String>,
    /// Resolves to the tally once every spawned scan has finished.
    pub handle: JoinHandle<BackgroundTally>,
}

struct Inner<C> {
    connector: C,
    cache: ScanCache,
    registry: Arc<ScanTaskRegistry>,
    logs: ScanLog,
    stats: ScanStats,
}

/// The scan service. Cheap to clone; clones share all state.
pub struct ScanOrchestrator<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for ScanOrchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> std::fmt::Debug for ScanOrchestrator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("cache", &self.inner.cache)
            .field("registry", &self.inner.registry)
            .field("logs", &self.inner.logs)
            .field("stats", &self.inner.stats)
            .finish_non_exhaustive()
    }
}

impl<C: DavConnector> ScanOrchestrator<C> {
    /// Creates a service from its parts.
    #[must_use]
    pub fn new(connector: C, cache: ScanCache, registry: ScanTaskRegistry, logs: ScanLog) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                cache,
                registry: Arc::new(registry),
                logs,
                stats: ScanStats::new(),
            }),
        }
    }

    /// Creates a service with in-memory stores and default retention.
    #[must_use]
    pub fn in_memory(connector: C) -> Self {
        Self::new(
            connector,
            ScanCache::new(),
            ScanTaskRegistry::default(),
            ScanLog::new(),
        )
    }

    /// Creates a service with stores under `config.storage.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Store`] if a store directory cannot be opened.
    pub fn from_config(connector: C, config: &Config) -> Result<Self, ScanError> {
        let cache = ScanCache::open(config.storage.cache_dir())?;
        let logs = ScanLog::open(config.storage.log_dir())?;
        Ok(Self::new(
            connector,
            cache,
            ScanTaskRegistry::new(config.tasks),
            logs,
        ))
    }

    /// The scan cache.
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ScanCache {
        &self.inner.cache
    }

    /// The task registry, shareable with a sweeper.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ScanTaskRegistry> {
        &self.inner.registry
    }

    /// The scan log.
    #[inline]
    #[must_use]
    pub fn scan_log(&self) -> &ScanLog {
        &self.inner.logs
    }

    /// Scans one path, or answers from the cache.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] for invalid settings before any work
    /// starts. Connect, fatal listing, and store failures fail the task and
    /// are returned after a "failed" record is logged.
    pub async fn run_scan(&self, request: ScanRequest) -> Result<ScanOutcome, ScanError> {
        request.settings.validate()?;
        let key = request.cache_key();
        let inner = &self.inner;

        if !request.force_rescan {
            if let Some(entry) = inner.cache.get(&key) {
                debug!(path = %key.path, "Serving scan from cache");
                inner.stats.increment_cache_hits();
                return Ok(ScanOutcome::Cached {
                    entry,
                    from_cache: true,
                });
            }
        }

        let task_id =
            match inner
                .registry
                .begin_task(&key.server_url, &key.username, [key.path.as_str()])
            {
                TaskStart::Started(id) => id,
                TaskStart::Joined(task_id) => {
                    info!(path = %key.path, task_id = %task_id, "Scan already running");
                    inner.stats.increment_joined();
                    return Ok(ScanOutcome::AlreadyRunning { task_id });
                }
            };

        inner.stats.increment_started();
        info!(
            path = %key.path,
            task_id = %task_id,
            trigger = request.trigger.label(),
            "Starting scan"
        );

        let started = Instant::now();
        let guard = TaskGuard {
            inner: inner.as_ref(),
            key: &key,
            task_id: &task_id,
            trigger: request.trigger,
            started,
            armed: true,
        };
        let mut progress_log = Vec::new();
        let outcome = self.execute(&request, &key, &task_id, &mut progress_log).await;
        guard.disarm();

        match outcome {
            Ok(result) => {
                inner.registry.complete_task(&task_id);
                inner.stats.increment_completed();
                info!(
                    path = %key.path,
                    task_id = %task_id,
                    total_files = result.total_files,
                    images = result.image_count,
                    videos = result.video_count,
                    failed_directories = result.failed_directories,
                    truncated = result.truncated.map(|t| t.label()),
                    duration_ms = result.scan_duration_ms,
                    "Scan completed"
                );
                Ok(ScanOutcome::Completed { task_id, result })
            }
            Err(err) => {
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                let record = ScanLogRecord::failed(
                    key.path.as_str(),
                    request.trigger,
                    &task_id,
                    duration_ms,
                    err.to_string(),
                    join_log(&progress_log),
                );
                if let Err(log_err) = inner.logs.append(&key, record) {
                    warn!(path = %key.path, error = %log_err, "Failed to record scan failure");
                }
                inner.registry.fail_task(&task_id, err.to_string());
                inner.stats.increment_failed();
                error!(path = %key.path, task_id = %task_id, error = %err, "Scan failed");
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        request: &ScanRequest,
        key: &CacheKey,
        task_id: &str,
        progress_log: &mut Vec<String>,
    ) -> Result<ScanResult, ScanError> {
        let inner = &self.inner;

        if request.force_rescan && inner.cache.delete(key)? {
            debug!(path = %key.path, "Dropped cached scan before forced rescan");
        }
        inner.logs.append(
            key,
            ScanLogRecord::started(key.path.as_str(), request.trigger, task_id),
        )?;

        let client = inner
            .connector
            .connect(&request.credentials)
            .map_err(|source| ScanError::Connect {
                server_url: key.server_url.clone(),
                source,
            })?;

        let options = WalkOptions::from(&request.settings);
        let mut walker = DirectoryWalker::start(&client, &key.path, options).await;
        let mut batch = 0u64;
        while let Some(progress) = walker.next_batch().await? {
            batch += 1;
            let line = progress.summary_line(batch);
            debug!(task_id, "{line}");
            progress_log.push(line);
            inner.registry.update_progress(task_id, progress);
        }
        let result = walker.finish();

        inner.cache.save(CacheEntry {
            key: key.clone(),
            result: result.clone(),
            last_scan: Utc::now(),
            settings: request.settings,
        })?;
        inner.logs.append(
            key,
            ScanLogRecord::completed(request.trigger, task_id, &result, join_log(progress_log)),
        )?;

        Ok(result)
    }

    /// The cached entry and running task for a target, without doing any
    /// work.
    #[must_use]
    pub fn peek(&self, credentials: &Credentials, path: &str) -> CachePeek {
        let path = normalize_path(path);
        let key = CacheKey::new(
            credentials.server_url.as_str(),
            credentials.username.as_str(),
            path.as_str(),
        );
        CachePeek {
            entry: self.inner.cache.get(&key),
            running_task: self.inner.registry.get_running_task(
                &credentials.server_url,
                &credentials.username,
                [path],
            ),
        }
    }

    /// Latest progress of a task, running or recently finished.
    #[must_use]
    pub fn scan_status(&self, task_id: &str) -> Option<ScanProgress> {
        self.inner.registry.get_task(task_id)?.progress
    }

    /// Full record of a task, running or recently finished.
    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<ScanTaskRecord> {
        self.inner.registry.get_task(task_id)
    }

    /// Per-path counts of every cached scan for a server and user.
    #[must_use]
    pub fn cache_summary(&self, server_url: &str, username: &str) -> BTreeMap<String, CacheSummary> {
        self.inner
            .cache
            .list_by_server(server_url, username)
            .into_iter()
            .map(|entry| {
                let summary = entry.summary();
                (entry.key.path, summary)
            })
            .collect()
    }

    /// Deletes a cached scan. Returns `true` if one existed.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Store`] if the persisted entry cannot be removed.
    pub fn delete_cache_entry(
        &self,
        server_url: &str,
        username: &str,
        path: &str,
    ) -> Result<bool, ScanError> {
        let key = CacheKey::new(server_url, username, normalize_path(path));
        let deleted = self.inner.cache.delete(&key)?;
        if deleted {
            info!(path = %key.path, "Deleted cached scan");
        }
        Ok(deleted)
    }

    /// Up to `limit` scan log records of a target, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Store`] if the persisted log cannot be read.
    pub fn logs(
        &self,
        server_url: &str,
        username: &str,
        path: &str,
        limit: usize,
    ) -> Result<Vec<ScanLogRecord>, ScanError> {
        let key = CacheKey::new(server_url, username, normalize_path(path));
        self.inner.logs.records(&key, limit)
    }

    /// Scans several paths one after another and totals the results.
    ///
    /// # Errors
    ///
    /// The first failing path aborts the remaining ones and its error is
    /// returned.
    pub async fn run_scan_paths<S: AsRef<str>>(
        &self,
        credentials: &Credentials,
        paths: &[S],
        settings: ScanSettings,
        force_rescan: bool,
        trigger: ScanTrigger,
    ) -> Result<PathsSummary, ScanError> {
        let mut summary = PathsSummary::default();
        for path in paths {
            let request = build_request(credentials, path.as_ref(), settings, force_rescan, trigger);
            let outcome = self.run_scan(request).await?;
            summary.add(normalize_path(path.as_ref()), outcome);
        }
        Ok(summary)
    }

    /// Counters of what the service has done since it was created.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Spawns one scan per path and returns immediately.
    ///
    /// Paths already covered by a running task are skipped. Individual
    /// failures are logged and counted, never propagated.
    pub fn spawn_background_scan<S: AsRef<str>>(
        &self,
        credentials: &Credentials,
        paths: &[S],
        settings: ScanSettings,
        force_rescan: bool,
        trigger: ScanTrigger,
    ) -> BackgroundScan {
        let candidates: Vec<String> = paths.iter().map(|p| normalize_path(p.as_ref())).collect();
        let scheduled = self.inner.registry.get_paths_to_scan(
            &credentials.server_url,
            &credentials.username,
            candidates.as_slice(),
        );
        let skipped: Vec<String> = candidates
            .into_iter()
            .filter(|path| !scheduled.contains(path))
            .collect();

        let mut scans = Vec::with_capacity(scheduled.len());
        for path in &scheduled {
            let service = self.clone();
            let request = build_request(credentials, path, settings, force_rescan, trigger);
            scans.push((
                path.clone(),
                tokio::spawn(async move { service.run_scan(request).await }),
            ));
        }

        let skipped_count = skipped.len();
        let handle = tokio::spawn(async move {
            let mut tally = BackgroundTally {
                skipped: skipped_count,
                ..BackgroundTally::default()
            };
            for (path, scan) in scans {
                match scan.await {
                    Ok(Ok(_)) => tally.succeeded += 1,
                    Ok(Err(err)) => {
                        warn!(path = %path, error = %err, "Background scan failed");
                        tally.failed += 1;
                    }
                    Err(err) => {
                        warn!(path = %path, error = %err, "Background scan task aborted");
                        tally.failed += 1;
                    }
                }
            }
            info!(
                succeeded = tally.succeeded,
                failed = tally.failed,
                skipped = tally.skipped,
                "Background scan finished"
            );
            tally
        });

        BackgroundScan {
            scheduled,
            skipped,
            handle,
        }
    }
}

const CANCELLED: &str = "scan cancelled before it finished";

/// Fails the owned task if [`ScanOrchestrator::run_scan`] is dropped
/// mid-walk, so the target can be scanned again right away.
struct TaskGuard<'a, C> {
    inner: &'a Inner<C>,
    key: &'a CacheKey,
    task_id: &'a str,
    trigger: ScanTrigger,
    started: Instant,
    armed: bool,
}

impl<C> TaskGuard<'_, C> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<C> Drop for TaskGuard<'_, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(path = %self.key.path, task_id = %self.task_id, "Scan dropped before finishing");

        let duration_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let record = ScanLogRecord::failed(
            self.key.path.as_str(),
            self.trigger,
            self.task_id,
            duration_ms,
            CANCELLED,
            None,
        );
        if let Err(err) = self.inner.logs.append(self.key, record) {
            warn!(path = %self.key.path, error = %err, "Failed to record cancelled scan");
        }
        self.inner.registry.fail_task(self.task_id, CANCELLED);
        self.inner.stats.increment_failed();
    }
}

fn build_request(
    credentials: &Credentials,
    path: &str,
    settings: ScanSettings,
    force_rescan: bool,
    trigger: ScanTrigger,
) -> ScanRequest {
    ScanRequest {
        credentials: credentials.clone(),
        path: path.to_owned(),
        settings,
        force_rescan,
        trigger,
    }
}

fn join_log(lines: &[String]) -> Option<String> {
    (!lines.is_empty()).then(|| lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::memory::MemoryDav;
    use wm_core::{LogStatus, TaskStatus};

    fn creds() -> Credentials {
        Credentials::new("https://dav.example", "alice", "secret")
    }

    fn service_with(files: &[&str]) -> (MemoryDav, ScanOrchestrator<MemoryDav>) {
        let dav = MemoryDav::new();
        for file in files {
            dav.add_file(file, 1);
        }
        let service = ScanOrchestrator::in_memory(dav.clone());
        (dav, service)
    }

    #[test]
    fn test_request_builders() {
        let request = ScanRequest::new(creds(), "photos/").forced();
        assert!(request.force_rescan);
        assert_eq!(request.trigger, ScanTrigger::Forced);
        assert_eq!(request.cache_key().path, "/photos");

        let scheduled = ScanRequest::new(creds(), "/p")
            .with_trigger(ScanTrigger::Scheduled)
            .forced();
        assert_eq!(scheduled.trigger, ScanTrigger::Scheduled);
    }

    #[tokio::test]
    async fn test_completed_scan_is_cached_and_logged() {
        let (_, service) = service_with(&["/p/a.jpg", "/p/b.mp4", "/p/c.txt"]);

        let outcome = service.run_scan(ScanRequest::new(creds(), "/p")).await.unwrap();
        let ScanOutcome::Completed { task_id, result } = &outcome else {
            panic!("expected a completed scan, got {outcome:?}");
        };
        assert_eq!(result.total_files, 2);

        let record = service.task(task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(service.scan_status(task_id).unwrap().percentage, 100);

        let logs = service.logs("https://dav.example", "alice", "/p", 10).unwrap();
        let statuses: Vec<_> = logs.iter().map(|r| r.status).collect();
        assert_eq!(statuses, [LogStatus::Completed, LogStatus::Started]);
        assert!(logs[0].log_details.as_deref().unwrap().starts_with("batch 1:"));

        let summary = service.cache_summary("https://dav.example", "alice");
        assert_eq!(summary["/p"].total, 2);
        assert_eq!(summary["/p"].images, 1);
        assert_eq!(summary["/p"].videos, 1);
    }

    #[tokio::test]
    async fn test_cache_key_ignores_password() {
        let (dav, service) = service_with(&["/p/a.jpg"]);
        service.run_scan(ScanRequest::new(creds(), "/p")).await.unwrap();
        dav.reset_list_calls();

        let other_password = Credentials::new("https://dav.example", "alice", "changed");
        let outcome = service
            .run_scan(ScanRequest::new(other_password, "/p"))
            .await
            .unwrap();
        assert!(outcome.is_cached());
        assert_eq!(dav.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_fails_task_and_logs() {
        let (dav, service) = service_with(&["/p/a.jpg"]);
        dav.fail("/p", |_| ClientError::Unauthorized);

        let err = service.run_scan(ScanRequest::new(creds(), "/p")).await.unwrap_err();
        assert!(err.is_remote());

        let logs = service.logs("https://dav.example", "alice", "/p", 10).unwrap();
        assert_eq!(logs[0].status, LogStatus::Failed);
        assert!(logs[0].error_message.as_deref().unwrap().contains("credentials rejected"));
        assert!(logs[0].duration_ms.is_some());

        let task_id = logs[0].task_id.clone().unwrap();
        assert_eq!(service.task(&task_id).unwrap().status, TaskStatus::Failed);
        assert!(service.cache().is_empty());
        assert_eq!(service.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected_before_work() {
        let (dav, service) = service_with(&["/p/a.jpg"]);
        let settings = ScanSettings {
            batch_size: 0,
            ..ScanSettings::default()
        };

        let err = service
            .run_scan(ScanRequest::new(creds(), "/p").with_settings(settings))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
        assert_eq!(dav.list_calls(), 0);
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn test_peek_and_delete() {
        let (_, service) = service_with(&["/p/a.jpg"]);
        assert!(service.peek(&creds(), "/p").entry.is_none());

        service.run_scan(ScanRequest::new(creds(), "/p")).await.unwrap();
        let peek = service.peek(&creds(), "/p/");
        assert_eq!(peek.entry.unwrap().result.total_files, 1);
        assert!(peek.running_task.is_none());

        assert!(service.delete_cache_entry("https://dav.example", "alice", "/p").unwrap());
        assert!(service.peek(&creds(), "/p").entry.is_none());
    }

    #[tokio::test]
    async fn test_run_scan_paths_totals() {
        let (_, service) = service_with(&["/a/1.jpg", "/a/2.jpg", "/b/3.mp4"]);

        let summary = service
            .run_scan_paths(&creds(), &["/a", "/b"], ScanSettings::default(), false, ScanTrigger::Manual)
            .await
            .unwrap();
        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.image_count, 2);
        assert_eq!(summary.video_count, 1);
        assert_eq!(summary.outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_run_scan_paths_stops_at_first_failure() {
        let (dav, service) = service_with(&["/a/1.jpg", "/b/2.jpg", "/c/3.jpg"]);
        dav.fail("/b", |_| ClientError::Unauthorized);

        let result = service
            .run_scan_paths(&creds(), &["/a", "/b", "/c"], ScanSettings::default(), false, ScanTrigger::Manual)
            .await;
        assert!(result.is_err());
        assert!(service.peek(&creds(), "/a").entry.is_some());
        assert!(service.peek(&creds(), "/c").entry.is_none());
    }

    #[tokio::test]
    async fn test_background_scan_tally() {
        let (dav, service) = service_with(&["/a/1.jpg", "/b/2.jpg"]);
        dav.fail("/b", |_| ClientError::Unauthorized);
        service.registry().start_task("https://dav.example", "alice", ["/busy"]);

        let background = service.spawn_background_scan(
            &creds(),
            &["/a", "/b", "/busy"],
            ScanSettings::default(),
            false,
            ScanTrigger::Background,
        );
        assert_eq!(background.scheduled, ["/a", "/b"]);
        assert_eq!(background.skipped, ["/busy"]);

        let tally = background.handle.await.unwrap();
        assert_eq!(
            tally,
            BackgroundTally {
                succeeded: 1,
                failed: 1,
                skipped: 1
            }
        );

        let logs = service.logs("https://dav.example", "alice", "/a", 1).unwrap();
        assert_eq!(logs[0].scan_type, ScanTrigger::Background);
    }

    #[tokio::test]
    async fn test_dropped_scan_releases_task() {
        let (dav, service) = service_with(&["/p/a.jpg"]);
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        dav.set_gate(Arc::clone(&gate));

        let scan = tokio::spawn({
            let service = service.clone();
            async move { service.run_scan(ScanRequest::new(creds(), "/p")).await }
        });
        for _ in 0..100 {
            if service.registry().is_task_running("https://dav.example", "alice", ["/p"]) {
                break;
            }
            tokio::task::yield_now().await;
        }
        let task_id = service
            .registry()
            .get_running_task("https://dav.example", "alice", ["/p"])
            .unwrap()
            .task_id;

        scan.abort();
        assert!(scan.await.unwrap_err().is_cancelled());

        let record = service.task(&task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some(CANCELLED));
        let logs = service.logs("https://dav.example", "alice", "/p", 1).unwrap();
        assert_eq!(logs[0].status, LogStatus::Failed);
        assert_eq!(service.stats().failed, 1);

        gate.add_permits(10);
        let outcome = service.run_scan(ScanRequest::new(creds(), "/p")).await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Completed { .. }));
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let outcome = ScanOutcome::AlreadyRunning {
            task_id: "scan-1".to_owned(),
        };
        insta::assert_snapshot!(
            serde_json::to_string(&outcome).unwrap(),
            @r#"{"outcome":"already_running","task_id":"scan-1"}"#
        );
    }
}
