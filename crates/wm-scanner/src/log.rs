//! Append-only scan history.
//!
//! [`ScanLog`] keeps one partition of [`ScanLogRecord`]s per scan target
//! (server, user, path). Persistent logs store each partition as a JSON
//! Lines file named by the target's digest.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use tracing::warn;
use wm_core::{CacheKey, FxHashMap, ScanLogRecord};

use crate::error::ScanError;

/// Per-target scan history, in memory or on disk.
#[derive(Debug, Default)]
pub struct ScanLog {
    memory: Mutex<FxHashMap<CacheKey, Vec<ScanLogRecord>>>,
    dir: Option<Utf8PathBuf>,
}

impl ScanLog {
    /// Creates an in-memory log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a directory-backed log, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Store`] if the directory cannot be created.
    pub fn open(dir: impl Into<Utf8PathBuf>) -> Result<Self, ScanError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| ScanError::store(&dir, err))?;
        Ok(Self {
            memory: Mutex::default(),
            dir: Some(dir),
        })
    }

    /// Appends a record to the partition of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Encode`] or [`ScanError::Store`] for persistent
    /// logs that cannot be written.
    pub fn append(&self, key: &CacheKey, record: ScanLogRecord) -> Result<(), ScanError> {
        let mut memory = self.memory.lock();
        let Some(dir) = &self.dir else {
            memory.entry(key.clone()).or_default().push(record);
            return Ok(());
        };

        let path = partition_path(dir, key);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|err| ScanError::store(path, err))
    }

    /// Returns up to `limit` records of `key`, most recent first.
    ///
    /// Malformed lines in a persisted partition are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Store`] if a persisted partition exists but
    /// cannot be read.
    pub fn records(&self, key: &CacheKey, limit: usize) -> Result<Vec<ScanLogRecord>, ScanError> {
        let memory = self.memory.lock();
        let Some(dir) = &self.dir else {
            return Ok(memory
                .get(key)
                .map(|records| records.iter().rev().take(limit).cloned().collect())
                .unwrap_or_default());
        };

        let path = partition_path(dir, key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ScanError::store(path, err)),
        };

        Ok(contents
            .lines()
            .rev()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(path = %path, error = %err, "Skipping malformed scan log line");
                    None
                }
            })
            .take(limit)
            .collect())
    }

    /// The backing directory, for persistent logs.
    #[inline]
    #[must_use]
    pub fn dir(&self) -> Option<&Utf8Path> {
        self.dir.as_deref()
    }
}

fn partition_path(dir: &Utf8Path, key: &CacheKey) -> Utf8PathBuf {
    dir.join(format!("{}.jsonl", key.digest()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wm_core::{LogStatus, ScanResult, ScanTrigger};

    fn key(path: &str) -> CacheKey {
        CacheKey::new("https://dav.example", "alice", path)
    }

    fn history(log: &ScanLog) {
        let k = key("/p");
        log.append(&k, ScanLogRecord::started("/p", ScanTrigger::Manual, "t1")).unwrap();
        let result = ScanResult::new("/p", Vec::new(), 9);
        log.append(
            &k,
            ScanLogRecord::completed(ScanTrigger::Manual, "t1", &result, Some("batch 1".to_owned())),
        )
        .unwrap();
        log.append(&key("/other"), ScanLogRecord::started("/other", ScanTrigger::Forced, "t2"))
            .unwrap();
    }

    #[test]
    fn test_memory_log_most_recent_first() {
        let log = ScanLog::new();
        history(&log);

        let records = log.records(&key("/p"), 10).unwrap();
        let statuses: Vec<_> = records.iter().map(|r| r.status).collect();
        assert_eq!(statuses, [LogStatus::Completed, LogStatus::Started]);
        assert_eq!(records[0].log_details.as_deref(), Some("batch 1"));

        assert_eq!(log.records(&key("/p"), 1).unwrap().len(), 1);
        assert!(log.records(&key("/none"), 10).unwrap().is_empty());
    }

    #[test]
    fn test_disk_log_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(tmp.path().join("logs")).unwrap();

        history(&ScanLog::open(&dir).unwrap());

        let reopened = ScanLog::open(&dir).unwrap();
        let records = reopened.records(&key("/p"), 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, LogStatus::Completed);
        assert_eq!(records[0].duration_ms, Some(9));
        assert_eq!(reopened.records(&key("/other"), 10).unwrap().len(), 1);
    }

    #[test]
    fn test_disk_log_skips_malformed_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let log = ScanLog::open(&dir).unwrap();
        let k = key("/p");

        log.append(&k, ScanLogRecord::started("/p", ScanTrigger::Manual, "t1")).unwrap();
        let path = dir.join(format!("{}.jsonl", k.digest()));
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{truncated\n").unwrap();

        let records = log.records(&k, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].task_id.as_deref(), Some("t1"));
    }
}
