//! Scan service statistics with atomic counters.
//!
//! This module provides [`ScanStats`] for counting what the orchestrator
//! did with each request and [`StatsSnapshot`] for point-in-time views.
//!
//! # Thread Safety
//!
//! All counters use [`AtomicU64`] with [`Relaxed`](std::sync::atomic::Ordering::Relaxed)
//! ordering. Statistics are informational and don't require strict ordering
//! guarantees.
//!
//! # Examples
//!
//! ```
//! use wm_scanner::ScanStats;
//!
//! let stats = ScanStats::new();
//! stats.increment_started();
//! stats.increment_completed();
//! stats.increment_cache_hits();
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.requests(), 2);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters for scan requests.
#[derive(Debug, Default)]
pub struct ScanStats {
    /// Requests answered from the cache.
    cache_hits: AtomicU64,
    /// Requests that joined an already running task.
    joined: AtomicU64,
    /// Walks started.
    started: AtomicU64,
    /// Walks completed and cached.
    completed: AtomicU64,
    /// Walks that failed.
    failed: AtomicU64,
}

impl ScanStats {
    /// Creates a new [`ScanStats`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the cache hit counter.
    #[inline]
    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the joined-task counter.
    #[inline]
    pub fn increment_joined(&self) {
        self.joined.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the started-walk counter.
    #[inline]
    pub fn increment_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the completed-walk counter.
    #[inline]
    pub fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the failed-walk counter.
    #[inline]
    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time view of [`ScanStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Requests answered from the cache.
    pub cache_hits: u64,
    /// Requests that joined an already running task.
    pub joined: u64,
    /// Walks started.
    pub started: u64,
    /// Walks completed and cached.
    pub completed: u64,
    /// Walks that failed.
    pub failed: u64,
}

impl StatsSnapshot {
    /// Total requests seen: cache hits, joins, and started walks.
    #[inline]
    #[must_use]
    pub const fn requests(&self) -> u64 {
        self.cache_hits + self.joined + self.started
    }

    /// Walks started but not yet finished.
    #[inline]
    #[must_use]
    pub const fn in_flight(&self) -> u64 {
        self.started.saturating_sub(self.completed + self.failed)
    }

    /// Fraction of requests answered without a walk, as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Acceptable for statistics display
    pub fn cache_hit_rate(&self) -> f64 {
        let requests = self.requests();
        if requests == 0 {
            return 0.0;
        }

        (self.cache_hits as f64 / requests as f64) * 100.0
    }
}
