//! Core types, configuration, and utilities for the WebDAV media scanner.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - Media classification by file extension ([`classify`])
//! - Scan data model (`MediaFileEntry`, `ScanResult`, `ScanProgress`)
//! - Cache, task, and scan-log records
//! - Configuration structures and [`ConfigError`]
//! - Type aliases for `FxHashMap`/`FxHashSet` and persisted key digests

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;
pub mod types;

pub use config::{Config, ScanSettings, ScheduleConfig, ServerConfig, StorageConfig, TaskRetention};
pub use error::ConfigError;
pub use hash::{FxHashMap, FxHashSet, fx_hash_map, fx_hash_set, key_digest};
pub use types::{
    CacheEntry, CacheKey, CacheSummary, IMAGE_EXTENSIONS, LogStatus, MediaFileEntry, MediaKind,
    ScanLogRecord, ScanProgress, ScanResult, ScanTaskRecord, ScanTrigger, TaskKey, TaskStatus,
    Truncation, VIDEO_EXTENSIONS, classify,
};
