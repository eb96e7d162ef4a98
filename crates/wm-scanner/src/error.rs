//! Error types for the wm-scanner crate.
//!
//! This module provides [`ClientError`] for failures reported by a WebDAV
//! client and [`ScanError`] for failures surfaced to scan callers.

use camino::Utf8PathBuf;

/// Errors reported by a [`DavClient`](crate::DavClient).
///
/// Clients must surface failures as errors rather than empty listings; the
/// walker decides which ones to swallow.
///
/// # Error Recovery Strategy
///
/// - **Unauthorized** ([`ClientError::Unauthorized`]): Fatal - no directory can be listed
/// - **Everything else**: Logged by the walker, the directory contributes nothing
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The directory does not exist on the server.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server refused access to this directory.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The server rejected the credentials.
    #[error("credentials rejected by server")]
    Unauthorized,

    /// A transport-level failure (timeout, reset, unexpected status).
    #[error("network error: {0}")]
    Network(String),

    /// A local I/O failure (mounted shares).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns `true` if this error makes any further listing pointless.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Errors that can occur during scanning operations.
///
/// # Error Recovery Strategy
///
/// - **Listing errors** ([`ScanError::Listing`]): Fatal for the scan - the task fails
/// - **Connect errors** ([`ScanError::Connect`]): Fatal for the scan
/// - **Store errors** ([`ScanError::Store`], [`ScanError::Encode`]): Fatal, no stale fallback
/// - **Config errors** ([`ScanError::Config`]): Rejected before any work starts
///
/// Per-directory listing failures never reach this type; the walker
/// absorbs them into `failed_directories`.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A listing failed in a way that makes the whole scan impossible.
    #[error("failed to list {path}: {source}")]
    Listing {
        /// The directory being listed.
        path: String,
        /// The client failure.
        #[source]
        source: ClientError,
    },

    /// A client could not be created for the given credentials.
    #[error("failed to connect to {server_url}: {source}")]
    Connect {
        /// The server being connected to.
        server_url: String,
        /// The client failure.
        #[source]
        source: ClientError,
    },

    /// Reading or writing the cache or scan log failed.
    #[error("store I/O failed at {path}: {source}")]
    Store {
        /// The file or directory involved.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A cache entry or log record could not be encoded.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    /// Invalid scan settings or request.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ScanError {
    /// Creates a new [`ScanError::Listing`] error.
    #[inline]
    pub fn listing(path: impl Into<String>, source: ClientError) -> Self {
        Self::Listing {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`ScanError::Store`] error.
    #[inline]
    pub fn store(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Store {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`ScanError::Config`] error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns `true` if the error came from the remote server rather than
    /// local state.
    #[inline]
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Listing { .. } | Self::Connect { .. })
    }
}

impl From<wm_core::ConfigError> for ScanError {
    fn from(err: wm_core::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
