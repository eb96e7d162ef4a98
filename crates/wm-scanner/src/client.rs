//! The WebDAV client seam.
//!
//! The scanner never speaks the WebDAV wire protocol itself. It consumes a
//! [`DavClient`] that can list a directory, obtained from a [`DavConnector`]
//! for a set of [`Credentials`].
//!
//! Implementations shipped with this crate:
//!
//! - [`HttpDavConnector`](crate::HttpDavConnector): `PROPFIND` over HTTP(S)
//! - [`LocalMountConnector`](crate::LocalMountConnector): a share mounted
//!   into the local filesystem (davfs2, rclone mount, ...)
//! - [`RoutingConnector`](crate::RoutingConnector): a mount where one is
//!   configured, HTTP otherwise
//! - [`MemoryDav`](crate::MemoryDav): an in-memory tree for tests and demos

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::ClientError;

/// Connection credentials for a WebDAV server.
///
/// The password is passed through to the connector and never logged or
/// used in any cache or task key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Server base URL.
    pub server_url: String,
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates a credentials triple.
    #[must_use]
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Whether a listing entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A collection (directory).
    Directory,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavEntry {
    /// Full remote path of the entry.
    pub path: String,
    /// The final path component.
    pub name: String,
    /// File or directory.
    pub kind: EntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, if reported.
    pub last_modified: Option<DateTime<Utc>>,
}

impl DavEntry {
    /// Creates a file entry.
    #[must_use]
    pub fn file(path: impl Into<String>, size: u64, last_modified: Option<DateTime<Utc>>) -> Self {
        let path = path.into();
        Self {
            name: base_name(&path).to_owned(),
            path,
            kind: EntryKind::File,
            size,
            last_modified,
        }
    }

    /// Creates a directory entry.
    #[must_use]
    pub fn directory(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: base_name(&path).to_owned(),
            path,
            kind: EntryKind::Directory,
            size: 0,
            last_modified: None,
        }
    }

    /// Returns `true` for directory entries.
    #[inline]
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Lists remote directories.
///
/// Implementations must return an error, not an empty listing, when a
/// directory cannot be read. The listing must not include the directory
/// itself.
pub trait DavClient: Send + Sync {
    /// Lists the immediate children of `path`.
    fn list_directory(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Vec<DavEntry>, ClientError>> + Send;
}

/// Creates [`DavClient`]s for a set of credentials.
pub trait DavConnector: Send + Sync + 'static {
    /// The client type produced by this connector.
    type Client: DavClient + 'static;

    /// Creates a client for `credentials`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] if no client can be created, e.g. for an
    /// unknown server.
    fn connect(&self, credentials: &Credentials) -> Result<Self::Client, ClientError>;
}

/// Normalises a remote path: leading slash, no trailing slash, no empty
/// segments.
///
/// # Examples
///
/// ```
/// use wm_scanner::normalize_path;
///
/// assert_eq!(normalize_path("photos//2024/"), "/photos/2024");
/// assert_eq!(normalize_path("/"), "/");
/// ```
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_owned();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out
}

/// Joins a child name onto a normalised remote directory path.
#[must_use]
pub fn join_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{}/{name}", dir.trim_end_matches('/'))
    }
}

fn base_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}
