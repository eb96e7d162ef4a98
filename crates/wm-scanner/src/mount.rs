//! WebDAV shares mounted into the local filesystem.
//!
//! Shares exposed through davfs2, rclone mount, or a similar FUSE layer are
//! listed with plain directory reads. [`LocalMountConnector`] maps each
//! server URL to the directory it is mounted at.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use tracing::debug;
use wm_core::{FxHashMap, ServerConfig};

use crate::client::{Credentials, DavClient, DavConnector, DavEntry, join_path, normalize_path};
use crate::error::ClientError;

/// Connects to servers through their local mount points.
#[derive(Debug, Clone, Default)]
pub struct LocalMountConnector {
    mounts: FxHashMap<String, Utf8PathBuf>,
}

impl LocalMountConnector {
    /// Creates a connector with no mounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a connector from the servers that declare a `mount_root`.
    #[must_use]
    pub fn from_servers(servers: &[ServerConfig]) -> Self {
        let mut connector = Self::new();
        for server in servers {
            if let Some(root) = &server.mount_root {
                connector.add_mount(&server.url, root.clone());
            }
        }
        connector
    }

    /// Maps `server_url` to the local directory `root`.
    pub fn add_mount(&mut self, server_url: &str, root: impl Into<Utf8PathBuf>) {
        self.mounts.insert(server_url.to_owned(), root.into());
    }

    /// Returns the mount directory for `server_url`, if any.
    #[must_use]
    pub fn mount_for(&self, server_url: &str) -> Option<&Utf8Path> {
        self.mounts.get(server_url).map(Utf8PathBuf::as_path)
    }
}

impl DavConnector for LocalMountConnector {
    type Client = LocalMountClient;

    fn connect(&self, credentials: &Credentials) -> Result<Self::Client, ClientError> {
        self.mount_for(&credentials.server_url)
            .map(LocalMountClient::new)
            .ok_or_else(|| {
                ClientError::NotFound(format!("no mount configured for {}", credentials.server_url))
            })
    }
}

/// Lists remote paths below a local mount directory.
#[derive(Debug, Clone)]
pub struct LocalMountClient {
    root: Utf8PathBuf,
}

impl LocalMountClient {
    /// Creates a client rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn local_path(&self, remote: &str) -> Result<Utf8PathBuf, ClientError> {
        if remote.split('/').any(|segment| segment == "..") {
            return Err(ClientError::PermissionDenied(remote.to_owned()));
        }
        Ok(self.root.join(remote.trim_start_matches('/')))
    }
}

impl DavClient for LocalMountClient {
    async fn list_directory(&self, path: &str) -> Result<Vec<DavEntry>, ClientError> {
        let remote = normalize_path(path);
        let local = self.local_path(&remote)?;

        let mut dir = tokio::fs::read_dir(&local)
            .await
            .map_err(|err| map_io_error(&remote, err))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|err| map_io_error(&remote, err))? {
            let Ok(name) = entry.file_name().into_string() else {
                debug!(dir = %remote, "Skipping non-UTF-8 entry");
                continue;
            };

            // Follows symlinks; dangling ones are skipped.
            let metadata = match tokio::fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(err) => {
                    debug!(dir = %remote, name, error = %err, "Skipping unreadable entry");
                    continue;
                }
            };

            let child = join_path(&remote, &name);
            if metadata.is_dir() {
                entries.push(DavEntry::directory(child));
            } else if metadata.is_file() {
                let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
                entries.push(DavEntry::file(child, metadata.len(), modified));
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

fn map_io_error(path: &str, err: std::io::Error) -> ClientError {
    match err.kind() {
        std::io::ErrorKind::NotFound => ClientError::NotFound(path.to_owned()),
        std::io::ErrorKind::PermissionDenied => ClientError::PermissionDenied(path.to_owned()),
        _ => ClientError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn utf8_root(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_lists_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8_root(&dir);
        fs::create_dir_all(root.join("photos/2024")).unwrap();
        fs::write(root.join("photos/a.jpg"), b"abc").unwrap();

        let client = LocalMountClient::new(&root);
        let entries = client.list_directory("/photos").await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "/photos/2024");
        assert!(entries[0].is_directory());
        assert_eq!(entries[1].path, "/photos/a.jpg");
        assert_eq!(entries[1].size, 3);
        assert!(entries[1].last_modified.is_some());
    }

    #[tokio::test]
    async fn test_missing_directory_maps_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let client = LocalMountClient::new(utf8_root(&dir));
        let err = client.list_directory("/missing").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(p) if p == "/missing"));
    }

    #[tokio::test]
    async fn test_parent_segments_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let client = LocalMountClient::new(utf8_root(&dir));
        let err = client.list_directory("/a/../../etc").await.unwrap_err();
        assert!(matches!(err, ClientError::PermissionDenied(_)));
    }

    #[test]
    fn test_connector_requires_mount() {
        let mut connector = LocalMountConnector::new();
        connector.add_mount("https://dav.example", "/mnt/dav");

        let known = Credentials::new("https://dav.example", "a", "p");
        let unknown = Credentials::new("https://other.example", "a", "p");
        assert!(connector.connect(&known).is_ok());
        assert!(matches!(
            connector.connect(&unknown),
            Err(ClientError::NotFound(_))
        ));
    }

    #[test]
    fn test_from_servers_skips_unmounted() {
        let servers = vec![
            ServerConfig {
                url: "https://a".to_owned(),
                username: "u".to_owned(),
                password: String::new(),
                mount_root: Some(Utf8PathBuf::from("/mnt/a")),
                paths: Vec::new(),
            },
            ServerConfig {
                url: "https://b".to_owned(),
                username: "u".to_owned(),
                password: String::new(),
                mount_root: None,
                paths: Vec::new(),
            },
        ];
        let connector = LocalMountConnector::from_servers(&servers);
        assert_eq!(connector.mount_for("https://a"), Some(Utf8Path::new("/mnt/a")));
        assert!(connector.mount_for("https://b").is_none());
    }
}
