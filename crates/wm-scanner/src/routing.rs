//! Per-server choice between a local mount and HTTP.

use wm_core::ServerConfig;

use crate::client::{Credentials, DavClient, DavConnector, DavEntry};
use crate::error::ClientError;
use crate::http::{HttpDavClient, HttpDavConnector};
use crate::mount::{LocalMountClient, LocalMountConnector};

/// Lists servers with a configured mount through the mount and every other
/// server over HTTP.
#[derive(Debug, Clone)]
pub struct RoutingConnector {
    mounts: LocalMountConnector,
    http: HttpDavConnector,
}

impl RoutingConnector {
    /// Creates a connector from explicit parts.
    #[must_use]
    pub fn new(mounts: LocalMountConnector, http: HttpDavConnector) -> Self {
        Self { mounts, http }
    }

    /// Uses the `mount_root` of every configured server that has one.
    #[must_use]
    pub fn from_servers(servers: &[ServerConfig], http: HttpDavConnector) -> Self {
        Self::new(LocalMountConnector::from_servers(servers), http)
    }

    /// The mount side, for adding ad-hoc mounts.
    pub fn mounts_mut(&mut self) -> &mut LocalMountConnector {
        &mut self.mounts
    }
}

impl DavConnector for RoutingConnector {
    type Client = RoutedClient;

    fn connect(&self, credentials: &Credentials) -> Result<Self::Client, ClientError> {
        if self.mounts.mount_for(&credentials.server_url).is_some() {
            return self.mounts.connect(credentials).map(RoutedClient::Mount);
        }
        self.http.connect(credentials).map(RoutedClient::Http)
    }
}

/// A client created by [`RoutingConnector`].
#[derive(Debug)]
pub enum RoutedClient {
    /// Lists a locally mounted share.
    Mount(LocalMountClient),
    /// Lists over HTTP.
    Http(HttpDavClient),
}

impl DavClient for RoutedClient {
    async fn list_directory(&self, path: &str) -> Result<Vec<DavEntry>, ClientError> {
        match self {
            Self::Mount(client) => client.list_directory(path).await,
            Self::Http(client) => client.list_directory(path).await,
        }
    }
}
