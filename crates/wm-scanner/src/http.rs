//! WebDAV over HTTP.
//!
//! [`HttpDavConnector`] lists directories with `PROPFIND` (`Depth: 1`) and
//! parses the `207 Multi-Status` reply. Hrefs are percent-decoded and made
//! relative to the server base URL, so listing paths match the paths
//! callers pass in.
//!
//! | Status        | Error                            |
//! |---------------|----------------------------------|
//! | 401           | [`ClientError::Unauthorized`]     |
//! | 403           | [`ClientError::PermissionDenied`] |
//! | 404           | [`ClientError::NotFound`]         |
//! | other non-2xx | [`ClientError::Network`]          |

use std::time::Duration;

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::{Client, Method, StatusCode, Url};
use tracing::debug;

use crate::client::{Credentials, DavClient, DavConnector, DavEntry, normalize_path};
use crate::error::ClientError;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getlastmodified/>
  </d:prop>
</d:propfind>"#;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects to WebDAV servers over HTTP(S).
///
/// The underlying [`reqwest::Client`] pools connections and is shared by
/// every client this connector creates.
#[derive(Debug, Clone)]
pub struct HttpDavConnector {
    http: Client,
}

impl HttpDavConnector {
    /// Creates a connector whose requests time out after `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Network`] if the HTTP client cannot be built.
    pub fn new(request_timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| ClientError::Network(err.to_string()))?;
        Ok(Self::with_client(http))
    }

    /// Creates a connector over an existing HTTP client.
    #[must_use]
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

impl DavConnector for HttpDavConnector {
    type Client = HttpDavClient;

    fn connect(&self, credentials: &Credentials) -> Result<Self::Client, ClientError> {
        let base = Url::parse(&credentials.server_url).map_err(|err| {
            ClientError::Network(format!("invalid server URL {}: {err}", credentials.server_url))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::Network(format!(
                "unsupported URL scheme: {}",
                base.scheme()
            )));
        }

        let base_path = decode(base.path()).trim_end_matches('/').to_owned();
        Ok(HttpDavClient {
            http: self.http.clone(),
            base_url: base.as_str().trim_end_matches('/').to_owned(),
            base_path,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
    }
}

/// Lists directories of one server as one user.
pub struct HttpDavClient {
    http: Client,
    base_url: String,
    base_path: String,
    username: String,
    password: String,
}

impl std::fmt::Debug for HttpDavClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDavClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl HttpDavClient {
    /// The URL a `PROPFIND` for `path` is sent to. Collections get a
    /// trailing slash.
    #[must_use]
    pub fn collection_url(&self, path: &str) -> String {
        let mut url = self.base_url.clone();
        for segment in normalize_path(path).split('/').filter(|s| !s.is_empty()) {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url.push('/');
        url
    }
}

impl DavClient for HttpDavClient {
    async fn list_directory(&self, path: &str) -> Result<Vec<DavEntry>, ClientError> {
        let path = normalize_path(path);
        let url = self.collection_url(&path);
        let propfind = Method::from_bytes(b"PROPFIND")
            .map_err(|err| ClientError::Network(err.to_string()))?;

        let response = self
            .http
            .request(propfind, &url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Depth", "1")
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await
            .map_err(|err| ClientError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &path));
        }

        let body = response
            .text()
            .await
            .map_err(|err| ClientError::Network(err.to_string()))?;
        let entries = parse_multistatus(&body, &self.base_path, &path)?;
        debug!(path = %path, entries = entries.len(), "Listed WebDAV collection");
        Ok(entries)
    }
}

/// Maps a non-success status to a [`ClientError`].
#[must_use]
pub fn status_error(status: StatusCode, path: &str) -> ClientError {
    match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        StatusCode::FORBIDDEN => ClientError::PermissionDenied(path.to_owned()),
        StatusCode::NOT_FOUND => ClientError::NotFound(path.to_owned()),
        other => ClientError::Network(format!("PROPFIND {path} returned {other}")),
    }
}

#[derive(Default)]
struct PendingEntry {
    href: String,
    collection: bool,
    length: String,
    modified: String,
}

#[derive(Clone, Copy)]
enum Field {
    Href,
    Length,
    Modified,
}

/// Parses a `207 Multi-Status` body into the children of `dir`.
///
/// `base_path` is the decoded path of the server base URL; it is stripped
/// from every href. The entry for `dir` itself is dropped.
///
/// # Errors
///
/// Returns [`ClientError::Network`] if the body is not well-formed XML.
pub fn parse_multistatus(
    xml: &str,
    base_path: &str,
    dir: &str,
) -> Result<Vec<DavEntry>, ClientError> {
    let dir = normalize_path(dir);
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut pending: Option<PendingEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| ClientError::Network(format!("malformed PROPFIND response: {err}")))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"response" => pending = Some(PendingEntry::default()),
                b"href" => field = Some(Field::Href),
                b"getcontentlength" => field = Some(Field::Length),
                b"getlastmodified" => field = Some(Field::Modified),
                b"collection" => mark_collection(pending.as_mut()),
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"collection" {
                    mark_collection(pending.as_mut());
                }
            }
            Event::Text(e) => {
                if let (Some(field), Some(entry)) = (field, pending.as_mut()) {
                    let text = e.unescape().map_err(|err| {
                        ClientError::Network(format!("malformed PROPFIND response: {err}"))
                    })?;
                    let target = match field {
                        Field::Href => &mut entry.href,
                        Field::Length => &mut entry.length,
                        Field::Modified => &mut entry.modified,
                    };
                    target.push_str(&text);
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"response" {
                    if let Some(entry) = pending.take().and_then(|p| p.into_entry(base_path)) {
                        if entry.path != dir {
                            entries.push(entry);
                        }
                    }
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

fn mark_collection(entry: Option<&mut PendingEntry>) {
    if let Some(entry) = entry {
        entry.collection = true;
    }
}

impl PendingEntry {
    fn into_entry(self, base_path: &str) -> Option<DavEntry> {
        let href = self.href.trim();
        if href.is_empty() {
            return None;
        }

        // Some servers answer with absolute URLs
        let raw_path = match Url::parse(href) {
            Ok(url) => url.path().to_owned(),
            Err(_) => href.to_owned(),
        };
        let decoded = decode(&raw_path);
        let relative = decoded.strip_prefix(base_path).unwrap_or(&decoded);
        let path = normalize_path(relative);

        if self.collection {
            return Some(DavEntry::directory(path));
        }
        let size = self.length.trim().parse().unwrap_or(0);
        let last_modified = DateTime::parse_from_rfc2822(self.modified.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc));
        Some(DavEntry::file(path, size, last_modified))
    }
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_owned(), std::borrow::Cow::into_owned)
}
