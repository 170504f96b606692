//! Remote tree synchronizer.
//!
//! Mirrors a directory of a GitHub repository onto local storage using the
//! contents API, then records the abbreviated head commit in `.version`.
//!
//! ```text
//!   GET  /repos/{owner}/{repo}/contents/{path}?ref={ref}   (root listing)
//!     ├─ file → GET download_url → stage → commit
//!     └─ dir  → GET url (listing) → mkdir → recurse
//!   GET  /repos/{owner}/{repo}/commits?per_page=1&sha={ref}
//!   write .version
//! ```
//!
//! Only the root listing and the commit lookup are fatal. A failing file or
//! subdirectory is reported with its local path and the walk moves on to
//! its siblings. The synchronizer never resets the device.
//!
//! `.version` only advances once the synced tree passes
//! [`SyncReport::check_bootable`]. Names the store itself uses
//! (`config.json`, `.version` and staging suffixes) are never written.

use core::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::app::ports::{FileStore, HttpPort, HttpResponse, ReportSink, StorageError, WatchdogPort};
use crate::app::report::Report;
use crate::config::CONFIG_PATH;
use crate::error::{AdminError, TransportError, ValidationError};

pub const API_ROOT: &str = "https://api.github.com";

/// Local file holding the abbreviated commit id of the synced tree.
pub const VERSION_PATH: &str = ".version";

/// Upper bound on a buffered listing or commit-list body.
pub const LISTING_LIMIT: usize = 32 * 1024;

/// File bodies are streamed through a buffer of this size.
pub const FILE_BUF_SIZE: usize = 1024;

/// Deepest directory level the walk descends into.
pub const MAX_DEPTH: usize = 8;

const OPERATION: &str = "update_code";

/// Suffixes of the store's own staging and backup files.
const RESERVED_SUFFIXES: [&str; 2] = [".tmp", ".bak"];

// ── Source identity ───────────────────────────────────────────

/// Which remote tree to mirror and how to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdentity {
    pub owner: String,
    pub repository: String,
    pub reference: String,
    /// Directory inside the repository mirrored onto the store root.
    pub path: String,
    pub token: Option<String>,
}

impl SourceIdentity {
    pub fn contents_url(&self) -> String {
        let path = self.path.trim_matches('/');
        if path.is_empty() {
            format!(
                "{API_ROOT}/repos/{}/{}/contents?ref={}",
                self.owner, self.repository, self.reference
            )
        } else {
            format!(
                "{API_ROOT}/repos/{}/{}/contents/{path}?ref={}",
                self.owner, self.repository, self.reference
            )
        }
    }

    pub fn commits_url(&self) -> String {
        format!(
            "{API_ROOT}/repos/{}/{}/commits?per_page=1&sha={}",
            self.owner, self.repository, self.reference
        )
    }

    /// Request headers sent with every API and download request.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("User-Agent", self.owner.clone())];
        if let Some(token) = &self.token {
            headers.push(("Authorization", format!("token {token}")));
        }
        headers
    }
}

// ── Listing entries ───────────────────────────────────────────

/// One entry of a contents listing. Symlinks and submodules are `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteNode {
    File { name: String, download_url: String },
    Dir { name: String, url: String },
    #[serde(other)]
    Other,
}

/// Split a listing body into raw entries. Entries are decoded one at a time
/// so a single odd entry does not sink the whole directory.
pub fn parse_listing(body: &[u8]) -> Result<Vec<Value>, TransportError> {
    serde_json::from_slice(body).map_err(|_| TransportError::Malformed("contents listing"))
}

/// Reject names that are not a single plain path component, or that would
/// overwrite a file the node itself owns. `depth` is 0 at the store root.
pub fn check_name(name: &str, depth: usize) -> Result<(), ValidationError> {
    let unsafe_name = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(ValidationError::UnsafeName(name.to_owned()));
    }

    let reserved = (depth == 0 && (name == CONFIG_PATH || name == VERSION_PATH))
        || RESERVED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix));
    if reserved {
        return Err(ValidationError::ReservedName(name.to_owned()));
    }
    Ok(())
}

#[derive(Deserialize)]
struct CommitEntry {
    sha: String,
}

// ── Version marker ────────────────────────────────────────────

/// Seven-character abbreviated commit id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMarker(heapless::String<7>);

impl VersionMarker {
    /// Abbreviate a full commit sha. `None` if it is shorter than seven
    /// characters or not hex.
    pub fn from_sha(sha: &str) -> Option<Self> {
        let short = sha.get(..7)?;
        if !short.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let mut marker = heapless::String::new();
        marker.push_str(short).ok()?;
        Some(Self(marker))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Marker of the currently installed tree, if any.
    pub fn load(store: &dyn FileStore) -> Option<Self> {
        let bytes = store.read(Path::new(VERSION_PATH)).ok()?;
        Self::from_sha(core::str::from_utf8(&bytes).ok()?.trim())
    }

    pub fn persist(&self, store: &mut dyn FileStore) -> Result<(), StorageError> {
        store.write_atomic(Path::new(VERSION_PATH), self.0.as_bytes())
    }
}

impl fmt::Display for VersionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Outcome ───────────────────────────────────────────────────

/// A node that could not be mirrored.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    pub path: PathBuf,
    pub error: AdminError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub written_files: Vec<PathBuf>,
    pub failures: Vec<NodeFailure>,
    pub version: VersionMarker,
}

impl SyncReport {
    /// Minimal sanity check before the caller resets into the new tree.
    pub fn check_bootable(
        &self,
        store: &dyn FileStore,
        entry_point: Option<&str>,
    ) -> Result<(), ValidationError> {
        if self.written_files.is_empty() {
            return Err(ValidationError::NothingSynced);
        }
        if let Some(entry) = entry_point.filter(|e| !e.is_empty()) {
            if !store.exists(Path::new(entry)) {
                return Err(ValidationError::EntryPointMissing(entry.to_owned()));
            }
        }
        Ok(())
    }
}

// ── Synchronizer ──────────────────────────────────────────────

pub struct TreeSync<'a> {
    http: &'a mut dyn HttpPort,
    store: &'a mut dyn FileStore,
    watchdog: &'a dyn WatchdogPort,
    reporter: &'a mut dyn ReportSink,
    buf: [u8; FILE_BUF_SIZE],
    headers: Vec<(&'static str, String)>,
    written_files: Vec<PathBuf>,
    failures: Vec<NodeFailure>,
}

impl<'a> TreeSync<'a> {
    pub fn new(
        http: &'a mut dyn HttpPort,
        store: &'a mut dyn FileStore,
        watchdog: &'a dyn WatchdogPort,
        reporter: &'a mut dyn ReportSink,
    ) -> Self {
        Self {
            http,
            store,
            watchdog,
            reporter,
            buf: [0u8; FILE_BUF_SIZE],
            headers: Vec::new(),
            written_files: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Mirror `source` onto the store root and, if the result is bootable,
    /// write the version marker.
    pub fn run(
        mut self,
        source: &SourceIdentity,
        entry_point: Option<&str>,
    ) -> Result<SyncReport, AdminError> {
        self.headers = source.headers();

        let url = source.contents_url();
        self.progress(format!("Getting repository contents from {url}"));
        let root = self.fetch_listing(&url)?;

        let mut dir = PathBuf::new();
        self.walk(root, &mut dir, 0);
        info!(
            "sync: {} file(s) written, {} failure(s)",
            self.written_files.len(),
            self.failures.len()
        );

        let version = self.fetch_version(source)?;
        let report = SyncReport {
            written_files: core::mem::take(&mut self.written_files),
            failures: core::mem::take(&mut self.failures),
            version,
        };
        report.check_bootable(&*self.store, entry_point)?;

        self.progress(format!(
            "Latest commit hash is {}, writing to {VERSION_PATH} file...",
            report.version
        ));
        report.version.persist(self.store)?;
        Ok(report)
    }

    fn walk(&mut self, entries: Vec<Value>, dir: &mut PathBuf, depth: usize) {
        for entry in entries {
            self.watchdog.feed();

            let node = match serde_json::from_value::<RemoteNode>(entry) {
                Ok(node) => node,
                Err(_) => {
                    self.fail(dir, TransportError::Malformed("listing entry").into());
                    continue;
                }
            };

            match node {
                RemoteNode::File { name, download_url } => {
                    if let Err(e) = check_name(&name, depth) {
                        self.fail(&dir.join(&name), e.into());
                        continue;
                    }
                    dir.push(&name);
                    match self.fetch_file(&download_url, dir) {
                        Ok(()) => self.written_files.push(dir.clone()),
                        Err(e) => self.fail(dir, e),
                    }
                    dir.pop();
                }
                RemoteNode::Dir { name, url } => {
                    if let Err(e) = check_name(&name, depth) {
                        self.fail(&dir.join(&name), e.into());
                        continue;
                    }
                    dir.push(&name);
                    if depth + 1 > MAX_DEPTH {
                        self.fail(dir, ValidationError::InvalidField("tree depth").into());
                    } else {
                        match self.enter_dir(&url, dir) {
                            Ok(children) => self.walk(children, dir, depth + 1),
                            Err(e) => self.fail(dir, e),
                        }
                    }
                    dir.pop();
                }
                RemoteNode::Other => debug!("sync: skipping non-file entry in {}", dir.display()),
            }
        }
    }

    fn enter_dir(&mut self, url: &str, dir: &Path) -> Result<Vec<Value>, AdminError> {
        let children = self.fetch_listing(url)?;
        self.store.create_dir(dir)?;
        Ok(children)
    }

    fn fetch_listing(&mut self, url: &str) -> Result<Vec<Value>, AdminError> {
        let headers = header_refs(&self.headers);
        let mut response = self.http.get(url, &headers)?;
        let body = read_ok_body(response.as_mut(), LISTING_LIMIT)?;
        Ok(parse_listing(&body)?)
    }

    fn fetch_file(&mut self, url: &str, path: &Path) -> Result<(), AdminError> {
        self.progress(format!("Fetching {}", path.display()));

        let headers = header_refs(&self.headers);
        let mut response = self.http.get(url, &headers)?;
        expect_ok(response.as_ref())?;

        let mut staged = self.store.stage(path)?;
        loop {
            let n = response.read(&mut self.buf)?;
            if n == 0 {
                break;
            }
            staged.write_all(&self.buf[..n])?;
            self.watchdog.feed();
        }
        staged.commit()?;
        drop(response);

        self.progress(format!("Successfully saved {}", path.display()));
        Ok(())
    }

    fn fetch_version(&mut self, source: &SourceIdentity) -> Result<VersionMarker, AdminError> {
        let headers = header_refs(&self.headers);
        let mut response = self.http.get(&source.commits_url(), &headers)?;
        let body = read_ok_body(response.as_mut(), LISTING_LIMIT)?;

        let commits: Vec<CommitEntry> = serde_json::from_slice(&body)
            .map_err(|_| TransportError::Malformed("commit list"))?;
        let head = commits
            .first()
            .ok_or(TransportError::Malformed("empty commit list"))?;
        VersionMarker::from_sha(&head.sha)
            .ok_or_else(|| TransportError::Malformed("commit sha").into())
    }

    fn fail(&mut self, path: &Path, error: AdminError) {
        warn!("sync: {} failed: {error}", path.display());
        self.reporter.publish(
            &Report::error(OPERATION, &error).with("path", path.display().to_string()),
        );
        self.failures.push(NodeFailure {
            path: path.to_path_buf(),
            error,
        });
    }

    fn progress(&mut self, message: String) {
        info!("sync: {message}");
        self.reporter.publish(&Report::message(message));
    }
}

fn header_refs<'h>(headers: &'h [(&'static str, String)]) -> Vec<(&'static str, &'h str)> {
    headers.iter().map(|(k, v)| (*k, v.as_str())).collect()
}

fn expect_ok(response: &dyn HttpResponse) -> Result<(), TransportError> {
    match response.status() {
        200 => Ok(()),
        status => Err(TransportError::Status(status)),
    }
}

fn read_ok_body(response: &mut dyn HttpResponse, limit: usize) -> Result<Vec<u8>, TransportError> {
    expect_ok(response)?;
    response.read_to_end_limited(limit)
}
