//! Port traits: the hexagonal boundary between the admin engines and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Dispatcher / engines (domain)
//! ```
//!
//! Driven adapters (HTTP client, filesystem, OTA partition, reset, watchdog,
//! broker reporting) implement these traits. The engines consume them as
//! `&mut dyn Port`, so the update logic never touches ESP-IDF directly and
//! runs unchanged against host simulations and test doubles.
//!
//! ## Storage notes
//!
//! - **FileStore** writes MUST go through a staged file that is renamed over
//!   the destination on [`StagedFile::commit`]. A torn write must never leave
//!   `config.json` unparsable.
//! - Dropping a [`StagedFile`] without committing discards it.

use core::fmt;
use std::path::Path;

use crate::app::report::Report;
use crate::error::TransportError;

// ───────────────────────────────────────────────────────────────
// HTTP port (driven adapter: domain → network)
// ───────────────────────────────────────────────────────────────

/// A response whose body is read incrementally.
pub trait HttpResponse {
    /// HTTP status code.
    fn status(&self) -> u16;

    /// Read the next chunk of the body into `buf`. `Ok(0)` means end of body.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Buffer the whole body, failing once it grows past `limit` bytes.
    ///
    /// Only for small JSON documents (listings, commit lists); file and
    /// firmware bodies are always streamed.
    fn read_to_end_limited(&mut self, limit: usize) -> Result<Vec<u8>, TransportError> {
        let mut body = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                return Ok(body);
            }
            if body.len() + n > limit {
                return Err(TransportError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Outbound HTTP GET. One request at a time.
pub trait HttpPort {
    fn get<'a>(
        &'a mut self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Box<dyn HttpResponse + 'a>, TransportError>;
}

// ───────────────────────────────────────────────────────────────
// File store port (driven adapter: domain ↔ local filesystem)
// ───────────────────────────────────────────────────────────────

/// A file being written; becomes visible at its destination only on commit.
pub trait StagedFile {
    fn write_all(&mut self, data: &[u8]) -> Result<(), StorageError>;

    /// Atomically replace the destination with the staged contents.
    fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

/// Local storage rooted at the application directory. Paths are relative.
pub trait FileStore {
    /// Read a whole file.
    fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Check whether a file or directory exists.
    fn exists(&self, path: &Path) -> bool;

    /// Create a directory. Succeeds if it already exists.
    fn create_dir(&mut self, path: &Path) -> Result<(), StorageError>;

    /// Begin a staged write to `path`.
    fn stage<'a>(&'a mut self, path: &Path) -> Result<Box<dyn StagedFile + 'a>, StorageError>;

    /// Write a whole file with write-then-rename semantics.
    fn write_atomic(&mut self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let mut staged = self.stage(path)?;
        staged.write_all(data)?;
        staged.commit()
    }
}

// ───────────────────────────────────────────────────────────────
// Update partition port (driven adapter: domain → OTA flash)
// ───────────────────────────────────────────────────────────────

/// The inactive firmware bank.
///
/// `activate` must select the new image for the next boot WITHOUT
/// rebooting, so the caller can report success first.
pub trait UpdatePartition {
    /// Whether the running firmware has an OTA partition layout.
    fn is_ready(&self) -> bool;

    /// Open and erase the inactive partition for an image of `image_size` bytes.
    fn begin(&mut self, image_size: u32) -> Result<(), PartitionError>;

    /// Append image bytes.
    fn write(&mut self, data: &[u8]) -> Result<(), PartitionError>;

    /// Validate the written image and make it the next boot partition.
    fn activate(&mut self) -> Result<(), PartitionError>;

    /// Discard the session. The running bank stays selected.
    fn abort(&mut self);
}

// ───────────────────────────────────────────────────────────────
// System port (driven adapter: domain → SoC services)
// ───────────────────────────────────────────────────────────────

/// Snapshot answered by `get_system_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub firmware_version: &'static str,
    pub platform: String,
    pub free_memory: u32,
    pub uptime_secs: u64,
}

pub trait SystemPort {
    fn info(&self) -> SystemInfo;

    /// Hard device reset. On hardware this does not return.
    fn reset(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Watchdog port
// ───────────────────────────────────────────────────────────────

/// Long-running loops (tree sync, firmware stream) feed this per chunk.
pub trait WatchdogPort {
    fn feed(&self);
}

// ───────────────────────────────────────────────────────────────
// Report sink port (driven adapter: domain → logs topic)
// ───────────────────────────────────────────────────────────────

/// Outbound operator-visible reports. Adapters add the timestamp and decide
/// where they go (broker logs topic, serial console).
pub trait ReportSink {
    fn publish(&mut self, report: &Report);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`FileStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested file does not exist.
    NotFound,
    /// Filesystem is full.
    Full,
    /// Path escapes the store root or is otherwise unusable.
    InvalidPath,
    /// Any other I/O failure.
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::StorageFull => Self::Full,
            kind => Self::Io(kind),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "file not found"),
            Self::Full => write!(f, "storage full"),
            Self::InvalidPath => write!(f, "invalid path"),
            Self::Io(kind) => write!(f, "I/O error ({kind})"),
        }
    }
}

/// Errors from [`UpdatePartition`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionError {
    NoPartition,
    BeginFailed,
    WriteFailed,
    VerifyFailed,
    BootSetFailed,
    NotStarted,
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPartition => write!(f, "no inactive OTA partition available"),
            Self::BeginFailed => write!(f, "OTA begin failed"),
            Self::WriteFailed => write!(f, "OTA write failed"),
            Self::VerifyFailed => write!(f, "OTA image verification failed"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
            Self::NotStarted => write!(f, "no OTA session in progress"),
        }
    }
}
