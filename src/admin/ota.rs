//! Firmware update engine: HTTP-streamed OTA into the inactive bank.
//!
//! Flow: descriptor check → GET url → begin → N × (hash + write) → verify →
//! activate. The caller reports success and resets.
//!
//! The image is hashed while it streams, so a corrupt or truncated download
//! is caught before the partition is activated. Any failure after `begin`
//! aborts the session and the running bank stays selected.
//!
//! Rollback is left to the bootloader: the new image boots provisionally
//! and is only marked valid once the node is back on the broker (see
//! [`confirm_boot`](crate::adapters::ota_partition::confirm_boot)).

use log::{info, warn};
use serde_json::{Map, Value};

use crate::app::ports::{HttpPort, HttpResponse, ReportSink, UpdatePartition, WatchdogPort};
use crate::app::report::Report;
use crate::error::{AdminError, IntegrityError, TransportError, ValidationError};

/// Largest image accepted, the size of one OTA slot in `partitions.csv`.
pub const MAX_FIRMWARE_SIZE: u32 = 0x18_0000;

/// Download chunk size.
const OTA_BUF_SIZE: usize = 4096;

/// A progress report is published every this many bytes.
const PROGRESS_INTERVAL: u32 = 64 * 1024;

// ── Descriptor ────────────────────────────────────────────────

/// Validated `firmware` object of an `update_firmware` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareDescriptor {
    pub url: String,
    pub size: u32,
    pub sha256: [u8; 32],
}

impl FirmwareDescriptor {
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, ValidationError> {
        let url = match fields.get("url") {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("firmware.url")),
            Some(Value::String(url)) if url.starts_with("http://") || url.starts_with("https://") => {
                url.clone()
            }
            Some(_) => return Err(ValidationError::InvalidField("firmware.url")),
        };

        let size = match fields.get("size") {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("firmware.size")),
            Some(value) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .filter(|&n| n > 0 && n <= MAX_FIRMWARE_SIZE)
                .ok_or(ValidationError::InvalidField("firmware.size"))?,
        };

        let sha256 = match fields.get("sha256") {
            None | Some(Value::Null) => {
                return Err(ValidationError::MissingField("firmware.sha256"));
            }
            Some(Value::String(digest)) => {
                let mut sha256 = [0u8; 32];
                hex::decode_to_slice(digest, &mut sha256)
                    .map_err(|_| ValidationError::InvalidField("firmware.sha256"))?;
                sha256
            }
            Some(_) => return Err(ValidationError::InvalidField("firmware.sha256")),
        };

        Ok(Self { url, size, sha256 })
    }
}

/// Result of a verified, activated update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareOutcome {
    pub bytes_written: u32,
    pub sha256: [u8; 32],
}

// ── Updater ───────────────────────────────────────────────────

pub struct FirmwareUpdater {
    buf: [u8; OTA_BUF_SIZE],
}

impl FirmwareUpdater {
    pub fn new() -> Self {
        Self {
            buf: [0u8; OTA_BUF_SIZE],
        }
    }

    /// Run one update end to end. On success the new image is selected for
    /// the next boot but the device is not reset.
    pub fn run(
        &mut self,
        fields: &Map<String, Value>,
        http: &mut dyn HttpPort,
        partition: &mut dyn UpdatePartition,
        watchdog: &dyn WatchdogPort,
        reporter: &mut dyn ReportSink,
    ) -> Result<FirmwareOutcome, AdminError> {
        if !partition.is_ready() {
            return Err(ValidationError::OtaNotReady.into());
        }
        let descriptor = FirmwareDescriptor::from_fields(fields)?;

        let mut response = http.get(&descriptor.url, &[])?;
        match response.status() {
            200 => {}
            status => return Err(TransportError::Status(status).into()),
        }

        partition.begin(descriptor.size)?;
        info!("OTA: begin ({} bytes from {})", descriptor.size, descriptor.url);
        reporter.publish(&Report::message("Beginning firmware update").with("size", descriptor.size));

        match self.stream(&descriptor, response.as_mut(), partition, watchdog, reporter) {
            Ok(outcome) => {
                info!("OTA: activated, ready to reboot");
                Ok(outcome)
            }
            Err(e) => {
                partition.abort();
                warn!("OTA: aborted: {e}");
                Err(e)
            }
        }
    }

    fn stream(
        &mut self,
        descriptor: &FirmwareDescriptor,
        response: &mut dyn HttpResponse,
        partition: &mut dyn UpdatePartition,
        watchdog: &dyn WatchdogPort,
        reporter: &mut dyn ReportSink,
    ) -> Result<FirmwareOutcome, AdminError> {
        let mut hasher = hmac_sha256::Hash::new();
        let mut written: u32 = 0;
        let mut next_progress = PROGRESS_INTERVAL;

        loop {
            let n = response.read(&mut self.buf)?;
            if n == 0 {
                break;
            }
            let total = written.saturating_add(n as u32);
            if total > descriptor.size {
                return Err(IntegrityError::SizeMismatch {
                    expected: descriptor.size,
                    actual: total,
                }
                .into());
            }

            hasher.update(&self.buf[..n]);
            partition.write(&self.buf[..n])?;
            written = total;
            watchdog.feed();

            if written >= next_progress {
                next_progress = next_progress.saturating_add(PROGRESS_INTERVAL);
                reporter.publish(
                    &Report::message("Firmware download in progress")
                        .with("bytes_written", written)
                        .with("size", descriptor.size),
                );
            }
        }

        if written != descriptor.size {
            return Err(IntegrityError::SizeMismatch {
                expected: descriptor.size,
                actual: written,
            }
            .into());
        }

        let digest = hasher.finalize();
        if digest != descriptor.sha256 {
            return Err(IntegrityError::HashMismatch {
                expected: descriptor.sha256,
                actual: digest,
            }
            .into());
        }
        reporter.publish(&Report::message("Firmware image verified"));

        partition.activate()?;
        Ok(FirmwareOutcome {
            bytes_written: written,
            sha256: digest,
        })
    }
}

impl Default for FirmwareUpdater {
    fn default() -> Self {
        Self::new()
    }
}
