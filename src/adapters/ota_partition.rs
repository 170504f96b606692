//! OTA partition adapter.
//!
//! - **`target_os = "espidf"`**: [`EspOtaPartition`] writes through the
//!   `esp-ota` crate (safe wrapper over `esp_ota_begin`/`write`/`end`).
//! - **all other targets**: [`SimPartition`] keeps the image in memory and
//!   records aborts and activation for host-side tests.
//!
//! Both variants provide [`confirm_boot`], called once the node is back on
//! the broker after a boot.

#[cfg(target_os = "espidf")]
use log::{info, warn};

use crate::app::ports::{PartitionError, UpdatePartition};

// ── ESP-IDF ───────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct EspOtaPartition {
    update: Option<esp_ota::OtaUpdate>,
}

#[cfg(target_os = "espidf")]
impl EspOtaPartition {
    pub fn new() -> Self {
        Self { update: None }
    }
}

#[cfg(target_os = "espidf")]
impl Default for EspOtaPartition {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl UpdatePartition for EspOtaPartition {
    fn is_ready(&self) -> bool {
        // Null when the partition table has no second app slot.
        let next =
            unsafe { esp_idf_sys::esp_ota_get_next_update_partition(core::ptr::null()) };
        !next.is_null()
    }

    fn begin(&mut self, image_size: u32) -> Result<(), PartitionError> {
        self.update = None;
        let update = esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("OTA: begin failed: {:?}", e);
            PartitionError::BeginFailed
        })?;
        self.update = Some(update);
        info!("OTA: inactive partition opened for {} bytes", image_size);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PartitionError> {
        let update = self.update.as_mut().ok_or(PartitionError::NotStarted)?;
        update.write(data).map_err(|e| {
            warn!("OTA: write failed: {:?}", e);
            PartitionError::WriteFailed
        })
    }

    fn activate(&mut self) -> Result<(), PartitionError> {
        let update = self.update.take().ok_or(PartitionError::NotStarted)?;
        let mut completed = update.finalize().map_err(|e| {
            warn!("OTA: finalize failed: {:?}", e);
            PartitionError::VerifyFailed
        })?;
        completed.set_as_boot_partition().map_err(|e| {
            warn!("OTA: set_as_boot_partition failed: {:?}", e);
            PartitionError::BootSetFailed
        })?;
        info!("OTA: new image selected for next boot");
        Ok(())
    }

    fn abort(&mut self) {
        // esp-ota aborts the session when OtaUpdate is dropped.
        if self.update.take().is_some() {
            warn!("OTA: session aborted");
        }
    }
}

/// Mark the running image valid, cancelling the bootloader's rollback.
#[cfg(target_os = "espidf")]
pub fn confirm_boot() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

// ── Host simulation ───────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct SimPartition {
    ready: bool,
    open: bool,
    staged: Vec<u8>,
    activated: Option<Vec<u8>>,
    begin_calls: u32,
    aborts: u32,
}

#[cfg(not(target_os = "espidf"))]
impl SimPartition {
    pub fn new() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    /// A layout without a second app slot.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Image selected for next boot, if any.
    pub fn activated_image(&self) -> Option<&[u8]> {
        self.activated.as_deref()
    }

    pub fn bytes_staged(&self) -> usize {
        self.staged.len()
    }

    pub fn begin_calls(&self) -> u32 {
        self.begin_calls
    }

    pub fn aborts(&self) -> u32 {
        self.aborts
    }
}

#[cfg(not(target_os = "espidf"))]
impl UpdatePartition for SimPartition {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn begin(&mut self, image_size: u32) -> Result<(), PartitionError> {
        if !self.ready {
            return Err(PartitionError::NoPartition);
        }
        self.begin_calls += 1;
        self.open = true;
        self.staged = Vec::with_capacity(image_size as usize);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PartitionError> {
        if !self.open {
            return Err(PartitionError::NotStarted);
        }
        self.staged.extend_from_slice(data);
        Ok(())
    }

    fn activate(&mut self) -> Result<(), PartitionError> {
        if !self.open {
            return Err(PartitionError::NotStarted);
        }
        self.open = false;
        self.activated = Some(core::mem::take(&mut self.staged));
        Ok(())
    }

    fn abort(&mut self) {
        self.open = false;
        self.staged.clear();
        self.aborts += 1;
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn confirm_boot() {
    log::info!("OTA(sim): boot confirmation skipped");
}
