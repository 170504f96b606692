//! SoC services adapter: system info and hard reset.

use crate::app::ports::{SystemInfo, SystemPort};

use super::time::TimeAdapter;

/// Firmware version reported by `get_system_info`.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ── ESP-IDF ───────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct EspSystem {
    time: TimeAdapter,
}

#[cfg(target_os = "espidf")]
impl EspSystem {
    pub fn new(time: TimeAdapter) -> Self {
        Self { time }
    }
}

#[cfg(target_os = "espidf")]
impl SystemPort for EspSystem {
    fn info(&self) -> SystemInfo {
        use esp_idf_sys::{esp_get_free_heap_size, esp_get_idf_version};

        let idf = unsafe { core::ffi::CStr::from_ptr(esp_get_idf_version()) };
        SystemInfo {
            firmware_version: FIRMWARE_VERSION,
            platform: format!("ESP-IDF {}", idf.to_string_lossy()),
            free_memory: unsafe { esp_get_free_heap_size() },
            uptime_secs: self.time.uptime_secs(),
        }
    }

    fn reset(&mut self) {
        log::warn!("system: restarting");
        // Give the MQTT client a moment to flush the last report.
        esp_idf_hal::delay::FreeRtos::delay_ms(500);
        esp_idf_hal::reset::restart();
    }
}

// ── Host simulation ───────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct SimSystem {
    time: TimeAdapter,
    resets: u32,
}

#[cfg(not(target_os = "espidf"))]
impl SimSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }
}

#[cfg(not(target_os = "espidf"))]
impl SystemPort for SimSystem {
    fn info(&self) -> SystemInfo {
        SystemInfo {
            firmware_version: FIRMWARE_VERSION,
            platform: format!("host-sim ({})", std::env::consts::ARCH),
            free_memory: 0,
            uptime_secs: self.time.uptime_secs(),
        }
    }

    fn reset(&mut self) {
        log::warn!("system(sim): reset requested");
        self.resets += 1;
    }
}
