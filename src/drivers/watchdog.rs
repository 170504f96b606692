//! Task Watchdog Timer (TWDT) driver.
//!
//! Wraps the ESP-IDF TWDT API to reset the device if the admin task stalls
//! for more than 30 seconds. Tree sync and firmware download feed it per
//! chunk through [`WatchdogPort`]; an idle heartbeat feeds it otherwise.
//!
//! Setting `disable_watchdog` in `config.json` skips the subscription.

#[cfg(target_os = "espidf")]
use esp_idf_sys::*;

use log::info;

use crate::app::ports::WatchdogPort;

/// Stall budget before the TWDT panics and resets.
pub const TIMEOUT_MS: u32 = 30_000;

pub struct Watchdog {
    subscribed: bool,
}

impl Watchdog {
    /// Subscribe the current task to the TWDT unless `enabled` is false.
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            info!("Watchdog: disabled by configuration");
            return Self { subscribed: false };
        }

        #[cfg(target_os = "espidf")]
        {
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms: TIMEOUT_MS,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    log::warn!(
                        "TWDT reconfigure returned {} (may already be configured)",
                        ret
                    );
                }

                let ret = esp_task_wdt_add(core::ptr::null_mut());
                let subscribed = ret == ESP_OK;
                if subscribed {
                    info!("Watchdog: subscribed ({}s timeout)", TIMEOUT_MS / 1000);
                } else {
                    log::warn!("Watchdog: failed to subscribe ({})", ret);
                }
                Self { subscribed }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("Watchdog(sim): no-op");
            Self { subscribed: true }
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }
}

impl WatchdogPort for Watchdog {
    fn feed(&self) {
        #[cfg(target_os = "espidf")]
        {
            if self.subscribed {
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }
    }
}
