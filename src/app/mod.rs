//! Application core types. No I/O.
//!
//! The inbound command model, the outbound report model, and the **port
//! traits** in [`ports`] through which the admin engines reach the
//! network, the filesystem, the OTA partition and the SoC.

pub mod commands;
pub mod ports;
pub mod report;
