//! Fuzz target: `AdminCommand::decode` and firmware descriptor validation.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - A decoded `update_firmware` descriptor always satisfies its own bounds
//!
//! cargo fuzz run fuzz_command_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensornode::admin::ota::{FirmwareDescriptor, MAX_FIRMWARE_SIZE};
use sensornode::app::commands::AdminCommand;

fuzz_target!(|data: &[u8]| {
    let Ok(Some(command)) = AdminCommand::decode(data) else {
        return;
    };
    assert!(!command.name().is_empty());

    if let AdminCommand::UpdateFirmware { firmware } = command {
        if let Ok(descriptor) = FirmwareDescriptor::from_fields(&firmware) {
            assert!(descriptor.size > 0 && descriptor.size <= MAX_FIRMWARE_SIZE);
            assert!(descriptor.url.starts_with("http://") || descriptor.url.starts_with("https://"));
        }
    }
});
