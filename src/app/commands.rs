//! Inbound administrative commands.
//!
//! Commands arrive as JSON objects on `commands/<client_id>`:
//!
//! ```json
//! {"command": "update_config", "config": {"ntp_server": ""}, "signature": "…"}
//! {"command": "update_firmware", "firmware": {"url": "…", "size": 1234, "sha256": "…"}}
//! ```
//!
//! Decoding yields `Ok(None)` for payloads without a `command` field and for
//! command names outside the fixed set; the dispatcher ignores those.

use serde_json::{Map, Value};

use crate::error::{AdminError, DecodeError, ValidationError};

/// The fixed administrative command set.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    /// Report the persisted configuration (secrets masked).
    GetConfig,

    /// Report firmware/platform version, free memory and uptime.
    GetSystemInfo,

    /// Set or remove configuration keys, then reset.
    UpdateConfig {
        config: Map<String, Value>,
        signature: Option<String>,
    },

    /// Mirror the remote application tree, write the version marker, reset.
    UpdateCode,

    /// Stream a verified image into the inactive bank, activate, reset.
    /// The descriptor fields are validated by the firmware engine.
    UpdateFirmware { firmware: Map<String, Value> },
}

impl AdminCommand {
    /// Decode a raw command payload.
    pub fn decode(payload: &[u8]) -> Result<Option<Self>, AdminError> {
        let value: Value = serde_json::from_slice(payload).map_err(|_| DecodeError::NotJson)?;
        let Value::Object(mut object) = value else {
            return Err(DecodeError::NotObject.into());
        };

        let name = match object.get("command") {
            None => return Ok(None),
            Some(Value::String(name)) => name.clone(),
            Some(_) => return Err(DecodeError::WrongType("command").into()),
        };

        let command = match name.as_str() {
            "get_config" => Self::GetConfig,
            "get_system_info" => Self::GetSystemInfo,
            "update_config" => Self::UpdateConfig {
                config: take_object(&mut object, "config")?,
                signature: take_signature(&mut object)?,
            },
            "update_code" => Self::UpdateCode,
            "update_firmware" => Self::UpdateFirmware {
                firmware: take_object(&mut object, "firmware")?,
            },
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    /// Wire name, used as the `operation` field of reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetConfig => "get_config",
            Self::GetSystemInfo => "get_system_info",
            Self::UpdateConfig { .. } => "update_config",
            Self::UpdateCode => "update_code",
            Self::UpdateFirmware { .. } => "update_firmware",
        }
    }
}

fn take_object(
    object: &mut Map<String, Value>,
    field: &'static str,
) -> Result<Map<String, Value>, AdminError> {
    match object.remove(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field).into()),
        Some(Value::Object(inner)) => Ok(inner),
        Some(_) => Err(DecodeError::WrongType(field).into()),
    }
}

fn take_signature(object: &mut Map<String, Value>) -> Result<Option<String>, AdminError> {
    match object.remove("signature") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(signature)) => Ok(Some(signature)),
        Some(_) => Err(DecodeError::WrongType("signature").into()),
    }
}
