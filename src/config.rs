//! Node configuration.
//!
//! Two views over `config.json`:
//!
//! - [`ConfigDocument`]: the raw, ordered key/value document. The
//!   configuration engine edits this and persists it whole.
//! - [`NodeConfig`]: the typed view parsed once at boot and passed by
//!   reference into every engine. It is never mutated: every successful
//!   config write is followed by a reset, and the next boot parses a new
//!   value.

use core::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::admin::sync::SourceIdentity;
use crate::app::ports::{FileStore, StorageError};
use crate::app::report::MASK;
use crate::error::{AdminError, ValidationError};

/// Persisted configuration file, relative to the store root.
pub const CONFIG_PATH: &str = "config.json";

/// Keys without which the node cannot rejoin WiFi or the broker.
/// They may be changed but never emptied or removed.
pub const REQUIRED_KEYS: [&str; 6] = ["client_id", "server", "port", "ssid", "wifi_pw", "topic"];

/// Keys replaced with [`MASK`] before a document leaves the device.
pub const SECRET_KEYS: [&str; 3] = ["wifi_pw", "github_token", "signing_secret"];

/// `null` and `""` mean "remove this key". `false` and `0` are real values.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

// ───────────────────────────────────────────────────────────────
// Raw document
// ───────────────────────────────────────────────────────────────

/// Ordered key/value configuration document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigDocument(Map<String, Value>);

impl ConfigDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, ConfigError> {
        match serde_json::from_slice(bytes) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            _ => Err(ConfigError::Corrupted),
        }
    }

    /// Read and parse `config.json` from the store.
    pub fn load(store: &dyn FileStore) -> Result<Self, ConfigError> {
        let bytes = store.read(Path::new(CONFIG_PATH))?;
        Self::parse(&bytes)
    }

    /// Replace `config.json` atomically.
    pub fn persist(&self, store: &mut dyn FileStore) -> Result<(), ConfigError> {
        store.write_atomic(Path::new(CONFIG_PATH), &self.to_bytes())?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        Value::Object(self.0.clone()).to_string().into_bytes()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_owned(), value);
    }

    /// Remove a key, keeping the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// First required key that is absent or empty.
    pub fn missing_required(&self) -> Option<&'static str> {
        REQUIRED_KEYS
            .into_iter()
            .find(|key| self.0.get(*key).is_none_or(is_empty_value))
    }

    /// Copy of the document safe to publish.
    pub fn masked(&self) -> Map<String, Value> {
        let mut map = self.0.clone();
        for key in SECRET_KEYS {
            if let Some(value) = map.get_mut(key) {
                if !value.is_null() {
                    *value = Value::from(MASK);
                }
            }
        }
        map
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

// ───────────────────────────────────────────────────────────────
// Typed boot-time view
// ───────────────────────────────────────────────────────────────

/// Typed configuration, loaded once per boot.
///
/// Keys outside this struct (sensor wiring, output devices, pins) stay in
/// the document and are consumed by their own subsystems.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    // --- Broker / network (required) ---
    pub client_id: String,
    pub server: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    pub ssid: String,
    pub wifi_pw: String,
    /// Primary telemetry topic.
    pub topic: String,

    // --- Optional ---
    #[serde(default = "default_ntp_server")]
    pub ntp_server: String,
    #[serde(default)]
    pub disable_watchdog: bool,
    /// Shared secret for config-update signatures. Unset means unsigned
    /// updates are accepted.
    #[serde(default)]
    pub signing_secret: Option<String>,

    // --- Code update source ---
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default = "default_github_username")]
    pub github_username: String,
    #[serde(default = "default_github_repository")]
    pub github_repository: String,
    #[serde(default = "default_github_ref")]
    pub github_ref: String,
    #[serde(default = "default_github_path")]
    pub github_path: String,
    /// File that must exist after a code sync before the node resets.
    #[serde(default)]
    pub code_entry_point: Option<String>,
}

fn default_ntp_server() -> String {
    "time.cloudflare.com".to_owned()
}

fn default_github_username() -> String {
    "VirtualWolf".to_owned()
}

fn default_github_repository() -> String {
    "esp32-sensor-reader-mqtt".to_owned()
}

fn default_github_ref() -> String {
    "main".to_owned()
}

fn default_github_path() -> String {
    "src".to_owned()
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom("port must be a number")),
    }
}

impl NodeConfig {
    /// Build the typed view, refusing documents without the required keys.
    pub fn from_document(document: &ConfigDocument) -> Result<Self, ConfigError> {
        if let Some(key) = document.missing_required() {
            return Err(ConfigError::MissingKey(key));
        }
        serde_json::from_value(Value::Object(document.as_map().clone()))
            .map_err(|_| ConfigError::InvalidValue)
    }

    /// Topic the admin subsystem listens on.
    pub fn commands_topic(&self) -> String {
        format!("commands/{}", self.client_id)
    }

    /// Topic reports are published to.
    pub fn logs_topic(&self) -> String {
        format!("logs/{}", self.client_id)
    }

    /// `mqtt://host:port` broker URL.
    pub fn broker_url(&self) -> String {
        format!("mqtt://{}:{}", self.server, self.port)
    }

    /// Signing secret, treating an empty string as unset.
    pub fn signing_secret(&self) -> Option<&str> {
        self.signing_secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Remote tree the code updater mirrors.
    pub fn source_identity(&self) -> SourceIdentity {
        SourceIdentity {
            owner: self.github_username.clone(),
            repository: self.github_repository.clone(),
            reference: self.github_ref.clone(),
            path: self.github_path.clone(),
            token: self.github_token.clone().filter(|t| !t.is_empty()),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored document is not a JSON object.
    Corrupted,
    /// A required key is absent or empty.
    MissingKey(&'static str),
    /// A typed field has an unusable value.
    InvalidValue,
    /// Underlying storage failed.
    Storage(StorageError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config.json is not a JSON object"),
            Self::MissingKey(key) => write!(f, "required configuration '{key}' is missing"),
            Self::InvalidValue => write!(f, "configuration contains an invalid value"),
            Self::Storage(e) => write!(f, "config storage: {e}"),
        }
    }
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for AdminError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Storage(e) => Self::Storage(e),
            ConfigError::MissingKey(key) => {
                Self::Validation(ValidationError::RequiredKeyAbsent(key.to_owned()))
            }
            ConfigError::InvalidValue => Self::Validation(ValidationError::InvalidField("config")),
            ConfigError::Corrupted => Self::Fatal(e.to_string()),
        }
    }
}
