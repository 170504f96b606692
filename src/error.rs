//! Unified error types for the administration subsystem.
//!
//! Every engine (configuration, tree sync, firmware) returns [`AdminError`]
//! so the dispatcher can pattern-match on the failure class when deciding
//! whether to report, skip a subtree, or reset. Port-level errors
//! ([`StorageError`], [`PartitionError`]) live next to their traits in
//! [`crate::app::ports`] and convert in via `From`.

use core::fmt;

use crate::app::ports::{PartitionError, StorageError};

// ---------------------------------------------------------------------------
// Top-level admin error
// ---------------------------------------------------------------------------

/// Every fallible administrative operation funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    /// Inbound payload could not be decoded.
    Decode(DecodeError),
    /// A command or descriptor failed validation; nothing was mutated.
    Validation(ValidationError),
    /// Signature missing or mismatched; nothing was mutated.
    Authorization(AuthError),
    /// HTTP request failed or returned an unexpected status.
    Transport(TransportError),
    /// Firmware image did not match its descriptor.
    Integrity(IntegrityError),
    /// Local filesystem operation failed.
    Storage(StorageError),
    /// Update partition operation failed.
    Partition(PartitionError),
    /// Anything else.
    Fatal(String),
}

impl AdminError {
    /// Short machine-readable class name, used in outbound error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Validation(_) => "validation",
            Self::Authorization(_) => "authorization",
            Self::Transport(_) => "transport",
            Self::Integrity(_) => "integrity",
            Self::Storage(_) => "storage",
            Self::Partition(_) => "partition",
            Self::Fatal(_) => "fatal",
        }
    }
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Validation(e) => write!(f, "validation: {e}"),
            Self::Authorization(e) => write!(f, "authorization: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Integrity(e) => write!(f, "integrity: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Partition(e) => write!(f, "partition: {e}"),
            Self::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Decode errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is not valid UTF-8 / JSON.
    NotJson,
    /// Payload is JSON but not an object.
    NotObject,
    /// A field has the wrong JSON type.
    WrongType(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotJson => write!(f, "payload was not JSON"),
            Self::NotObject => write!(f, "payload was not a JSON object"),
            Self::WrongType(field) => write!(f, "field '{field}' has the wrong type"),
        }
    }
}

impl From<DecodeError> for AdminError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required command or descriptor field is absent.
    MissingField(&'static str),
    /// A field is present but its value is unusable.
    InvalidField(&'static str),
    /// Attempt to set a required configuration key to an empty value.
    CannotUnset(String),
    /// The resulting document would lack a required key.
    RequiredKeyAbsent(String),
    /// The incoming change mapping has no keys.
    EmptyChange,
    /// The platform reports no OTA-capable partition layout.
    OtaNotReady,
    /// A remote node name is not a plain file or directory name.
    UnsafeName(String),
    /// A remote node would overwrite a file the node itself owns.
    ReservedName(String),
    /// A code update finished without writing any file.
    NothingSynced,
    /// A code update finished but the configured entry point is missing.
    EntryPointMissing(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required field '{field}'"),
            Self::InvalidField(field) => write!(f, "invalid value for '{field}'"),
            Self::CannotUnset(key) => write!(f, "Cannot unset required configuration '{key}'"),
            Self::RequiredKeyAbsent(key) => {
                write!(f, "required configuration '{key}' would be absent")
            }
            Self::EmptyChange => write!(f, "configuration change contains no keys"),
            Self::OtaNotReady => write!(f, "firmware does not support OTA updates"),
            Self::UnsafeName(name) => write!(f, "refusing unsafe path component '{name}'"),
            Self::ReservedName(name) => write!(f, "refusing to overwrite reserved file '{name}'"),
            Self::NothingSynced => write!(f, "code update wrote no files"),
            Self::EntryPointMissing(path) => write!(f, "entry point '{path}' missing after sync"),
        }
    }
}

impl From<ValidationError> for AdminError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

// ---------------------------------------------------------------------------
// Authorization errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// A signing secret is configured but no signature accompanied the change.
    MissingSignature,
    /// The signature did not verify.
    InvalidSignature,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSignature => write!(f, "Signature is missing"),
            Self::InvalidSignature => write!(f, "Signature is not valid"),
        }
    }
}

impl From<AuthError> for AdminError {
    fn from(e: AuthError) -> Self {
        Self::Authorization(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Connection could not be established or the request not sent.
    Connect,
    /// Reading the response body failed mid-stream.
    Read,
    /// Server answered with a non-200 status.
    Status(u16),
    /// Response body exceeded the buffering limit.
    TooLarge { limit: usize },
    /// Response body could not be parsed.
    Malformed(&'static str),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connection failed"),
            Self::Read => write!(f, "response read failed"),
            Self::Status(code) => write!(f, "status code was {code}"),
            Self::TooLarge { limit } => write!(f, "response exceeded {limit} bytes"),
            Self::Malformed(what) => write!(f, "malformed {what}"),
        }
    }
}

impl From<TransportError> for AdminError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Integrity errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityError {
    /// Streamed byte count differs from the descriptor's size.
    SizeMismatch { expected: u32, actual: u32 },
    /// Computed SHA-256 differs from the descriptor's hash.
    HashMismatch { expected: [u8; 32], actual: [u8; 32] },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeMismatch { expected, actual } => {
                write!(f, "image size mismatch (expected {expected}, got {actual})")
            }
            Self::HashMismatch { expected, actual } => write!(
                f,
                "image sha256 mismatch (expected {}, got {})",
                hex::encode(expected),
                hex::encode(actual)
            ),
        }
    }
}

impl From<IntegrityError> for AdminError {
    fn from(e: IntegrityError) -> Self {
        Self::Integrity(e)
    }
}

impl From<StorageError> for AdminError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<PartitionError> for AdminError {
    fn from(e: PartitionError) -> Self {
        Self::Partition(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Admin-wide `Result` alias.
pub type Result<T> = core::result::Result<T, AdminError>;
