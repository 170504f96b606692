//! Config-change authorization: HMAC-SHA256 over the canonical payload.
//!
//! The sender signs the exact `config` mapping it transmits:
//!
//! 1. Serialise the mapping as compact JSON (`,` and `:` separators, no
//!    whitespace, keys in the order given).
//! 2. Compute `HMAC-SHA256(signing_secret, canonical_bytes)`.
//! 3. Send the hex digest as `signature`.
//!
//! Crypto comes from the `hmac-sha256` crate (pure Rust, no_std). Tag
//! comparison is constant-time.
//!
//! Signing is opt-in. With no secret configured, [`authorize`] accepts
//! every change.

use log::warn;
use serde_json::{Map, Value};

use crate::error::AuthError;

/// Outcome of a successful authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// The signature verified against the configured secret.
    Verified,
    /// No secret is configured; the change was not checked.
    Unsigned,
}

/// Compact JSON encoding of `payload` in its given key order.
pub fn canonicalize(payload: &Map<String, Value>) -> Vec<u8> {
    // Serialising a Map<String, Value> cannot fail.
    serde_json::to_vec(payload).unwrap_or_default()
}

/// Hex HMAC-SHA256 of the canonical payload. Used by tooling and tests.
pub fn sign(payload: &Map<String, Value>, secret: &str) -> String {
    hex::encode(hmac_sha256::HMAC::mac(canonicalize(payload), secret.as_bytes()))
}

/// Verify a hex signature over `payload` in constant time.
///
/// The signature is compared exactly as received. Malformed signatures
/// (not hex, wrong length, surrounding whitespace) are simply invalid.
pub fn verify(payload: &Map<String, Value>, signature: &str, secret: &str) -> bool {
    let mut tag = [0u8; 32];
    if hex::decode_to_slice(signature, &mut tag).is_err() {
        warn!("auth: signature is not a 64-char hex digest");
        return false;
    }
    hmac_sha256::HMAC::verify(canonicalize(payload), secret.as_bytes(), &tag)
}

/// Gate a config change on the configured secret.
pub fn authorize(
    payload: &Map<String, Value>,
    signature: Option<&str>,
    secret: Option<&str>,
) -> Result<Authorization, AuthError> {
    let Some(secret) = secret else {
        return Ok(Authorization::Unsigned);
    };
    let Some(signature) = signature else {
        warn!("auth: signing secret configured but change is unsigned");
        return Err(AuthError::MissingSignature);
    };
    if verify(payload, signature, secret) {
        Ok(Authorization::Verified)
    } else {
        warn!("auth: HMAC verification failed");
        Err(AuthError::InvalidSignature)
    }
}
