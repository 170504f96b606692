//! Fuzz target: config-change signature verification.
//!
//! The first byte splits the input into a secret and a candidate signature;
//! the change payload is fixed.
//!
//! Invariants checked:
//! - No panics for arbitrary signature text
//! - Only the genuine signature verifies
//!
//! cargo fuzz run fuzz_signature

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensornode::admin::auth::{sign, verify};
use serde_json::{Map, Value};

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = (split as usize).min(rest.len());
    let (secret, candidate) = rest.split_at(split);
    let secret = String::from_utf8_lossy(secret);
    let candidate = String::from_utf8_lossy(candidate);

    let mut change = Map::new();
    change.insert("ntp_server".into(), Value::from("pool.ntp.org"));

    let genuine = sign(&change, &secret);
    if verify(&change, &candidate, &secret) {
        assert!(candidate.eq_ignore_ascii_case(&genuine));
    }
});
