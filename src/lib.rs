//! Sensor node firmware library: remote administration and self-update.
//!
//! Exposes the pure-logic modules for integration testing. All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module, with host simulations alongside.

#![deny(unused_must_use)]

pub mod admin;
pub mod app;
pub mod config;
pub mod error;

pub mod adapters;
pub mod drivers;
