//! Remote administration and self-update.
//!
//! | Module            | Role                                              |
//! |-------------------|---------------------------------------------------|
//! | [`engine`]        | Decodes commands, routes them, reports, resets     |
//! | [`config_update`] | Edits `config.json` under the required-key rules   |
//! | [`auth`]          | HMAC-SHA256 signatures over config changes         |
//! | [`sync`]          | Mirrors the remote source tree, writes `.version`  |
//! | [`ota`]           | Streams and verifies firmware into the OTA bank    |
//! | [`channels`]      | Bounded inbox between broker callback and task     |
//!
//! At most one command runs at a time. The admin task owns the
//! [`engine::Dispatcher`] and borrows every port for the length of a
//! single dispatch.

pub mod auth;
pub mod channels;
pub mod config_update;
pub mod engine;
pub mod ota;
pub mod sync;
