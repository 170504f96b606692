//! Configuration update engine.
//!
//! Applies a change mapping to `config.json`. An empty value (`null` or
//! `""`) removes its key; any other value sets it. Required keys may be
//! changed but never emptied, and the document is only written once every
//! key in the change has been checked.

use log::{info, warn};
use serde_json::{Map, Value};

use super::auth::{self, Authorization};
use crate::app::ports::FileStore;
use crate::config::{ConfigDocument, REQUIRED_KEYS, is_empty_value};
use crate::error::{AdminError, AuthError, ValidationError};

/// Persisted document with secrets masked, for `get_config`.
pub fn get_config(store: &dyn FileStore) -> Result<Map<String, Value>, AdminError> {
    Ok(ConfigDocument::load(store)?.masked())
}

/// Engine for `update_config`. Holds only the optional signing secret.
pub struct ConfigUpdate<'c> {
    secret: Option<&'c str>,
}

impl<'c> ConfigUpdate<'c> {
    pub fn new(secret: Option<&'c str>) -> Self {
        Self { secret }
    }

    /// Check the change against the configured secret.
    pub fn authorize(
        &self,
        incoming: &Map<String, Value>,
        signature: Option<&str>,
    ) -> Result<Authorization, AuthError> {
        let outcome = auth::authorize(incoming, signature, self.secret)?;
        match outcome {
            Authorization::Verified => info!("config: signature is valid"),
            Authorization::Unsigned => {
                warn!("config: no signing secret configured, applying unsigned change")
            }
        }
        Ok(outcome)
    }

    /// Validate and persist `incoming`. Returns the document as written.
    ///
    /// Nothing is written unless every key passes.
    pub fn apply(
        &self,
        store: &mut dyn FileStore,
        incoming: &Map<String, Value>,
    ) -> Result<ConfigDocument, AdminError> {
        if incoming.is_empty() {
            return Err(ValidationError::EmptyChange.into());
        }
        if let Some(key) = incoming
            .iter()
            .find(|(key, value)| REQUIRED_KEYS.contains(&key.as_str()) && is_empty_value(value))
            .map(|(key, _)| key)
        {
            warn!("config: refusing to unset required key '{key}'");
            return Err(ValidationError::CannotUnset(key.clone()).into());
        }

        let mut document = ConfigDocument::load(store)?;
        for (key, value) in incoming {
            if is_empty_value(value) {
                if document.remove(key).is_some() {
                    info!("config: removed '{key}'");
                }
            } else {
                document.set(key, value.clone());
                info!("config: set '{key}'");
            }
        }

        if let Some(key) = document.missing_required() {
            return Err(ValidationError::RequiredKeyAbsent(key.to_owned()).into());
        }

        document.persist(store)?;
        Ok(document)
    }
}
