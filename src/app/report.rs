//! Outbound operator reports.
//!
//! The dispatcher and engines emit [`Report`]s through the
//! [`ReportSink`](super::ports::ReportSink) port. A report is an arbitrary
//! JSON object; the sink merges in a `timestamp` field before transmission.
//! There is no other operator console, so every failure becomes a report.

use serde_json::{Map, Value};

use crate::config::ConfigDocument;
use crate::error::AdminError;

/// Replacement text for secret-bearing configuration values.
pub const MASK: &str = "********";

/// Structured report destined for the node's logs topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    body: Map<String, Value>,
    retain: bool,
}

impl Report {
    /// Plain progress / outcome message.
    pub fn message(text: impl Into<String>) -> Self {
        Self::new().with("message", text.into())
    }

    /// Failure report: `{"error", "operation", "kind"}`.
    pub fn error(operation: &str, error: &AdminError) -> Self {
        Self::new()
            .with("error", error.to_string())
            .with("operation", operation)
            .with("kind", error.kind())
    }

    /// Retained connectivity status (`online` / `offline`).
    pub fn status(status: &str) -> Self {
        let mut report = Self::new().with("status", status);
        report.retain = true;
        report
    }

    /// Report carrying arbitrary fields, e.g. system info.
    pub fn from_map(body: Map<String, Value>) -> Self {
        Self {
            body,
            retain: false,
        }
    }

    fn new() -> Self {
        Self {
            body: Map::new(),
            retain: false,
        }
    }

    /// Add or overwrite a field.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.insert(key.to_owned(), value.into());
        self
    }

    /// Attach a configuration document with its secrets masked.
    #[must_use]
    pub fn with_config(self, document: &ConfigDocument) -> Self {
        self.with("config", Value::Object(document.masked()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    pub fn is_error(&self) -> bool {
        self.body.contains_key("error")
    }

    pub fn is_retained(&self) -> bool {
        self.retain
    }

    /// Serialise with the sink's `timestamp` merged in.
    pub fn to_json(&self, timestamp: &str) -> String {
        let mut body = self.body.clone();
        body.insert("timestamp".to_owned(), Value::from(timestamp));
        Value::Object(body).to_string()
    }
}
