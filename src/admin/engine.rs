//! Admin command dispatcher.
//!
//! Takes one inbound `(topic, payload)` at a time, decodes it into an
//! [`AdminCommand`] and routes it to the matching engine. Every failure is
//! caught here, logged, and published as an error report; nothing a remote
//! operator sends can stop the admin loop. Successful mutating commands end
//! with [`SystemPort::reset`].

use log::{debug, error, info, warn};
use serde_json::{Map, Value};

use super::auth::Authorization;
use super::config_update::{self, ConfigUpdate};
use super::ota::FirmwareUpdater;
use super::sync::{TreeSync, VersionMarker};
use crate::app::commands::AdminCommand;
use crate::app::ports::{FileStore, HttpPort, ReportSink, SystemPort, UpdatePartition, WatchdogPort};
use crate::app::report::Report;
use crate::config::{ConfigDocument, NodeConfig};
use crate::error::AdminError;

/// Longest payload excerpt attached to a decode-error report.
const PAYLOAD_EXCERPT: usize = 64;

/// What a single dispatch did.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Wrong topic, no `command` field, or an unknown command.
    Ignored,
    /// A query was answered.
    Answered,
    /// A mutating command succeeded and the device was reset.
    Reset,
    /// The command failed; an error report was published.
    Failed(AdminError),
}

/// The ports an admin command may touch, borrowed for one dispatch.
pub struct AdminContext<'a> {
    pub store: &'a mut dyn FileStore,
    pub http: &'a mut dyn HttpPort,
    pub partition: &'a mut dyn UpdatePartition,
    pub system: &'a mut dyn SystemPort,
    pub watchdog: &'a dyn WatchdogPort,
    pub reporter: &'a mut dyn ReportSink,
}

enum Completion {
    Answered,
    Reset,
}

pub struct Dispatcher<'c> {
    config: &'c NodeConfig,
    commands_topic: String,
    firmware: FirmwareUpdater,
}

impl<'c> Dispatcher<'c> {
    pub fn new(config: &'c NodeConfig) -> Self {
        Self {
            config,
            commands_topic: config.commands_topic(),
            firmware: FirmwareUpdater::new(),
        }
    }

    pub fn commands_topic(&self) -> &str {
        &self.commands_topic
    }

    /// Handle one inbound message to completion.
    pub fn handle(
        &mut self,
        topic: &str,
        payload: &[u8],
        ctx: &mut AdminContext<'_>,
    ) -> DispatchOutcome {
        if topic != self.commands_topic {
            debug!("admin: ignoring message on '{topic}'");
            return DispatchOutcome::Ignored;
        }

        let command = match AdminCommand::decode(payload) {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!("admin: no known command in payload, ignoring");
                return DispatchOutcome::Ignored;
            }
            Err(e) => {
                let operation = peek_command_name(payload).unwrap_or("dispatch");
                warn!("admin: rejected {operation} message: {e}");
                ctx.reporter.publish(
                    &Report::error(operation, &e).with("detail", excerpt(payload)),
                );
                return DispatchOutcome::Failed(e);
            }
        };

        info!("admin: received {}", command.name());
        match self.execute(&command, ctx) {
            Ok(Completion::Answered) => DispatchOutcome::Answered,
            Ok(Completion::Reset) => {
                info!("admin: {} complete, resetting", command.name());
                ctx.system.reset();
                DispatchOutcome::Reset
            }
            Err(e) => {
                error!("admin: {} failed: {e}", command.name());
                let mut report = Report::error(command.name(), &e);
                if matches!(command, AdminCommand::UpdateConfig { .. })
                    && matches!(e, AdminError::Validation(_))
                {
                    if let Ok(current) = ConfigDocument::load(&*ctx.store) {
                        report = report.with_config(&current);
                    }
                }
                ctx.reporter.publish(&report);
                DispatchOutcome::Failed(e)
            }
        }
    }

    fn execute(
        &mut self,
        command: &AdminCommand,
        ctx: &mut AdminContext<'_>,
    ) -> Result<Completion, AdminError> {
        match command {
            AdminCommand::GetConfig => {
                let masked = config_update::get_config(&*ctx.store)?;
                ctx.reporter.publish(
                    &Report::message("Current configuration").with("config", Value::Object(masked)),
                );
                Ok(Completion::Answered)
            }

            AdminCommand::GetSystemInfo => {
                let info = ctx.system.info();
                let code_version = VersionMarker::load(&*ctx.store);
                let mut body = Map::new();
                body.insert("firmware_version".into(), info.firmware_version.into());
                body.insert("platform".into(), info.platform.into());
                body.insert("free_memory".into(), info.free_memory.into());
                body.insert("uptime_secs".into(), info.uptime_secs.into());
                body.insert(
                    "code_version".into(),
                    code_version.map_or(Value::Null, |v| v.as_str().into()),
                );
                ctx.reporter.publish(&Report::from_map(body));
                Ok(Completion::Answered)
            }

            AdminCommand::UpdateConfig { config, signature } => {
                let engine = ConfigUpdate::new(self.config.signing_secret());
                if engine.authorize(config, signature.as_deref())? == Authorization::Verified {
                    ctx.reporter
                        .publish(&Report::message("Signature is valid, proceeding with update..."));
                }
                let document = engine.apply(ctx.store, config)?;
                ctx.reporter.publish(
                    &Report::message("Configuration updated, restarting board...")
                        .with_config(&document),
                );
                Ok(Completion::Reset)
            }

            AdminCommand::UpdateCode => {
                ctx.reporter
                    .publish(&Report::message("Beginning code update from GitHub..."));
                let source = self.config.source_identity();
                let outcome = TreeSync::new(ctx.http, ctx.store, ctx.watchdog, ctx.reporter)
                    .run(&source, self.config.code_entry_point.as_deref())?;
                if !outcome.failures.is_empty() {
                    warn!("admin: code update left {} node(s) behind", outcome.failures.len());
                }
                ctx.reporter.publish(
                    &Report::message("Code update successful, restarting board...")
                        .with("version", outcome.version.as_str())
                        .with("files_written", outcome.written_files.len())
                        .with("failures", outcome.failures.len()),
                );
                Ok(Completion::Reset)
            }

            AdminCommand::UpdateFirmware { firmware } => {
                let outcome = self.firmware.run(
                    firmware,
                    ctx.http,
                    ctx.partition,
                    ctx.watchdog,
                    ctx.reporter,
                )?;
                ctx.reporter.publish(
                    &Report::message("Firmware update successful, restarting board...")
                        .with("bytes_written", outcome.bytes_written)
                        .with("sha256", hex::encode(outcome.sha256)),
                );
                Ok(Completion::Reset)
            }
        }
    }
}

/// Best-effort command name of a payload that failed to decode.
fn peek_command_name(payload: &[u8]) -> Option<&'static str> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    match value.get("command")?.as_str()? {
        "get_config" => Some("get_config"),
        "get_system_info" => Some("get_system_info"),
        "update_config" => Some("update_config"),
        "update_code" => Some("update_code"),
        "update_firmware" => Some("update_firmware"),
        _ => None,
    }
}

fn excerpt(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    match text.char_indices().nth(PAYLOAD_EXCERPT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.into_owned(),
    }
}
