//! MQTT adapter (ESP-IDF only).
//!
//! - The client callback copies command messages into the admin inbox
//!   ([`crate::admin::channels::INBOX`]) and raises [`CONNECTED`] on every
//!   (re)connect.
//! - [`MqttReporter`] implements [`ReportSink`] by publishing timestamped
//!   reports to `logs/<client_id>` at QoS 1.
//! - The broker holds a retained `{"status":"offline"}` last will on the
//!   same topic.
//!
//! Reconnect and keep-alive are handled inside the ESP-IDF client.

use std::sync::{Arc, Mutex};

use core::time::Duration;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use esp_idf_svc::mqtt::client::{
    EspMqttClient, EventPayload, LwtConfiguration, MqttClientConfiguration, QoS,
};
use esp_idf_sys::EspError;
use log::{info, warn};

use super::time::TimeAdapter;
use crate::admin::channels::{INBOX, enqueue};
use crate::app::ports::ReportSink;
use crate::app::report::Report;
use crate::config::NodeConfig;

pub type SharedClient = Arc<Mutex<EspMqttClient<'static>>>;

/// Raised by the client callback each time the broker session comes up.
pub static CONNECTED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

const OFFLINE: &[u8] = br#"{"status":"offline"}"#;

/// Connect to the configured broker.
pub fn connect(config: &NodeConfig) -> Result<SharedClient, EspError> {
    let url = config.broker_url();
    let logs_topic = config.logs_topic();
    let conf = MqttClientConfiguration {
        client_id: Some(&config.client_id),
        keep_alive_interval: Some(Duration::from_secs(30)),
        lwt: Some(LwtConfiguration {
            topic: &logs_topic,
            payload: OFFLINE,
            qos: QoS::AtLeastOnce,
            retain: true,
        }),
        ..Default::default()
    };

    info!("mqtt: connecting to {url} as {}", config.client_id);
    let client = EspMqttClient::new_cb(&url, &conf, |event| match event.payload() {
        EventPayload::Connected(_) => {
            info!("mqtt: connected");
            CONNECTED.signal(());
        }
        EventPayload::Disconnected => warn!("mqtt: disconnected"),
        EventPayload::Received {
            topic: Some(topic),
            data,
            ..
        } => {
            enqueue(&INBOX, topic, data);
        }
        EventPayload::Error(e) => warn!("mqtt: {e:?}"),
        _ => {}
    })?;
    Ok(Arc::new(Mutex::new(client)))
}

/// Subscribe to the node's command topic. Needed after every reconnect.
pub fn subscribe_commands(client: &SharedClient, topic: &str) -> Result<(), EspError> {
    let Ok(mut client) = client.lock() else {
        warn!("mqtt: client mutex poisoned");
        return Ok(());
    };
    client.subscribe(topic, QoS::AtLeastOnce)?;
    info!("mqtt: subscribed to {topic}");
    Ok(())
}

/// Publishes reports to `logs/<client_id>`.
#[derive(Clone)]
pub struct MqttReporter {
    client: SharedClient,
    logs_topic: String,
    time: TimeAdapter,
}

impl MqttReporter {
    pub fn new(client: SharedClient, logs_topic: String, time: TimeAdapter) -> Self {
        Self {
            client,
            logs_topic,
            time,
        }
    }
}

impl ReportSink for MqttReporter {
    fn publish(&mut self, report: &Report) {
        let json = report.to_json(&self.time.utc_timestamp());
        info!("REPORT | {json}");

        let Ok(mut client) = self.client.lock() else {
            warn!("mqtt: client mutex poisoned, report dropped");
            return;
        };
        if let Err(e) = client.enqueue(
            &self.logs_topic,
            QoS::AtLeastOnce,
            report.is_retained(),
            json.as_bytes(),
        ) {
            warn!("mqtt: publish to {} failed: {e}", self.logs_topic);
        }
    }
}
