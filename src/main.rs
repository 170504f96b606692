//! Sensor node firmware entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspHttp      FsStore (FAT)   EspOtaPartition   EspSystem      │
//! │  (HttpPort)   (FileStore)     (UpdatePartition) (SystemPort)   │
//! │  MqttReporter Watchdog                                         │
//! │  (ReportSink) (WatchdogPort)                                   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  Dispatcher → ConfigUpdate · TreeSync · FirmwareUpdater │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  MQTT callback ──INBOX──▶ admin task (edge-executor)           │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use core::time::Duration;

use anyhow::{Result, anyhow};
use log::{info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_hal::modem::Modem;
use esp_idf_hal::prelude::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sntp::{EspSntp, SntpConf};
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use sensornode::adapters::http::EspHttp;
use sensornode::adapters::mqtt::{self, MqttReporter, SharedClient};
use sensornode::adapters::ota_partition::{EspOtaPartition, confirm_boot};
use sensornode::adapters::storage::{self, FsStore};
use sensornode::adapters::system::{EspSystem, FIRMWARE_VERSION};
use sensornode::adapters::time::TimeAdapter;
use sensornode::admin::channels::{INBOX, serve};
use sensornode::admin::engine::{AdminContext, Dispatcher};
use sensornode::app::ports::{ReportSink, WatchdogPort};
use sensornode::app::report::Report;
use sensornode::config::{ConfigDocument, NodeConfig};
use sensornode::drivers::watchdog::Watchdog;

/// Idle feed interval; well inside the TWDT timeout.
const HEARTBEAT: Duration = Duration::from_secs(5);

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SensorNode v{}                      ║", FIRMWARE_VERSION);
    info!("╚══════════════════════════════════════╝");

    // ── 2. Storage + config ───────────────────────────────────
    storage::mount_fat().map_err(|e| anyhow!("storage mount failed: {e}"))?;
    let mut store = FsStore::new(storage::MOUNT_POINT);
    let document = ConfigDocument::load(&store).map_err(|e| anyhow!("config.json: {e}"))?;
    let config = NodeConfig::from_document(&document).map_err(|e| anyhow!("config.json: {e}"))?;
    drop(document);
    info!("Config loaded for client '{}'", config.client_id);

    let watchdog = Watchdog::new(!config.disable_watchdog);

    // ── 3. Network ────────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let _wifi = connect_wifi(peripherals.modem, sysloop, nvs, &config)?;

    let mut sntp_conf = SntpConf::default();
    sntp_conf.servers[0] = config.ntp_server.as_str();
    let _sntp = EspSntp::new(&sntp_conf)?;
    info!("SNTP started ({})", config.ntp_server);

    let client = mqtt::connect(&config)?;

    // ── 4. Admin adapters ─────────────────────────────────────
    let time = TimeAdapter::new();
    let mut reporter = MqttReporter::new(client.clone(), config.logs_topic(), time);
    let mut http = EspHttp::new();
    let mut partition = EspOtaPartition::new();
    let mut system = EspSystem::new(time);

    let mut dispatcher = Dispatcher::new(&config);
    let commands_topic = dispatcher.commands_topic().to_owned();
    let status_reporter = reporter.clone();

    let mut ctx = AdminContext {
        store: &mut store,
        http: &mut http,
        partition: &mut partition,
        system: &mut system,
        watchdog: &watchdog,
        reporter: &mut reporter,
    };

    // ── 5. Run ────────────────────────────────────────────────
    let executor: edge_executor::LocalExecutor = edge_executor::LocalExecutor::new();
    executor
        .spawn(up_task(client, commands_topic, status_reporter))
        .detach();
    executor.spawn(heartbeat(&watchdog)).detach();

    async_io_mini::block_on(executor.run(serve(&INBOX, &mut dispatcher, &mut ctx)));
    Ok(())
}

fn connect_wifi(
    modem: Modem,
    sysloop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
    config: &NodeConfig,
) -> Result<BlockingWifi<EspWifi<'static>>> {
    let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sysloop.clone(), Some(nvs))?, sysloop)?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: config
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("ssid longer than 32 bytes"))?,
        password: config
            .wifi_pw
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi_pw longer than 64 bytes"))?,
        auth_method: if config.wifi_pw.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("WiFi: connecting to '{}'", config.ssid);
    wifi.connect()?;
    wifi.wait_netif_up()?;
    info!("WiFi: up");
    Ok(wifi)
}

/// Re-subscribes after every broker (re)connect, announces the node and
/// confirms the running image on the first success.
async fn up_task(client: SharedClient, commands_topic: String, mut reporter: MqttReporter) {
    let mut confirmed = false;
    loop {
        mqtt::CONNECTED.wait().await;
        if let Err(e) = mqtt::subscribe_commands(&client, &commands_topic) {
            warn!("mqtt: subscribe failed: {e}");
            continue;
        }
        reporter.publish(&Report::status("online"));
        if !confirmed {
            confirm_boot();
            confirmed = true;
        }
    }
}

async fn heartbeat(watchdog: &Watchdog) {
    loop {
        watchdog.feed();
        async_io_mini::Timer::after(HEARTBEAT).await;
    }
}
