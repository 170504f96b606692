//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements      | Connects to                     |
//! |-----------------|-----------------|---------------------------------|
//! | `http`          | HttpPort        | ESP-IDF HTTP client / sim       |
//! | `storage`       | FileStore       | FAT partition via `std::fs`     |
//! | `ota_partition` | UpdatePartition | `esp-ota` / in-memory sim       |
//! | `system`        | SystemPort      | Heap, IDF version, `esp_restart`|
//! | `log_sink`      | ReportSink      | Serial log output               |
//! | `mqtt`          | ReportSink      | `logs/<client_id>` on the broker|
//! | `time`          | (helper)        | ESP32 system timer, wall clock  |

pub mod http;
pub mod log_sink;
#[cfg(target_os = "espidf")]
pub mod mqtt;
pub mod ota_partition;
pub mod storage;
pub mod system;
pub mod time;
