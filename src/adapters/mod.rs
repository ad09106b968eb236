//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements          | Connects to                |
//! |---------------|---------------------|----------------------------|
//! | `wifi`        | LinkPort            | ESP-IDF WiFi STA           |
//! | `mqtt`        | SessionPort         | ESP-IDF MQTT client (TLS)  |
//! |               | PayloadSource       |                            |
//! | `ota_storage` | UpdateStoragePort   | OTA partition (`esp-ota`)  |
//! | `platform`    | PlatformPort        | heap stats, chip restart   |
//! | `hardware`    | UpdateStoragePort   | storage + platform bundle  |
//! |               | PlatformPort        |                            |
//! | `log_sink`    | EventSink           | Serial log output          |
//! | `time`        | clock               | ESP-IDF high-res timer     |
//! | `device_id`   | –                   | eFuse MAC, address text    |
//!
//! Every adapter has a host simulation behind `not(target_os = "espidf")`.

pub mod device_id;
pub mod hardware;
pub mod log_sink;
pub mod mqtt;
pub mod ota_storage;
pub mod platform;
pub mod time;
pub mod wifi;
