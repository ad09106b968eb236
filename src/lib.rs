//! Internet Thing library.
//!
//! Connectivity supervision, command dispatch, heartbeat and MQTT-streamed
//! OTA for a single ESP32 device.  The core is pure logic behind port
//! traits so it runs on the host for testing; all ESP-IDF-specific code
//! is guarded by `#[cfg(target_os = "espidf")]` within the adapters.

#![deny(unused_must_use)]

pub mod app;
pub mod codec;
pub mod config;
pub mod connectivity;
pub mod dispatcher;
pub mod error;
pub mod ota;
pub mod scheduler;
pub mod topic;

pub mod adapters;
pub mod drivers;
