//! Internet Thing firmware — main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  WifiLink        MqttSession      IndicatorLed   Monotonic     │
//! │  (LinkPort)      (SessionPort)    (Indicator)    (clock)       │
//! │  HardwareAdapter (UpdateStorage + Platform)   LogEventSink     │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              ThingService (pure logic)                 │    │
//! │  │  Supervisor · Dispatcher · Streamer · Heartbeat        │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Context, Result, anyhow};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::{AnyOutputPin, PinDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;
use log::{info, warn};
use serde_json::{Map, Value};

use internet_thing::adapters::hardware::HardwareAdapter;
use internet_thing::adapters::log_sink::LogEventSink;
use internet_thing::adapters::mqtt::MqttSession;
use internet_thing::adapters::ota_storage::{self, OtaPartitionStorage};
use internet_thing::adapters::platform::Platform;
use internet_thing::adapters::time::MonotonicClock;
use internet_thing::adapters::wifi::WifiLink;
use internet_thing::app::events::Tick;
use internet_thing::app::service::ThingService;
use internet_thing::config::{DeviceIdentity, NetworkCredentials, ThingConfig, Timing};
use internet_thing::drivers::indicator::IndicatorLed;
use internet_thing::error::Error;

/// Idle pause between host-loop ticks.
const LOOP_PERIOD_MS: u32 = 10;

// ── Build-time configuration ──────────────────────────────────

fn env_or(value: Option<&'static str>, default: &str) -> String {
    value.unwrap_or(default).to_string()
}

fn env_num<T: core::str::FromStr>(value: Option<&'static str>, default: T) -> Result<T> {
    match value {
        Some(v) => v.parse().map_err(|_| anyhow!("not a number: {v}")),
        None => Ok(default),
    }
}

fn build_config() -> Result<ThingConfig> {
    let defaults = Timing::default();
    let config = ThingConfig {
        identity: DeviceIdentity {
            topic_base: env_or(option_env!("THING_TOPIC_BASE"), "somebuilding/someroom"),
            thing_id: env_or(option_env!("THING_ID"), "ssb1"),
            thing_name: env_or(option_env!("THING_NAME"), "Internet thing"),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        credentials: NetworkCredentials {
            ssid: env_or(option_env!("WIFI_SSID"), ""),
            password: env_or(option_env!("WIFI_PASSWORD"), ""),
            broker_host: env_or(option_env!("MQTT_HOST"), ""),
            broker_port: env_num(option_env!("MQTT_PORT"), 8883)?,
            root_cert: env_or(option_env!("MQTT_ROOT_CERT"), ""),
            broker_username: env_or(option_env!("MQTT_USERNAME"), ""),
            broker_password: env_or(option_env!("MQTT_PASSWORD"), ""),
        },
        indicator_pin: env_num(option_env!("THING_INDICATOR_PIN"), 2)?,
        indicator_active_low: option_env!("THING_INDICATOR_ACTIVE_LOW").is_some(),
        timing: Timing {
            reconnect_cooldown_ms: env_num(
                option_env!("THING_RECONNECT_COOLDOWN_MS"),
                defaults.reconnect_cooldown_ms,
            )?,
            heartbeat_interval_ms: env_num(
                option_env!("THING_HEARTBEAT_INTERVAL_MS"),
                defaults.heartbeat_interval_ms,
            )?,
            ..defaults
        },
    };
    config
        .validate()
        .map_err(|e| anyhow!("{}", Error::Config(e)))?;
    Ok(config)
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Internet Thing v{}                  ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 1b. OTA rollback check ────────────────────────────────
    ota_storage::check_rollback();

    // ── 2. Configuration ──────────────────────────────────────
    let config = build_config()?;
    info!("{:?}", config.credentials);

    // ── 3. Peripherals and adapters ───────────────────────────
    let peripherals = Peripherals::take().context("peripherals already taken")?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs))?;
    let creds = &config.credentials;
    let link = WifiLink::new(wifi, &creds.ssid, &creds.password)
        .map_err(|e| anyhow!("{}", Error::Link(e)))?;
    let session = MqttSession::new(&creds.broker_host, creds.broker_port, &creds.root_cert);

    // SAFETY: the indicator GPIO is not used by any other driver.
    let pin = unsafe { AnyOutputPin::new(i32::from(config.indicator_pin)) };
    let indicator = IndicatorLed::new(PinDriver::output(pin)?);

    let mut hw = HardwareAdapter::new(OtaPartitionStorage::new(), Platform::new());
    let mut sink = LogEventSink::new();
    let clock = MonotonicClock::new();

    // ── 4. Thing service ──────────────────────────────────────
    let mut service = ThingService::new(config, link, session, indicator);
    service.on_command(|name: &str, fields: &Map<String, Value>| {
        info!("Application command '{}' with {} field(s)", name, fields.len());
    });

    // ── 5. Host loop ──────────────────────────────────────────
    loop {
        match service.tick(clock.now_ms(), &mut hw, &mut sink) {
            Tick::Restart(reason) => {
                warn!("Restarting: {:?}", reason);
                hw.platform.restart();
            }
            // Keep an update streaming at full rate.
            Tick::Pending if service.update_active() => {}
            Tick::Ready | Tick::Pending => FreeRtos::delay_ms(LOOP_PERIOD_MS),
        }
    }
}
