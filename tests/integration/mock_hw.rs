//! Simulated device for integration tests.
//!
//! Wires a [`ThingService`] to the host simulations of every adapter and
//! drives it with a manual clock, recording every emitted event so tests
//! can assert on the full history without real radio, broker or flash.

use internet_thing::adapters::hardware::HardwareAdapter;
use internet_thing::adapters::mqtt::MqttSession;
use internet_thing::adapters::ota_storage::OtaPartitionStorage;
use internet_thing::adapters::platform::Platform;
use internet_thing::adapters::wifi::WifiLink;
use internet_thing::app::events::{ThingEvent, Tick};
use internet_thing::app::ports::EventSink;
use internet_thing::app::service::ThingService;
use internet_thing::config::{DeviceIdentity, NetworkCredentials, ThingConfig, Timing};
use internet_thing::drivers::indicator::{IndicatorLed, SimPin};
use serde_json::Value;

pub const BASE: &str = "somebuilding/someroom/ssb1";

pub type Service = ThingService<WifiLink, MqttSession, IndicatorLed<SimPin>>;

/// Fully-qualified topic for `subject`.
pub fn topic(subject: &str) -> String {
    format!("{BASE}/{subject}")
}

pub fn config() -> ThingConfig {
    ThingConfig {
        identity: DeviceIdentity {
            topic_base: "somebuilding/someroom".into(),
            thing_id: "ssb1".into(),
            thing_name: "An example of a simple sensor box".into(),
            version: "0.0.1".into(),
        },
        credentials: NetworkCredentials {
            ssid: "SomeSsid".into(),
            password: "SomeWiFiPassword".into(),
            broker_host: "broker.local".into(),
            broker_port: 8883,
            root_cert: String::new(),
            broker_username: "user".into(),
            broker_password: "secret".into(),
        },
        indicator_pin: 25,
        indicator_active_low: false,
        timing: Timing::default(),
    }
}

// ── Event recorder ────────────────────────────────────────────

#[derive(Default)]
pub struct LogSink {
    pub events: Vec<ThingEvent>,
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &ThingEvent) {
        self.events.push(event.clone());
    }
}

// ── Device ────────────────────────────────────────────────────

pub struct Device {
    pub service: Service,
    pub hw: HardwareAdapter,
    pub sink: LogSink,
    pub now: u64,
}

#[allow(dead_code)]
impl Device {
    pub fn new(config: ThingConfig) -> Self {
        let link = WifiLink::simulated(
            &config.credentials.ssid,
            &config.credentials.password,
            true,
        )
        .unwrap();
        let service = ThingService::new(
            config,
            link,
            MqttSession::loopback(),
            IndicatorLed::new(SimPin::default()),
        );
        Self {
            service,
            hw: HardwareAdapter::new(OtaPartitionStorage::with_capacity(64 * 1024), Platform::new()),
            sink: LogSink::default(),
            now: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(config())
    }

    pub fn tick(&mut self) -> Tick {
        self.service.tick(self.now, &mut self.hw, &mut self.sink)
    }

    /// Move the clock forward, then tick.
    pub fn tick_at(&mut self, now: u64) -> Tick {
        self.now = now;
        self.tick()
    }

    /// Tick every `step` ms until `until` (inclusive), returning the first
    /// restart, if any.
    pub fn run(&mut self, until: u64, step: u64) -> Option<Tick> {
        while self.now < until {
            self.now = (self.now + step).min(until);
            if let t @ Tick::Restart(_) = self.tick() {
                return Some(t);
            }
        }
        None
    }

    /// Tick until connected, with the clock standing still.
    pub fn bring_up(&mut self) {
        for _ in 0..4 {
            if self.tick() == Tick::Ready {
                return;
            }
        }
        panic!("device never came online");
    }

    pub fn link(&mut self) -> &mut WifiLink {
        self.service.supervisor_mut().link_mut()
    }

    pub fn session(&mut self) -> &mut MqttSession {
        self.service.supervisor_mut().session_mut()
    }

    pub fn deliver(&mut self, subject: &str, payload: &[u8]) {
        let t = topic(subject);
        self.session().deliver(&t, payload);
    }

    /// Parsed payloads published on `subject`.
    pub fn published(&mut self, subject: &str) -> Vec<Value> {
        let t = topic(subject);
        self.session()
            .published_on(&t)
            .iter()
            .map(|p| serde_json::from_str(p).unwrap())
            .collect()
    }

    /// `message` texts of every progress report so far.
    pub fn progress(&mut self) -> Vec<String> {
        self.published("update/progress")
            .iter()
            .map(|v| v["message"].as_str().unwrap().to_string())
            .collect()
    }

    pub fn heartbeats(&mut self) -> Vec<u64> {
        self.published("telemetry/system")
            .iter()
            .map(|v| v["sequence"].as_u64().unwrap())
            .collect()
    }
}
