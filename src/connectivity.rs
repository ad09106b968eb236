//! Connectivity supervisor: keeps the link and the broker session up.
//!
//! ```text
//!              link up                 connect ok
//! Disconnected ───────▶ LinkUp ──────────────────────▶ SessionUp
//!      ▲                  │  ▲  connect refused            │
//!      │                  │  └──(retry after cooldown)     │
//!      └──── link lost ───┴────────────────────────────────┘
//!                                       session lost ──▶ LinkUp
//! ```
//!
//! [`maintain`](ConnectivitySupervisor::maintain) runs once per host-loop
//! tick and returns immediately when the session is up.  It never sleeps:
//! waiting for the link is tracked against the caller's clock, the link is
//! asked to reassociate every `reconnect_cooldown_ms`, and a link that
//! stays down past `link_timeout_ms` yields a restart request.
//! Broker connects are spaced at least `reconnect_cooldown_ms` apart.

use log::{info, warn};

use crate::app::events::{RestartReason, ThingEvent, Tick};
use crate::app::ports::{
    ConnectOptions, EventSink, IndicatorPort, Inbound, LastWill, LinkPort, PayloadSource,
    Publisher, SessionPort,
};
use crate::adapters::device_id;
use crate::codec::{self, StatusDetails, StatusMessage};
use crate::config::{ThingConfig, Timing};
use crate::topic::{self, Qos, TopicNamespace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    LinkUp,
    SessionUp,
}

/// Link and session losses observed since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisconnectCounters {
    pub link: u32,
    pub session: u32,
}

pub struct ConnectivitySupervisor<L, S, I> {
    link: L,
    session: S,
    indicator: I,
    config: ThingConfig,
    topics: TopicNamespace,
    state: ConnectionState,
    /// When the current link outage was first seen.
    link_down_since: Option<u64>,
    /// Last time the link was asked to reassociate.
    link_kicked_at: u64,
    last_reconnect_attempt_at: Option<u64>,
    link_seen_up: bool,
    counters: DisconnectCounters,
    indicator_lit: bool,
    indicator_active_low: bool,
}

impl<L, S, I> ConnectivitySupervisor<L, S, I>
where
    L: LinkPort,
    S: SessionPort,
    I: IndicatorPort,
{
    pub fn new(config: ThingConfig, link: L, session: S, indicator: I) -> Self {
        let topics = TopicNamespace::from_identity(&config.identity);
        let indicator_active_low = config.indicator_active_low;
        let mut sup = Self {
            link,
            session,
            indicator,
            config,
            topics,
            state: ConnectionState::Disconnected,
            link_down_since: None,
            link_kicked_at: 0,
            last_reconnect_attempt_at: None,
            link_seen_up: false,
            counters: DisconnectCounters::default(),
            indicator_lit: false,
            indicator_active_low,
        };
        sup.drive_indicator(false);
        sup
    }

    // ── Maintenance step ──────────────────────────────────────

    pub fn maintain(&mut self, now_ms: u64, sink: &mut impl EventSink) -> Tick {
        if self.connected() {
            return Tick::Ready;
        }

        if self.state == ConnectionState::SessionUp {
            warn!("Session lost");
            self.counters.session += 1;
            self.state = ConnectionState::LinkUp;
            sink.emit(&ThingEvent::SessionLost);
        }
        self.drive_indicator(true);

        if !self.link.is_connected() {
            return self.await_link(now_ms, sink);
        }

        if let Some(since) = self.link_down_since.take() {
            info!("Connected to the {} network.", self.config.credentials.ssid);
            sink.emit(&ThingEvent::LinkRestored {
                waited_ms: now_ms.saturating_sub(since),
            });
        }
        self.link_seen_up = true;
        if self.state == ConnectionState::Disconnected {
            self.state = ConnectionState::LinkUp;
        }

        if !self.cooldown_elapsed(now_ms) {
            return Tick::Pending;
        }
        self.last_reconnect_attempt_at = Some(now_ms);
        self.connect_session(sink)
    }

    fn await_link(&mut self, now_ms: u64, sink: &mut impl EventSink) -> Tick {
        self.state = ConnectionState::Disconnected;

        let Some(since) = self.link_down_since else {
            if self.link_seen_up {
                self.counters.link += 1;
                sink.emit(&ThingEvent::LinkLost);
            }
            info!("Connecting to the {} network.", self.config.credentials.ssid);
            self.link_down_since = Some(now_ms);
            self.link_kicked_at = now_ms;
            self.link.reconnect();
            return Tick::Pending;
        };

        let waited = now_ms.saturating_sub(since);
        if waited >= u64::from(self.config.timing.link_timeout_ms) {
            warn!("Network unreachable for {} ms, giving up", waited);
            return Tick::Restart(RestartReason::LinkTimeout);
        }

        // A single association attempt does not retry on its own.
        let cooldown = u64::from(self.config.timing.reconnect_cooldown_ms);
        if now_ms.saturating_sub(self.link_kicked_at) >= cooldown {
            info!("Still connecting to the {} network.", self.config.credentials.ssid);
            self.link_kicked_at = now_ms;
            self.link.reconnect();
        }
        Tick::Pending
    }

    fn cooldown_elapsed(&self, now_ms: u64) -> bool {
        let cooldown = u64::from(self.config.timing.reconnect_cooldown_ms);
        self.last_reconnect_attempt_at
            .is_none_or(|at| now_ms.saturating_sub(at) >= cooldown)
    }

    fn connect_session(&mut self, sink: &mut impl EventSink) -> Tick {
        let creds = &self.config.credentials;
        info!(
            "Connecting to the {}:{} MQTT server.",
            creds.broker_host, creds.broker_port
        );

        let status_topic = self.topics.create_topic(topic::STATUS);
        let offline = codec::encode(&StatusMessage::offline());
        let options = ConnectOptions {
            client_id: &self.config.identity.thing_id,
            username: &creds.broker_username,
            password: &creds.broker_password,
            will: LastWill {
                topic: &status_topic,
                payload: &offline,
                qos: Qos::AtLeastOnce,
                retained: true,
            },
        };

        if let Err(e) = self.session.connect(&options) {
            warn!("Failed, state is {}.", e.code);
            sink.emit(&ThingEvent::SessionRefused { code: e.code });
            return Tick::Pending;
        }

        info!("Connected.");
        self.state = ConnectionState::SessionUp;
        self.drive_indicator(false);
        sink.emit(&ThingEvent::SessionEstablished);

        let online = self.online_status();
        self.publish(topic::STATUS, &online, true);
        self.subscribe(topic::COMMAND, Qos::AtLeastOnce);
        self.subscribe(topic::UPDATE, Qos::AtMostOnce);
        Tick::Ready
    }

    fn online_status(&self) -> String {
        let mac = device_id::format_mac(&self.link.mac_address());
        let ip = device_id::format_ip(self.link.local_ip());
        let id = &self.config.identity;
        codec::encode(&StatusMessage::online(StatusDetails {
            name: &id.thing_name,
            version: &id.version,
            mac: &mac,
            ip: &ip,
        }))
    }

    // ── Session access ────────────────────────────────────────

    /// True only while the session we established is still up.
    pub fn connected(&self) -> bool {
        self.state == ConnectionState::SessionUp && self.session.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn subscribe(&mut self, subject: &str, qos: Qos) -> bool {
        let topic = self.topics.create_topic(subject);
        info!("Subscribed to: {}.", topic);
        self.session.subscribe(&topic, qos)
    }

    /// Service the session layer.  Yields at most one inbound message.
    pub fn pump(&mut self) -> Option<Inbound> {
        if !self.connected() {
            return None;
        }
        let inbound = self.session.poll()?;
        info!("Received on: {}, {} bytes.", inbound.topic, inbound.length);
        Some(inbound)
    }

    pub fn timing(&self) -> Timing {
        self.config.timing
    }

    pub fn topics(&self) -> &TopicNamespace {
        &self.topics
    }

    pub fn counters(&self) -> DisconnectCounters {
        self.counters
    }

    pub fn rssi(&self) -> Option<i8> {
        self.link.rssi()
    }

    // ── Indicator ─────────────────────────────────────────────

    /// Flip the electrical polarity of the indicator.
    pub fn invert_indicator(&mut self) {
        self.indicator_active_low = !self.indicator_active_low;
        self.drive_indicator(self.indicator_lit);
    }

    pub fn indicator_lit(&self) -> bool {
        self.indicator_lit
    }

    fn drive_indicator(&mut self, lit: bool) {
        self.indicator_lit = lit;
        self.indicator.set_level(lit != self.indicator_active_low);
    }

    // ── Test access ───────────────────────────────────────────

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }
}

impl<L, S, I> Publisher for ConnectivitySupervisor<L, S, I>
where
    L: LinkPort,
    S: SessionPort,
    I: IndicatorPort,
{
    fn publish(&mut self, subject: &str, payload: &str, retained: bool) -> bool {
        let topic = self.topics.create_topic(subject);
        info!("Published to: {}, content: {}.", topic, payload);
        let ok = self
            .session
            .publish(&topic, payload.as_bytes(), topic::publish_qos(subject), retained);
        if !ok {
            warn!(
                "Publish failed ({} bytes), check the client's maximum packet size.",
                payload.len()
            );
        }
        ok
    }
}

impl<L, S, I> PayloadSource for ConnectivitySupervisor<L, S, I>
where
    S: SessionPort,
{
    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.session.read(buf)
    }
}
