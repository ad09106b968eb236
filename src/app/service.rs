//! Application service, the hexagonal core.
//!
//! [`ThingService`] owns the connectivity supervisor, the command
//! dispatcher, the heartbeat scheduler and, while an update is running,
//! the update streamer.  The host loop calls [`tick`](ThingService::tick)
//! with the current clock value; nothing in here sleeps.
//!
//! ```text
//!  LinkPort ────▶ ┌──────────────────────────────┐ ──▶ EventSink
//!  SessionPort ◀─▶│         ThingService          │
//!  IndicatorPort ◀│ Supervisor · Dispatcher ·     │◀─▶ UpdateStoragePort
//!                 │ Streamer · Heartbeat          │◀── PlatformPort
//!                 └──────────────────────────────┘
//! ```
//!
//! One tick is one of:
//! - a single update-streaming step, while an update is active;
//! - otherwise: maintenance, at most one inbound message, heartbeat.

use log::{info, warn};

use crate::codec::{self, SystemMessage};
use crate::config::ThingConfig;
use crate::connectivity::ConnectivitySupervisor;
use crate::dispatcher::{CommandDispatcher, Dispatch};
use crate::ota::{StreamStep, UpdateStreamer};
use crate::scheduler::HeartbeatScheduler;
use crate::topic;

use super::events::{RestartReason, ThingEvent, Tick};
use super::ports::{
    CommandHandler, EventSink, IndicatorPort, LinkPort, PlatformPort, Publisher, SessionPort,
    UpdateStoragePort,
};

// ───────────────────────────────────────────────────────────────
// ThingService
// ───────────────────────────────────────────────────────────────

pub struct ThingService<L, S, I> {
    supervisor: ConnectivitySupervisor<L, S, I>,
    dispatcher: CommandDispatcher,
    heartbeat: HeartbeatScheduler,
    update: Option<UpdateStreamer>,
    /// Latched once a restart has been requested.
    restart: Option<RestartReason>,
}

impl<L, S, I> ThingService<L, S, I>
where
    L: LinkPort,
    S: SessionPort,
    I: IndicatorPort,
{
    pub fn new(config: ThingConfig, link: L, session: S, indicator: I) -> Self {
        let heartbeat = HeartbeatScheduler::new(config.timing.heartbeat_interval_ms);
        info!(
            "Thing '{}' v{} ({})",
            config.identity.thing_name, config.identity.version, config.identity.thing_id
        );
        Self {
            supervisor: ConnectivitySupervisor::new(config, link, session, indicator),
            dispatcher: CommandDispatcher::new(),
            heartbeat,
            update: None,
            restart: None,
        }
    }

    // ── Application surface ───────────────────────────────────

    /// Register the handler for non-reserved commands, replacing any
    /// previous one.
    pub fn on_command(&mut self, handler: impl CommandHandler + 'static) {
        self.dispatcher.set_handler(handler);
    }

    pub fn clear_command_handler(&mut self) {
        self.dispatcher.clear_handler();
    }

    /// Publish an application payload on `subject`, QoS0, not retained.
    pub fn publish_data(&mut self, subject: &str, payload: &str) -> bool {
        self.supervisor.publish(subject, payload, false)
    }

    pub fn invert_indicator(&mut self) {
        self.supervisor.invert_indicator();
    }

    pub fn connected(&self) -> bool {
        self.supervisor.connected()
    }

    pub fn set_heartbeat_interval(&mut self, interval_ms: u32) {
        self.heartbeat.set_interval(interval_ms);
    }

    pub fn update_active(&self) -> bool {
        self.update.is_some()
    }

    pub fn update(&self) -> Option<&UpdateStreamer> {
        self.update.as_ref()
    }

    pub fn supervisor(&self) -> &ConnectivitySupervisor<L, S, I> {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut ConnectivitySupervisor<L, S, I> {
        &mut self.supervisor
    }

    pub fn heartbeat(&self) -> &HeartbeatScheduler {
        &self.heartbeat
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one host-loop step.
    ///
    /// The `hw` parameter satisfies **both** [`UpdateStoragePort`] and
    /// [`PlatformPort`], avoiding a double mutable borrow while keeping
    /// the port boundary explicit.
    pub fn tick(
        &mut self,
        now_ms: u64,
        hw: &mut (impl UpdateStoragePort + PlatformPort),
        sink: &mut impl EventSink,
    ) -> Tick {
        if let Some(reason) = self.restart {
            return Tick::Restart(reason);
        }

        if let Some(streamer) = self.update.as_mut() {
            return match streamer.step(now_ms, &mut self.supervisor, hw) {
                StreamStep::Pending => Tick::Pending,
                StreamStep::Restart(outcome) => {
                    sink.emit(&ThingEvent::UpdateFinished(outcome));
                    self.request_restart(RestartReason::UpdateFinished(outcome), sink)
                }
            };
        }

        match self.supervisor.maintain(now_ms, sink) {
            Tick::Ready => {}
            Tick::Pending => return Tick::Pending,
            Tick::Restart(reason) => return self.request_restart(reason, sink),
        }

        if let Some(tick) = self.handle_inbound(sink) {
            return tick;
        }

        self.beat(now_ms, &*hw, sink);
        Tick::Ready
    }

    fn handle_inbound(&mut self, sink: &mut impl EventSink) -> Option<Tick> {
        let inbound = self.supervisor.pump()?;

        if self.supervisor.topics().matches(&inbound.topic, topic::UPDATE) {
            let timing = self.supervisor.timing();
            self.update = Some(UpdateStreamer::announce(inbound.length, &timing));
            sink.emit(&ThingEvent::UpdateAnnounced {
                length: inbound.length,
            });
            return Some(Tick::Pending);
        }

        match self.dispatcher.dispatch(&mut self.supervisor, inbound.length) {
            Dispatch::Reset => Some(self.request_restart(RestartReason::ResetCommand, sink)),
            Dispatch::Forwarded(name) | Dispatch::Unhandled(name) => {
                sink.emit(&ThingEvent::CommandReceived { name });
                None
            }
            Dispatch::Dropped(e) => {
                sink.emit(&ThingEvent::CommandDropped(e));
                None
            }
        }
    }

    fn beat(&mut self, now_ms: u64, hw: &impl PlatformPort, sink: &mut impl EventSink) {
        let Some(sequence) = self.heartbeat.poll(now_ms, self.supervisor.connected()) else {
            return;
        };
        let counters = self.supervisor.counters();
        let msg = SystemMessage {
            sequence,
            rssi: self.supervisor.rssi().unwrap_or(0),
            memory: hw.free_heap(),
            wifi_disconnects: counters.link,
            mqtt_disconnects: counters.session,
        };
        if !self.supervisor.publish(topic::SYSTEM, &codec::encode(&msg), false) {
            warn!("Heartbeat #{} not delivered", sequence);
        }
        sink.emit(&ThingEvent::Heartbeat { sequence });
    }

    fn request_restart(&mut self, reason: RestartReason, sink: &mut impl EventSink) -> Tick {
        warn!("Restart requested: {:?}", reason);
        self.restart = Some(reason);
        sink.emit(&ThingEvent::RestartRequested(reason));
        Tick::Restart(reason)
    }
}
