//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured thing events to the
//! ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::ThingEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`ThingEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &ThingEvent) {
        match event {
            ThingEvent::LinkLost => warn!("CONN | link lost"),
            ThingEvent::LinkRestored { waited_ms } => {
                info!("CONN | link restored after {} ms", waited_ms);
            }
            ThingEvent::SessionEstablished => info!("CONN | session established"),
            ThingEvent::SessionLost => warn!("CONN | session lost"),
            ThingEvent::SessionRefused { code } => {
                warn!("CONN | session refused, state={}", code);
            }
            ThingEvent::CommandReceived { name } => info!("CMD | {}", name),
            ThingEvent::CommandDropped(e) => warn!("CMD | dropped: {}", e),
            ThingEvent::Heartbeat { sequence } => info!("BEAT | #{}", sequence),
            ThingEvent::UpdateAnnounced { length } => {
                info!("OTA | announced, {} bytes", length);
            }
            ThingEvent::UpdateFinished(outcome) => info!("OTA | finished: {:?}", outcome),
            ThingEvent::RestartRequested(reason) => warn!("RESTART | {:?}", reason),
        }
    }
}
