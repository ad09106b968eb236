//! Port traits — the hexagonal boundary between the thing core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ThingService (domain)
//! ```
//!
//! Driven adapters (WiFi, MQTT client, OTA partition, platform, event
//! sinks) implement these traits.  The core consumes them via generics,
//! so it never touches the network stack or flash directly and every
//! flow can be driven by mock adapters on the host.

use core::net::Ipv4Addr;

use serde_json::{Map, Value};

use crate::error::{SessionError, StorageError};
use crate::topic::Qos;

// ───────────────────────────────────────────────────────────────
// Link port (wireless network)
// ───────────────────────────────────────────────────────────────

pub type MacAddress = [u8; 6];

pub trait LinkPort {
    /// Kick off a (re)association.  Must not block; progress is
    /// observed through [`is_connected`](Self::is_connected).
    fn reconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Signal strength in dBm while associated.
    fn rssi(&self) -> Option<i8>;

    fn mac_address(&self) -> MacAddress;

    fn local_ip(&self) -> Option<Ipv4Addr>;
}

// ───────────────────────────────────────────────────────────────
// Session port (broker connection)
// ───────────────────────────────────────────────────────────────

/// Message the broker publishes for us if we vanish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastWill<'a> {
    pub topic: &'a str,
    pub payload: &'a str,
    pub qos: Qos,
    pub retained: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub will: LastWill<'a>,
}

/// Header of an inbound message.  The payload itself is pulled from
/// the session with [`PayloadSource::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub topic: String,
    pub length: u32,
}

/// Incremental reader over the payload of the current inbound message.
pub trait PayloadSource {
    /// Copy up to `buf.len()` bytes.  Returns 0 when the source has no
    /// more data for the current message or stalled.
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

impl PayloadSource for &[u8] {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len());
        buf[..n].copy_from_slice(&self[..n]);
        *self = &self[n..];
        n
    }
}

pub trait SessionPort: PayloadSource {
    fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), SessionError>;

    fn is_connected(&self) -> bool;

    /// Fails when disconnected or when `topic` and `payload` together
    /// exceed the packet limit.
    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, retained: bool) -> bool;

    fn subscribe(&mut self, topic: &str, qos: Qos) -> bool;

    /// Service the connection and return the next inbound message, if any.
    fn poll(&mut self) -> Option<Inbound>;
}

// ───────────────────────────────────────────────────────────────
// Publisher (subject-level publish used by the core)
// ───────────────────────────────────────────────────────────────

/// Publish on a subject of this thing's namespace.
pub trait Publisher {
    fn publish(&mut self, subject: &str, payload: &str, retained: bool) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Update storage port (firmware partition)
// ───────────────────────────────────────────────────────────────

/// Transactional writer for a new firmware image.
pub trait UpdateStoragePort {
    /// Reserve room for `size` bytes and open the transaction.
    fn begin(&mut self, size: u32) -> Result<(), StorageError>;

    /// Append to the open transaction.  Returns the bytes accepted.
    fn write(&mut self, data: &[u8]) -> usize;

    /// Commit the transaction.
    fn end(&mut self) -> Result<(), StorageError>;

    /// Whether the committed image is complete and will boot.
    fn is_finished(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Platform and indicator ports
// ───────────────────────────────────────────────────────────────

pub trait PlatformPort {
    fn free_heap(&self) -> u32;
}

/// Raw electrical output of the "not connected" indicator.
pub trait IndicatorPort {
    fn set_level(&mut self, high: bool);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / diagnostics)
// ───────────────────────────────────────────────────────────────

pub trait EventSink {
    fn emit(&mut self, event: &super::events::ThingEvent);
}

// ───────────────────────────────────────────────────────────────
// Command handler (application callback)
// ───────────────────────────────────────────────────────────────

/// Receives every non-reserved command.
pub trait CommandHandler {
    fn on_command(&mut self, name: &str, fields: &Map<String, Value>);
}

impl<F> CommandHandler for F
where
    F: FnMut(&str, &Map<String, Value>),
{
    fn on_command(&mut self, name: &str, fields: &Map<String, Value>) {
        self(name, fields);
    }
}
