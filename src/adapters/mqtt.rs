//! MQTT session adapter.
//!
//! Implements [`SessionPort`] (and its [`PayloadSource`]) on top of the
//! ESP-IDF MQTT client.
//!
//! ```text
//!  MQTT task (IDF)                         main loop
//!  ───────────────                         ─────────
//!  EspMqttEvent ──▶ on_event ──Frame──▶ sync_channel ──▶ poll() / read()
//!                     │
//!                     └──▶ Shared { connected, refused }
//! ```
//!
//! Large payloads (firmware images) arrive from the IDF client as an
//! initial chunk followed by continuation chunks.  `poll()` surfaces the
//! first chunk as an [`Inbound`] header carrying the full payload length;
//! `read()` then drains the chunks of that message.  Whatever the caller
//! leaves unread is discarded on the next `poll()`.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::mqtt::client::EspMqttClient`.
//!   Every `connect()` builds a fresh client so the supervisor alone
//!   decides when reconnects happen.
//! - **other targets**: an in-memory loopback broker for host tests.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{ConnectOptions, Inbound, PayloadSource, SessionPort};
use crate::error::SessionError;
use crate::topic::Qos;

// ───────────────────────────────────────────────────────────────
// Connect state codes (as reported by the classic Arduino client)
// ───────────────────────────────────────────────────────────────

pub const CONNECTION_TIMEOUT: i32 = -4;
pub const CONNECT_FAILED: i32 = -2;

/// Largest packet the session accepts for publish (topic + payload).
pub const MAX_PACKET_SIZE: usize = 1024;

// ───────────────────────────────────────────────────────────────
// Payload cursor (shared by both backends)
// ───────────────────────────────────────────────────────────────

/// Read position inside the current inbound message.
#[derive(Debug, Default)]
struct Cursor {
    chunk: Vec<u8>,
    pos: usize,
    /// Bytes of the message not yet handed to the caller.
    remaining: u32,
}

impl Cursor {
    fn start(&mut self, length: u32, first: Vec<u8>) {
        self.chunk = first;
        self.pos = 0;
        self.remaining = length;
    }

    fn clear(&mut self) {
        self.start(0, Vec::new());
    }

    fn buffered(&self) -> usize {
        self.chunk.len() - self.pos
    }

    fn copy_out(&mut self, buf: &mut [u8]) -> usize {
        let n = buf
            .len()
            .min(self.buffered())
            .min(self.remaining as usize);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        self.remaining -= n as u32;
        n
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod idf {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::SyncSender;

    use esp_idf_svc::mqtt::client::{Details, EspMqttEvent, EventPayload};
    use log::warn;

    /// Connection flags written by the MQTT task, read by the main loop.
    #[derive(Default)]
    pub(super) struct Shared {
        pub connected: AtomicBool,
        pub refused: AtomicBool,
    }

    pub(super) enum Frame {
        Start { topic: String, length: u32, data: Vec<u8> },
        Data(Vec<u8>),
    }

    pub(super) fn on_event(shared: &Arc<Shared>, tx: &SyncSender<Frame>, event: &EspMqttEvent<'_>) {
        match event.payload() {
            EventPayload::Connected(_) => shared.connected.store(true, Ordering::Release),
            EventPayload::Disconnected => {
                shared.connected.store(false, Ordering::Release);
                shared.refused.store(true, Ordering::Release);
            }
            EventPayload::Error(e) => {
                warn!("MQTT: client error {:?}", e);
                shared.refused.store(true, Ordering::Release);
            }
            EventPayload::Received {
                topic,
                data,
                details,
                ..
            } => {
                let frame = match details {
                    Details::Complete => Frame::Start {
                        topic: topic.unwrap_or_default().into(),
                        length: data.len() as u32,
                        data: data.to_vec(),
                    },
                    Details::InitialChunk(chunk) => Frame::Start {
                        topic: topic.unwrap_or_default().into(),
                        length: chunk.total_data_size as u32,
                        data: data.to_vec(),
                    },
                    Details::SubsequentChunk(_) => Frame::Data(data.to_vec()),
                };
                // Waits a bounded time while the main loop is behind.
                if !super::enqueue(tx, frame, super::READ_TIMEOUT_MS) {
                    warn!("MQTT: inbound dropped, reader gone or stalled");
                }
            }
            _ => {}
        }
    }
}

#[cfg(target_os = "espidf")]
const FRAME_QUEUE_DEPTH: usize = 8;
#[cfg(target_os = "espidf")]
const CONNECT_TIMEOUT_MS: u64 = 10_000;
#[cfg(target_os = "espidf")]
const CONNECT_POLL_MS: u64 = 50;
/// How long `read()` waits for the next chunk before reporting a stall.
#[cfg(target_os = "espidf")]
const READ_TIMEOUT_MS: u64 = 5_000;
#[cfg(any(target_os = "espidf", test))]
const ENQUEUE_POLL_MS: u64 = 10;

/// Hand `frame` to the reader, waiting at most `wait_ms` for queue space.
///
/// Returns `false` when the frame was dropped, either because the reader
/// is gone or because the queue stayed full. The MQTT task must never
/// block indefinitely: destroying the client waits for it.
#[cfg(any(target_os = "espidf", test))]
fn enqueue<T>(tx: &std::sync::mpsc::SyncSender<T>, mut frame: T, wait_ms: u64) -> bool {
    use std::sync::mpsc::TrySendError;

    let mut waited = 0;
    loop {
        match tx.try_send(frame) {
            Ok(()) => return true,
            Err(TrySendError::Disconnected(_)) => return false,
            Err(TrySendError::Full(back)) => {
                if waited >= wait_ms {
                    return false;
                }
                frame = back;
                std::thread::sleep(std::time::Duration::from_millis(ENQUEUE_POLL_MS));
                waited += ENQUEUE_POLL_MS;
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Loopback backend
// ───────────────────────────────────────────────────────────────

/// A message captured by the loopback broker.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub qos: Qos,
    pub retained: bool,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
struct Loopback {
    broker_up: bool,
    connected: bool,
    attempts: u32,
    last_client_id: String,
    last_will: Option<(String, String)>,
    published: Vec<Published>,
    subscriptions: Vec<(String, Qos)>,
    inbox: std::collections::VecDeque<(String, u32, Vec<u8>)>,
}

// ───────────────────────────────────────────────────────────────
// Session adapter
// ───────────────────────────────────────────────────────────────

pub struct MqttSession {
    cursor: Cursor,
    #[cfg(target_os = "espidf")]
    url: String,
    #[cfg(target_os = "espidf")]
    server_cert: Option<&'static [u8]>,
    #[cfg(target_os = "espidf")]
    client: Option<esp_idf_svc::mqtt::client::EspMqttClient<'static>>,
    #[cfg(target_os = "espidf")]
    shared: std::sync::Arc<idf::Shared>,
    #[cfg(target_os = "espidf")]
    frames: Option<std::sync::mpsc::Receiver<idf::Frame>>,
    #[cfg(target_os = "espidf")]
    lookahead: Option<idf::Frame>,
    #[cfg(not(target_os = "espidf"))]
    sim: Loopback,
}

impl MqttSession {
    /// `root_cert` is the PEM bundle used to verify the broker; empty
    /// means a plain TCP connection.
    #[cfg(target_os = "espidf")]
    pub fn new(host: &str, port: u16, root_cert: &str) -> Self {
        let scheme = if root_cert.is_empty() { "mqtt" } else { "mqtts" };
        let server_cert = (!root_cert.is_empty()).then(|| {
            // The IDF client keeps a pointer to the certificate for the
            // lifetime of the process.
            let mut pem = root_cert.as_bytes().to_vec();
            pem.push(0);
            &*Box::leak(pem.into_boxed_slice())
        });
        Self {
            cursor: Cursor::default(),
            url: format!("{scheme}://{host}:{port}"),
            server_cert,
            client: None,
            shared: std::sync::Arc::default(),
            frames: None,
            lookahead: None,
        }
    }

    /// In-memory broker that accepts connections.
    #[cfg(not(target_os = "espidf"))]
    pub fn loopback() -> Self {
        Self {
            cursor: Cursor::default(),
            sim: Loopback {
                broker_up: true,
                ..Loopback::default()
            },
        }
    }
}

// ── Loopback controls ─────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl MqttSession {
    /// While down, connects are refused and an open session is dropped.
    pub fn set_broker_up(&mut self, up: bool) {
        self.sim.broker_up = up;
        if !up {
            self.drop_connection();
        }
    }

    pub fn drop_connection(&mut self) {
        self.sim.connected = false;
        self.cursor.clear();
    }

    /// Queue a message for the subscriber.
    pub fn deliver(&mut self, topic: &str, payload: &[u8]) {
        self.deliver_partial(topic, payload.len() as u32, payload);
    }

    /// Queue a message whose announced length may exceed the bytes that
    /// actually arrive.
    pub fn deliver_partial(&mut self, topic: &str, length: u32, payload: &[u8]) {
        self.sim
            .inbox
            .push_back((topic.to_string(), length, payload.to_vec()));
    }

    pub fn published(&self) -> &[Published] {
        &self.sim.published
    }

    /// Payloads published on `topic`, oldest first.
    pub fn published_on(&self, topic: &str) -> Vec<String> {
        self.sim
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload.clone())
            .collect()
    }

    pub fn clear_published(&mut self) {
        self.sim.published.clear();
    }

    pub fn subscriptions(&self) -> &[(String, Qos)] {
        &self.sim.subscriptions
    }

    pub fn connect_attempts(&self) -> u32 {
        self.sim.attempts
    }

    pub fn last_client_id(&self) -> &str {
        &self.sim.last_client_id
    }

    /// `(topic, payload)` of the last-will registered by the last connect.
    pub fn last_will(&self) -> Option<&(String, String)> {
        self.sim.last_will.as_ref()
    }

    pub fn pending_inbound(&self) -> usize {
        self.sim.inbox.len()
    }
}

// ── SessionPort implementation (ESP-IDF) ──────────────────────

#[cfg(target_os = "espidf")]
impl MqttSession {
    fn qos(qos: Qos) -> esp_idf_svc::mqtt::client::QoS {
        match qos {
            Qos::AtMostOnce => esp_idf_svc::mqtt::client::QoS::AtMostOnce,
            Qos::AtLeastOnce => esp_idf_svc::mqtt::client::QoS::AtLeastOnce,
        }
    }

    /// Wait for the broker's answer to the CONNECT packet.
    fn await_connected(shared: &idf::Shared) -> Result<(), SessionError> {
        use std::sync::atomic::Ordering;

        let mut waited = 0;
        while !shared.connected.load(Ordering::Acquire) {
            if shared.refused.load(Ordering::Acquire) {
                return Err(SessionError::new(CONNECT_FAILED));
            }
            if waited >= CONNECT_TIMEOUT_MS {
                return Err(SessionError::new(CONNECTION_TIMEOUT));
            }
            std::thread::sleep(std::time::Duration::from_millis(CONNECT_POLL_MS));
            waited += CONNECT_POLL_MS;
        }
        Ok(())
    }

    fn next_frame(&mut self, wait_ms: u64) -> Option<idf::Frame> {
        if let Some(frame) = self.lookahead.take() {
            return Some(frame);
        }
        let frames = self.frames.as_ref()?;
        if wait_ms == 0 {
            frames.try_recv().ok()
        } else {
            frames
                .recv_timeout(std::time::Duration::from_millis(wait_ms))
                .ok()
        }
    }
}

#[cfg(target_os = "espidf")]
impl PayloadSource for MqttSession {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        loop {
            if self.cursor.remaining == 0 {
                return 0;
            }
            if self.cursor.buffered() > 0 {
                return self.cursor.copy_out(buf);
            }
            match self.next_frame(READ_TIMEOUT_MS) {
                Some(idf::Frame::Data(data)) => {
                    self.cursor.chunk = data;
                    self.cursor.pos = 0;
                }
                Some(next @ idf::Frame::Start { .. }) => {
                    self.lookahead = Some(next);
                    return 0;
                }
                None => return 0,
            }
        }
    }
}

#[cfg(target_os = "espidf")]
impl SessionPort for MqttSession {
    fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), SessionError> {
        use esp_idf_svc::mqtt::client::{EspMqttClient, LwtConfiguration, MqttClientConfiguration};
        use esp_idf_svc::tls::X509;
        use std::sync::Arc;

        // Receiver first, so a callback waiting on a full queue fails
        // fast. Dropping the old client then stops and destroys it.
        self.frames = None;
        self.lookahead = None;
        self.cursor.clear();
        self.client = None;

        let shared = Arc::new(idf::Shared::default());
        let (tx, rx) = std::sync::mpsc::sync_channel(FRAME_QUEUE_DEPTH);
        let conf = MqttClientConfiguration {
            client_id: Some(options.client_id),
            username: (!options.username.is_empty()).then_some(options.username),
            password: (!options.password.is_empty()).then_some(options.password),
            lwt: Some(LwtConfiguration {
                topic: options.will.topic,
                payload: options.will.payload.as_bytes(),
                qos: Self::qos(options.will.qos),
                retain: options.will.retained,
            }),
            server_certificate: self.server_cert.map(X509::pem_until_nul),
            buffer_size: MAX_PACKET_SIZE,
            ..Default::default()
        };

        let cb_shared = Arc::clone(&shared);
        let client = EspMqttClient::new_cb(&self.url, &conf, move |event| {
            idf::on_event(&cb_shared, &tx, &event);
        })
        .map_err(|e| {
            warn!("MQTT: client init failed: {:?}", e);
            SessionError::new(CONNECT_FAILED)
        })?;

        if let Err(e) = Self::await_connected(&shared) {
            drop(rx);
            drop(client);
            return Err(e);
        }

        info!("MQTT: session open to {}", self.url);
        self.client = Some(client);
        self.shared = shared;
        self.frames = Some(rx);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_some() && self.shared.connected.load(std::sync::atomic::Ordering::Acquire)
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, retained: bool) -> bool {
        if topic.len() + payload.len() > MAX_PACKET_SIZE {
            return false;
        }
        let Some(client) = self.client.as_mut() else {
            return false;
        };
        client
            .publish(topic, Self::qos(qos), retained, payload)
            .inspect_err(|e| warn!("MQTT: publish failed: {:?}", e))
            .is_ok()
    }

    fn subscribe(&mut self, topic: &str, qos: Qos) -> bool {
        let Some(client) = self.client.as_mut() else {
            return false;
        };
        client
            .subscribe(topic, Self::qos(qos))
            .inspect_err(|e| warn!("MQTT: subscribe failed: {:?}", e))
            .is_ok()
    }

    fn poll(&mut self) -> Option<Inbound> {
        loop {
            match self.next_frame(0)? {
                idf::Frame::Start {
                    topic,
                    length,
                    data,
                } => {
                    self.cursor.start(length, data);
                    return Some(Inbound { topic, length });
                }
                // Tail of a message the caller did not consume.
                idf::Frame::Data(_) => {}
            }
        }
    }
}

// ── SessionPort implementation (loopback) ─────────────────────

#[cfg(not(target_os = "espidf"))]
impl PayloadSource for MqttSession {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.cursor.copy_out(buf)
    }
}

#[cfg(not(target_os = "espidf"))]
impl SessionPort for MqttSession {
    fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), SessionError> {
        self.sim.attempts += 1;
        self.sim.last_client_id = options.client_id.to_string();
        self.sim.last_will = Some((
            options.will.topic.to_string(),
            options.will.payload.to_string(),
        ));
        if !self.sim.broker_up {
            return Err(SessionError::new(CONNECT_FAILED));
        }
        info!("MQTT(sim): '{}' connected", options.client_id);
        self.sim.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.sim.connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, retained: bool) -> bool {
        if !self.sim.connected || topic.len() + payload.len() > MAX_PACKET_SIZE {
            return false;
        }
        self.sim.published.push(Published {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            qos,
            retained,
        });
        true
    }

    fn subscribe(&mut self, topic: &str, qos: Qos) -> bool {
        if !self.sim.connected {
            return false;
        }
        self.sim.subscriptions.push((topic.to_string(), qos));
        true
    }

    fn poll(&mut self) -> Option<Inbound> {
        if !self.sim.connected {
            return None;
        }
        let (topic, length, data) = self.sim.inbox.pop_front()?;
        self.cursor.start(length, data);
        Some(Inbound { topic, length })
    }
}
