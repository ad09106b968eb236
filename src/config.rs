//! Device configuration.
//!
//! Everything the thing needs is supplied once at construction and never
//! mutated afterwards: identity, network credentials, indicator output
//! and timing.  The device binary fills this from build-time values; the
//! serde derives allow provisioning it as JSON.

use serde::{Deserialize, Serialize};

use crate::error::LinkError;

/// Immutable identity of this thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Prefix of every topic, e.g. `somebuilding/someroom`.
    pub topic_base: String,
    /// Unique id; also used as the broker client id.
    pub thing_id: String,
    /// Human-readable name reported in the online status.
    pub thing_name: String,
    /// Firmware version reported in the online status.
    pub version: String,
}

/// Link and broker credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCredentials {
    pub ssid: String,
    pub password: String,
    pub broker_host: String,
    pub broker_port: u16,
    /// PEM root certificate used to verify the broker.
    pub root_cert: String,
    pub broker_username: String,
    pub broker_password: String,
}

// Secrets stay out of the logs.
impl core::fmt::Debug for NetworkCredentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NetworkCredentials")
            .field("ssid", &self.ssid)
            .field("broker_host", &self.broker_host)
            .field("broker_port", &self.broker_port)
            .field("broker_username", &self.broker_username)
            .finish_non_exhaustive()
    }
}

/// Loop timing parameters, all in milliseconds unless noted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    /// Minimum spacing between broker connect attempts.
    pub reconnect_cooldown_ms: u32,
    /// Spacing between heartbeat (system) messages.
    pub heartbeat_interval_ms: u32,
    /// How long the link may stay down before the device restarts.
    pub link_timeout_ms: u32,
    /// Pause between the final OTA progress message and the restart.
    pub restart_delay_ms: u32,
    /// Bytes read from the session per OTA streaming step.
    pub stream_chunk_size: u16,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            reconnect_cooldown_ms: 5_000,
            heartbeat_interval_ms: 60_000,
            link_timeout_ms: 5 * 60 * 1000,
            restart_delay_ms: 1_000,
            stream_chunk_size: 512,
        }
    }
}

/// Complete configuration of a thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingConfig {
    pub identity: DeviceIdentity,
    pub credentials: NetworkCredentials,
    /// GPIO number of the "not connected" indicator.
    pub indicator_pin: u8,
    /// Indicator lights when driven low.
    #[serde(default)]
    pub indicator_active_low: bool,
    #[serde(default)]
    pub timing: Timing,
}

impl ThingConfig {
    /// Check every field against the rules the network stack imposes.
    pub fn validate(&self) -> Result<(), &'static str> {
        let id = &self.identity;
        if id.topic_base.is_empty() {
            return Err("topic base is empty");
        }
        if id.topic_base.ends_with('/') || id.topic_base.contains(['+', '#']) {
            return Err("topic base must not end in '/' or contain wildcards");
        }
        if id.thing_id.is_empty() {
            return Err("thing id is empty");
        }
        if id.thing_id.contains(['/', '+', '#']) {
            return Err("thing id must not contain '/', '+' or '#'");
        }

        let creds = &self.credentials;
        validate_ssid(&creds.ssid).map_err(|_| "SSID invalid")?;
        validate_password(&creds.password).map_err(|_| "WiFi password invalid")?;
        if creds.broker_host.is_empty() {
            return Err("broker host is empty");
        }
        if creds.broker_port == 0 {
            return Err("broker port is zero");
        }

        let t = &self.timing;
        if !(1_000..=60_000).contains(&t.reconnect_cooldown_ms) {
            return Err("reconnect cooldown outside 1..60 s");
        }
        if t.heartbeat_interval_ms == 0 {
            return Err("heartbeat interval is zero");
        }
        if t.stream_chunk_size == 0 {
            return Err("stream chunk size is zero");
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Credential validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

pub fn validate_ssid(ssid: &str) -> Result<(), LinkError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(LinkError::InvalidSsid);
    }
    Ok(())
}

/// Empty means an open network; otherwise WPA2 length rules apply.
pub fn validate_password(password: &str) -> Result<(), LinkError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(LinkError::InvalidPassword);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn sample() -> ThingConfig {
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
