//! Topic namespace.
//!
//! Every channel this thing touches lives under
//! `<topic_base>/<thing_id>/<subject>`:
//!
//! | Subject            | Direction | QoS | Retained |
//! |--------------------|-----------|-----|----------|
//! | `status`           | publish   | 1   | yes (also last-will) |
//! | `telemetry/system` | publish   | 0   | no       |
//! | `command`          | subscribe | 1   | –        |
//! | `update`           | subscribe | 0   | –        |
//! | `update/progress`  | publish   | 0   | no       |

use crate::config::DeviceIdentity;

pub const STATUS: &str = "status";
pub const SYSTEM: &str = "telemetry/system";
pub const COMMAND: &str = "command";
pub const UPDATE: &str = "update";
pub const UPDATE_PROGRESS: &str = "update/progress";

/// Delivery-assurance level for publish/subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Qos {
    AtMostOnce = 0,
    AtLeastOnce = 1,
}

/// QoS for a published subject. Only the online status goes out at
/// least once.
pub fn publish_qos(subject: &str) -> Qos {
    if subject == STATUS {
        Qos::AtLeastOnce
    } else {
        Qos::AtMostOnce
    }
}

/// Maps subjects onto fully-qualified topic names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNamespace {
    prefix: String,
}

impl TopicNamespace {
    pub fn new(topic_base: &str, thing_id: &str) -> Self {
        let mut prefix = String::with_capacity(topic_base.len() + thing_id.len() + 2);
        prefix.push_str(topic_base);
        prefix.push('/');
        prefix.push_str(thing_id);
        prefix.push('/');
        Self { prefix }
    }

    pub fn from_identity(identity: &DeviceIdentity) -> Self {
        Self::new(&identity.topic_base, &identity.thing_id)
    }

    pub fn create_topic(&self, subject: &str) -> String {
        let mut topic = String::with_capacity(self.prefix.len() + subject.len());
        topic.push_str(&self.prefix);
        topic.push_str(subject);
        topic
    }

    /// True when `topic` is exactly `create_topic(subject)`.
    pub fn matches(&self, topic: &str, subject: &str) -> bool {
        topic
            .strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest == subject)
    }
}
