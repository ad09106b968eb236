//! Integration tests for link/session supervision and the heartbeat.

use crate::mock_hw::{Device, config, topic};

use internet_thing::adapters::mqtt::CONNECT_FAILED;
use internet_thing::app::events::{RestartReason, ThingEvent, Tick};
use internet_thing::connectivity::ConnectionState;
use serde_json::json;

// ── Scenario A: heartbeat cadence after session establishment ─

#[test]
fn first_heartbeat_is_sequence_zero_then_one_after_interval() {
    let mut cfg = config();
    cfg.timing.reconnect_cooldown_ms = 10_000;
    cfg.timing.heartbeat_interval_ms = 60_000;
    let mut dev = Device::new(cfg);

    dev.bring_up();
    assert_eq!(dev.run(59_999, 1_000), None);
    assert_eq!(dev.heartbeats(), [0], "exactly one heartbeat in the first minute");

    dev.tick_at(60_000);
    assert_eq!(dev.heartbeats(), [0, 1]);
}

#[test]
fn system_message_carries_link_and_platform_readings() {
    let mut dev = Device::with_defaults();
    dev.hw.platform.set_free_heap(123_456);
    dev.link().set_rssi(-71);
    dev.bring_up();

    let beats = dev.published("telemetry/system");
    assert_eq!(
        beats,
        [json!({"sequence": 0, "rssi": -71, "memory": 123_456,
                "wifiDisconnects": 0, "mqttDisconnects": 0})]
    );
}

#[test]
fn nothing_is_published_before_the_session_is_up() {
    let mut dev = Device::with_defaults();
    dev.session().set_broker_up(false);
    dev.run(30_000, 1_000);
    assert!(dev.session().published().is_empty());
    assert!(!dev.service.connected());
}

// ── Session establishment ─────────────────────────────────────

#[test]
fn session_up_registers_will_announces_online_and_subscribes() {
    let mut dev = Device::with_defaults();
    dev.bring_up();

    let session = dev.session();
    assert_eq!(session.last_client_id(), "ssb1");
    assert_eq!(
        session.last_will(),
        Some(&(topic("status"), r#"{"online":false}"#.to_string()))
    );

    let status = session
        .published()
        .iter()
        .find(|p| p.topic == topic("status"))
        .cloned()
        .unwrap();
    assert!(status.retained);
    assert_eq!(status.qos as u8, 1);
    let body: serde_json::Value = serde_json::from_str(&status.payload).unwrap();
    assert_eq!(
        body,
        json!({"online": true, "name": "An example of a simple sensor box",
               "version": "0.0.1", "mac": "DE:AD:BE:EF:CA:FE", "ip": "192.168.1.50"})
    );

    let subs: Vec<_> = session.subscriptions().iter().map(|(t, q)| (t.clone(), *q as u8)).collect();
    assert_eq!(subs, [(topic("command"), 1), (topic("update"), 0)]);
}

#[test]
fn only_the_online_status_is_published_at_least_once() {
    let mut dev = Device::with_defaults();
    dev.bring_up();
    dev.run(60_000, 1_000);

    let session = dev.session();
    assert!(session.published().iter().any(|p| p.topic == topic("telemetry/system")));
    for p in session.published() {
        let expected = if p.topic == topic("status") { 1 } else { 0 };
        assert_eq!(p.qos as u8, expected, "{}", p.topic);
    }
}

#[test]
fn refused_broker_is_retried_no_faster_than_cooldown() {
    let mut dev = Device::with_defaults();
    dev.session().set_broker_up(false);
    dev.tick_at(0);
    dev.tick_at(0);
    assert_eq!(dev.session().connect_attempts(), 1);

    dev.run(20_000, 500);
    assert_eq!(dev.session().connect_attempts(), 5, "0, 5, 10, 15 and 20 s");
    let refusals = dev
        .sink
        .events
        .iter()
        .filter(|e| **e == ThingEvent::SessionRefused { code: CONNECT_FAILED })
        .count();
    assert_eq!(refusals, 5);
    assert_eq!(dev.service.supervisor().state(), ConnectionState::LinkUp);

    dev.session().set_broker_up(true);
    dev.run(25_000, 500);
    assert!(dev.service.connected());
    assert_eq!(dev.session().connect_attempts(), 6);
}

#[test]
fn dropped_session_reconnects_and_is_counted() {
    let mut dev = Device::with_defaults();
    dev.bring_up();

    dev.session().drop_connection();
    assert_eq!(dev.tick_at(1_000), Tick::Pending, "cooldown since the first connect");
    assert!(dev.sink.events.contains(&ThingEvent::SessionLost));

    assert_eq!(dev.tick_at(5_000), Tick::Ready);
    assert_eq!(dev.published("status").len(), 2, "online announced again");

    dev.tick_at(60_000);
    let beats = dev.published("telemetry/system");
    assert_eq!(beats[1]["sequence"], 1);
    assert_eq!(beats[1]["mqttDisconnects"], 1);
    assert_eq!(beats[1]["wifiDisconnects"], 0);
}

#[test]
fn lost_link_is_counted_and_recovered() {
    let mut dev = Device::with_defaults();
    dev.bring_up();

    dev.link().set_up(false);
    dev.session().drop_connection();
    dev.tick_at(10_000);
    assert!(dev.sink.events.contains(&ThingEvent::LinkLost));
    assert_eq!(dev.link().reconnects(), 2);

    assert_eq!(dev.tick_at(10_100), Tick::Ready);
    assert!(dev.sink.events.contains(&ThingEvent::LinkRestored { waited_ms: 100 }));
    assert_eq!(dev.service.supervisor().counters().link, 1);
}

// ── Link ceiling ──────────────────────────────────────────────

#[test]
fn link_down_for_five_minutes_restarts() {
    let mut dev = Device::with_defaults();
    dev.link().set_heals(false);

    assert_eq!(dev.tick_at(0), Tick::Pending);
    assert_eq!(dev.run(299_999, 10_000), None);

    let restart = Tick::Restart(RestartReason::LinkTimeout);
    assert_eq!(dev.tick_at(300_000), restart);
    assert_eq!(dev.tick_at(300_010), restart, "restart stays latched");
    assert_eq!(dev.session().connect_attempts(), 0);
}

#[test]
fn access_point_returning_mid_outage_is_rejoined() {
    let mut dev = Device::with_defaults();
    dev.link().set_heals(false);
    assert_eq!(dev.tick_at(0), Tick::Pending);
    assert_eq!(dev.link().reconnects(), 1);

    // The access point comes back; only a fresh attempt can notice.
    dev.link().set_heals(true);
    assert_eq!(dev.run(60_000, 1_000), None);

    assert!(dev.service.connected());
    assert_eq!(dev.link().reconnects(), 2);
    assert!(dev.sink.events.contains(&ThingEvent::LinkRestored { waited_ms: 6_000 }));
}

// ── Indicator ─────────────────────────────────────────────────

#[test]
fn indicator_lights_only_while_disconnected() {
    let mut dev = Device::with_defaults();
    dev.session().set_broker_up(false);
    dev.tick_at(0);
    assert!(dev.service.supervisor().indicator().pin().is_high());

    dev.session().set_broker_up(true);
    dev.tick_at(5_000);
    assert!(dev.service.connected());
    assert!(!dev.service.supervisor().indicator().pin().is_high());

    dev.service.invert_indicator();
    assert!(
        dev.service.supervisor().indicator().pin().is_high(),
        "inverted polarity drives the pin high when off"
    );
}
