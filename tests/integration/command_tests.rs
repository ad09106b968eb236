//! Integration tests for inbound command handling.

use std::cell::RefCell;
use std::rc::Rc;

use crate::mock_hw::Device;

use internet_thing::app::events::{RestartReason, ThingEvent, Tick};
use internet_thing::error::ParseError;
use serde_json::{Map, Value, json};

type Calls = Rc<RefCell<Vec<(String, Value)>>>;

/// Online device whose handler records every call.
fn recording_device() -> (Device, Calls) {
    let mut dev = Device::with_defaults();
    let calls: Calls = Rc::default();
    let seen = Rc::clone(&calls);
    dev.service
        .on_command(move |name: &str, fields: &Map<String, Value>| {
            seen.borrow_mut()
                .push((name.to_string(), Value::Object(fields.clone())));
        });
    dev.bring_up();
    (dev, calls)
}

// ── Scenario B: application command ───────────────────────────

#[test]
fn application_command_reaches_handler_with_fields() {
    let (mut dev, calls) = recording_device();
    dev.deliver(
        "command",
        br#"{"name":"setTelemetryInterval","telemetryInterval":15000}"#,
    );

    assert_eq!(dev.tick(), Tick::Ready);
    assert_eq!(
        *calls.borrow(),
        [(
            "setTelemetryInterval".to_string(),
            json!({"telemetryInterval": 15000})
        )]
    );
    assert!(dev.sink.events.contains(&ThingEvent::CommandReceived {
        name: "setTelemetryInterval".into()
    }));
    assert!(
        !dev.sink
            .events
            .iter()
            .any(|e| matches!(e, ThingEvent::RestartRequested(_)))
    );
}

// ── Scenario C: reset ─────────────────────────────────────────

#[test]
fn reset_restarts_without_calling_handler() {
    let (mut dev, calls) = recording_device();
    dev.deliver("command", br#"{"name":"reset"}"#);

    assert_eq!(dev.tick(), Tick::Restart(RestartReason::ResetCommand));
    assert!(calls.borrow().is_empty());
    assert!(
        dev.sink
            .events
            .contains(&ThingEvent::RestartRequested(RestartReason::ResetCommand))
    );
}

#[test]
fn reset_works_without_a_handler() {
    let mut dev = Device::with_defaults();
    dev.bring_up();
    dev.deliver("command", br#"{"name":"reset","delay":5}"#);
    assert_eq!(dev.tick(), Tick::Restart(RestartReason::ResetCommand));
}

// ── Malformed and unhandled commands ──────────────────────────

#[test]
fn malformed_payloads_are_dropped_and_service_continues() {
    let (mut dev, calls) = recording_device();
    let cases: [(&[u8], ParseError); 3] = [
        (b"{not json", ParseError::Malformed),
        (b"[1,2,3]", ParseError::NotAnObject),
        (br#"{"telemetryInterval":1}"#, ParseError::MissingName),
    ];

    for (payload, expected) in cases {
        dev.deliver("command", payload);
        assert_eq!(dev.tick(), Tick::Ready);
        assert!(dev.sink.events.contains(&ThingEvent::CommandDropped(expected)));
    }
    assert!(calls.borrow().is_empty());

    dev.deliver("command", br#"{"name":"ping"}"#);
    dev.tick();
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn oversized_command_is_dropped() {
    let (mut dev, calls) = recording_device();
    let mut payload = br#"{"name":"blob","data":""#.to_vec();
    payload.extend(std::iter::repeat_n(b'a', 5000));
    payload.extend_from_slice(br#""}"#);
    dev.deliver("command", &payload);

    assert_eq!(dev.tick(), Tick::Ready);
    assert!(
        dev.sink
            .events
            .contains(&ThingEvent::CommandDropped(ParseError::TooLarge))
    );
    assert!(calls.borrow().is_empty());
}

#[test]
fn truncated_command_is_dropped() {
    let (mut dev, calls) = recording_device();
    dev.session()
        .deliver_partial(&crate::mock_hw::topic("command"), 40, br#"{"name":"ping"}"#);

    dev.tick();
    assert!(
        dev.sink
            .events
            .contains(&ThingEvent::CommandDropped(ParseError::Truncated))
    );
    assert!(calls.borrow().is_empty());
}

#[test]
fn command_without_handler_is_acknowledged_only() {
    let mut dev = Device::with_defaults();
    dev.bring_up();
    dev.deliver("command", br#"{"name":"ping"}"#);

    assert_eq!(dev.tick(), Tick::Ready);
    assert!(dev.sink.events.contains(&ThingEvent::CommandReceived {
        name: "ping".into()
    }));
}

#[test]
fn replaced_handler_receives_later_commands() {
    let (mut dev, first) = recording_device();
    let second: Calls = Rc::default();
    let seen = Rc::clone(&second);
    dev.service
        .on_command(move |name: &str, fields: &Map<String, Value>| {
            seen.borrow_mut()
                .push((name.to_string(), Value::Object(fields.clone())));
        });

    dev.deliver("command", br#"{"name":"ping"}"#);
    dev.tick();
    assert!(first.borrow().is_empty());
    assert_eq!(second.borrow().len(), 1);

    dev.service.clear_command_handler();
    dev.deliver("command", br#"{"name":"ping"}"#);
    dev.tick();
    assert_eq!(second.borrow().len(), 1);
}

// ── Ordering ──────────────────────────────────────────────────

#[test]
fn one_inbound_message_per_tick() {
    let (mut dev, calls) = recording_device();
    dev.deliver("command", br#"{"name":"first"}"#);
    dev.deliver("command", br#"{"name":"second"}"#);

    dev.tick();
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(dev.session().pending_inbound(), 1);

    dev.tick();
    let names: Vec<_> = calls.borrow().iter().map(|(n, _)| n.clone()).collect();
    assert_eq!(names, ["first", "second"]);
}
