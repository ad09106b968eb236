//! Integration tests for firmware updates streamed over the session.

use crate::mock_hw::{Device, config, topic};

use internet_thing::adapters::hardware::HardwareAdapter;
use internet_thing::adapters::ota_storage::OtaPartitionStorage;
use internet_thing::adapters::platform::Platform;
use internet_thing::app::events::{RestartReason, ThingEvent, Tick};
use internet_thing::app::ports::UpdateStoragePort;
use internet_thing::error::StorageError;
use internet_thing::ota::{UpdateOutcome, UpdateState};
use serde_json::{Map, Value};

fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Tick every 100 ms until the device asks for a restart.
fn run_to_restart(dev: &mut Device) -> RestartReason {
    for _ in 0..10_000 {
        dev.now += 100;
        if let Tick::Restart(reason) = dev.tick() {
            return reason;
        }
    }
    panic!("update never finished");
}

fn reads(upto: u32) -> impl Iterator<Item = String> {
    (1..=upto / 100).map(|k| format!("Read {} bytes.", k * 100))
}

// ── Scenario E: successful update ─────────────────────────────

#[test]
fn full_image_is_written_and_reported() {
    let mut dev = Device::with_defaults();
    dev.bring_up();
    let firmware = image(1000);
    dev.deliver("update", &firmware);

    assert_eq!(dev.tick(), Tick::Pending);
    assert!(dev.service.update_active());
    assert!(dev.sink.events.contains(&ThingEvent::UpdateAnnounced { length: 1000 }));

    let reason = run_to_restart(&mut dev);

    assert_eq!(reason, RestartReason::UpdateFinished(UpdateOutcome::Applied));
    assert_eq!(dev.hw.storage.image(), firmware.as_slice());

    let mut expected = vec!["Updating. New firmware size is 1000 bytes.".to_string()];
    expected.extend(reads(1000));
    expected.push("Update successful.".into());
    expected.push("Restarting.".into());
    assert_eq!(dev.progress(), expected);

    let session = dev.session();
    let progress_topic = topic("update/progress");
    assert!(
        session
            .published()
            .iter()
            .filter(|p| p.topic == progress_topic)
            .all(|p| !p.retained)
    );
}

#[test]
fn restart_waits_for_the_final_report_delay() {
    let mut dev = Device::with_defaults();
    dev.bring_up();
    dev.deliver("update", &image(20));

    // announce, reserve, write, finalize
    for _ in 0..4 {
        assert_eq!(dev.tick(), Tick::Pending);
    }
    assert!(matches!(
        dev.service.update().map(|u| u.state()),
        Some(UpdateState::Rebooting { since_ms: 0, .. })
    ));
    assert_eq!(dev.tick_at(999), Tick::Pending);
    assert_eq!(
        dev.tick_at(1_000),
        Tick::Restart(RestartReason::UpdateFinished(UpdateOutcome::Applied))
    );
}

// ── Scenario D: image larger than the slot ────────────────────

#[test]
fn oversized_image_reports_no_space_and_restarts() {
    let mut dev = Device::with_defaults();
    dev.hw = HardwareAdapter::new(OtaPartitionStorage::with_capacity(50), Platform::new());
    dev.bring_up();
    dev.deliver("update", &image(100));

    let reason = run_to_restart(&mut dev);

    assert_eq!(reason, RestartReason::UpdateFinished(UpdateOutcome::NoSpace));
    assert_eq!(dev.progress(), ["Not enough space to update.", "Restarting."]);
    assert_eq!(dev.service.update().unwrap().session().bytes_consumed, 0);
    assert!(dev.hw.storage.image().is_empty());
}

// ── Incomplete and failed updates ─────────────────────────────

#[test]
fn short_stream_ends_not_finished() {
    let mut dev = Device::with_defaults();
    dev.bring_up();
    dev.session()
        .deliver_partial(&topic("update"), 1000, &image(450));

    let reason = run_to_restart(&mut dev);

    assert_eq!(reason, RestartReason::UpdateFinished(UpdateOutcome::NotFinished));
    let mut expected = vec!["Updating. New firmware size is 1000 bytes.".to_string()];
    expected.extend(reads(400));
    expected.push("Update not finished.".into());
    expected.push("Restarting.".into());
    assert_eq!(dev.progress(), expected);
    assert!(!dev.hw.storage.is_finished());
}

#[test]
fn commit_failure_reports_error_code() {
    let mut dev = Device::with_defaults();
    dev.hw.storage.fail_commit_with(StorageError::VERIFY);
    dev.bring_up();
    dev.deliver("update", &image(300));

    let reason = run_to_restart(&mut dev);

    assert_eq!(
        reason,
        RestartReason::UpdateFinished(UpdateOutcome::CommitFailed(StorageError::VERIFY))
    );
    let progress = dev.progress();
    assert_eq!(progress[progress.len() - 2], "Error occurred, #: 3.");
    assert!(
        dev.sink
            .events
            .contains(&ThingEvent::UpdateFinished(UpdateOutcome::CommitFailed(
                StorageError::VERIFY
            )))
    );
}

#[test]
fn session_loss_mid_stream_ends_not_finished() {
    let mut cfg = config();
    cfg.timing.stream_chunk_size = 100;
    let mut dev = Device::new(cfg);
    dev.bring_up();
    dev.deliver("update", &image(1000));

    // announce, reserve, two chunks
    for _ in 0..4 {
        dev.tick();
    }
    dev.session().drop_connection();

    let reason = run_to_restart(&mut dev);

    assert_eq!(reason, RestartReason::UpdateFinished(UpdateOutcome::NotFinished));
    assert_eq!(dev.hw.storage.bytes_written(), 200);
    assert_eq!(dev.session().connect_attempts(), 1, "no reconnect during an update");
}

// ── Exclusivity ───────────────────────────────────────────────

#[test]
fn update_suspends_commands_and_heartbeats() {
    let mut cfg = config();
    cfg.timing.stream_chunk_size = 10;
    let mut dev = Device::new(cfg);
    let handled = std::rc::Rc::new(std::cell::Cell::new(0));
    let count = std::rc::Rc::clone(&handled);
    dev.service
        .on_command(move |_: &str, _: &Map<String, Value>| count.set(count.get() + 1));
    dev.bring_up();

    dev.deliver("update", &image(1000));
    dev.deliver("command", br#"{"name":"ping"}"#);

    // 100 chunks at one tick per second spans several heartbeat intervals.
    let mut reason = None;
    for _ in 0..200 {
        dev.now += 1_000;
        if let Tick::Restart(r) = dev.tick() {
            reason = Some(r);
            break;
        }
    }

    assert_eq!(
        reason,
        Some(RestartReason::UpdateFinished(UpdateOutcome::Applied))
    );
    assert_eq!(dev.heartbeats(), [0]);
    assert_eq!(handled.get(), 0);
    assert_eq!(dev.session().pending_inbound(), 1);
}
