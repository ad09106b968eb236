//! Fuzz target: command decoding and dispatch
//!
//! Drives arbitrary bytes through `parse_command` and through the
//! dispatcher with an arbitrary announced length.  Neither may panic, and
//! the reserved reset command must never reach the handler.
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use internet_thing::codec::parse_command;
use internet_thing::dispatcher::{CommandDispatcher, Dispatch, RESET_COMMAND};
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value};

fuzz_target!(|data: &[u8]| {
    if let Ok(cmd) = parse_command(data) {
        assert!(!cmd.fields.contains_key("name"), "name must be split out");
    }

    // First two bytes pick the announced length, the rest is the wire.
    let (announced, mut wire) = match data {
        [hi, lo, rest @ ..] => (u32::from(u16::from_be_bytes([*hi, *lo])), rest),
        _ => (data.len() as u32, data),
    };

    let mut dispatcher = CommandDispatcher::new();
    dispatcher.set_handler(|name: &str, _: &Map<String, Value>| {
        assert_ne!(name, RESET_COMMAND, "reset leaked to the handler");
    });
    match dispatcher.dispatch(&mut wire, announced) {
        Dispatch::Forwarded(name) => assert_ne!(name, RESET_COMMAND),
        Dispatch::Reset | Dispatch::Dropped(_) => {}
        Dispatch::Unhandled(_) => panic!("handler was registered"),
    }
});
