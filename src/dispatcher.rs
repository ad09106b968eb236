//! Command dispatcher.
//!
//! Reads an inbound command payload in full, decodes it and routes it:
//! the reserved `reset` command is answered with a restart request and
//! never reaches the application; every other command goes to the single
//! registered [`CommandHandler`].

use log::{info, warn};

use crate::app::ports::{CommandHandler, PayloadSource};
use crate::codec;
use crate::error::ParseError;

/// Name of the command that restarts the device.
pub const RESET_COMMAND: &str = "reset";

/// Largest command payload accepted.  Longer ones are drained and dropped.
pub const MAX_COMMAND_LEN: u32 = 4096;

/// What happened to one inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Delivered to the registered handler.
    Forwarded(String),
    /// Well-formed, but no handler is registered.
    Unhandled(String),
    /// Could not be decoded; nothing else happened.
    Dropped(ParseError),
    /// The reserved reset command.
    Reset,
}

#[derive(Default)]
pub struct CommandDispatcher {
    handler: Option<Box<dyn CommandHandler>>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the application handler, replacing any previous one.
    pub fn set_handler(&mut self, handler: impl CommandHandler + 'static) {
        if self.handler.replace(Box::new(handler)).is_some() {
            info!("Command handler replaced");
        }
    }

    pub fn clear_handler(&mut self) {
        self.handler = None;
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Read `length` payload bytes from `source` and act on them.
    pub fn dispatch(&mut self, source: &mut impl PayloadSource, length: u32) -> Dispatch {
        let payload = match read_payload(source, length) {
            Ok(p) => p,
            Err(e) => {
                warn!("Dropped command: {}", e);
                return Dispatch::Dropped(e);
            }
        };

        let command = match codec::parse_command(&payload) {
            Ok(c) => c,
            Err(e) => {
                warn!("Unable to parse command: {}", e);
                return Dispatch::Dropped(e);
            }
        };

        if command.name == RESET_COMMAND {
            info!("Reset command received");
            return Dispatch::Reset;
        }

        match self.handler.as_mut() {
            Some(handler) => {
                info!("Command: {}", command.name);
                handler.on_command(&command.name, &command.fields);
                Dispatch::Forwarded(command.name)
            }
            None => {
                info!("No handler for command: {}", command.name);
                Dispatch::Unhandled(command.name)
            }
        }
    }
}

fn read_payload(source: &mut impl PayloadSource, length: u32) -> Result<Vec<u8>, ParseError> {
    if length > MAX_COMMAND_LEN {
        drain(source, length);
        return Err(ParseError::TooLarge);
    }
    let mut payload = vec![0u8; length as usize];
    let mut filled = 0;
    while filled < payload.len() {
        let n = source.read(&mut payload[filled..]);
        if n == 0 {
            return Err(ParseError::Truncated);
        }
        filled += n;
    }
    Ok(payload)
}

fn drain(source: &mut impl PayloadSource, length: u32) {
    let mut scratch = [0u8; 256];
    let mut left = length as usize;
    while left > 0 {
        let want = left.min(scratch.len());
        let n = source.read(&mut scratch[..want]);
        if n == 0 {
            break;
        }
        left -= n.min(left);
    }
}
