//! OTA update streamer.
//!
//! A new firmware image arrives as the payload of a message on the
//! `update` subject.  The announced payload length is the firmware size;
//! the bytes follow on the same session and are pulled in chunks, one
//! chunk per host-loop step.
//!
//! ```text
//!  Announced ──reserve ok──▶ Writing ──done / short read──▶ Finalizing
//!      │                                                        │
//!      └──reserve failed──┐                       commit ok/err │
//!                         ▼                                     ▼
//!                     Rebooting ◀───────────────────────────────┘
//!                         │ restart_delay_ms elapsed
//!                         ▼
//!                  StreamStep::Restart(outcome)
//! ```
//!
//! Every branch ends in a restart: a partially written image is only
//! ever resolved by rebooting.

use log::{info, warn};

use crate::app::ports::{PayloadSource, Publisher, UpdateStoragePort};
use crate::codec::{self, ProgressMessage};
use crate::config::Timing;
use crate::error::StorageError;
use crate::topic;

/// How an update ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Committed and reported complete.
    Applied,
    /// Committed but the storage reports the image incomplete.
    NotFinished,
    /// The storage rejected the commit.
    CommitFailed(StorageError),
    /// Capacity for the announced length could not be reserved.
    NoSpace,
}

/// Bookkeeping for the transfer in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSession {
    pub expected_length: u32,
    pub bytes_consumed: u32,
    /// Highest decile boundary already reported.
    pub last_progress_threshold: u32,
    pub transaction_open: bool,
}

impl UpdateSession {
    fn new(expected_length: u32) -> Self {
        Self {
            expected_length,
            bytes_consumed: 0,
            last_progress_threshold: 0,
            transaction_open: false,
        }
    }

    fn remaining(&self) -> u32 {
        self.expected_length - self.bytes_consumed
    }

    /// Next decile boundary not yet reported, if it has been reached.
    fn next_threshold(&mut self) -> Option<u32> {
        let tenth = self.expected_length / 10;
        if tenth == 0 || self.last_progress_threshold >= tenth * 10 {
            return None;
        }
        let next = self.last_progress_threshold + tenth;
        (next <= self.bytes_consumed).then(|| {
            self.last_progress_threshold = next;
            next
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Announced,
    Writing,
    Finalizing,
    Rebooting { since_ms: u64, outcome: UpdateOutcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStep {
    Pending,
    Restart(UpdateOutcome),
}

pub struct UpdateStreamer {
    session: UpdateSession,
    state: UpdateState,
    chunk: Vec<u8>,
    restart_delay_ms: u32,
}

impl UpdateStreamer {
    pub fn announce(length: u32, timing: &Timing) -> Self {
        info!("Update announced, {} bytes", length);
        let chunk_len = usize::from(timing.stream_chunk_size.max(1));
        Self {
            session: UpdateSession::new(length),
            state: UpdateState::Announced,
            chunk: vec![0; chunk_len],
            restart_delay_ms: timing.restart_delay_ms,
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn session(&self) -> &UpdateSession {
        &self.session
    }

    /// Advance by one state action.
    pub fn step<IO, St>(&mut self, now_ms: u64, io: &mut IO, storage: &mut St) -> StreamStep
    where
        IO: Publisher + PayloadSource,
        St: UpdateStoragePort,
    {
        match self.state {
            UpdateState::Announced => self.reserve(now_ms, io, storage),
            UpdateState::Writing => self.write_chunk(io, storage),
            UpdateState::Finalizing => self.finalize(now_ms, io, storage),
            UpdateState::Rebooting { since_ms, outcome } => {
                let waited = now_ms.saturating_sub(since_ms);
                if waited >= u64::from(self.restart_delay_ms) {
                    return StreamStep::Restart(outcome);
                }
            }
        }
        StreamStep::Pending
    }

    fn reserve(&mut self, now_ms: u64, io: &mut impl Publisher, storage: &mut impl UpdateStoragePort) {
        let length = self.session.expected_length;
        if let Err(e) = storage.begin(length) {
            warn!("Reservation of {} bytes failed: {}", length, e);
            progress(io, "Not enough space to update.");
            self.reboot(now_ms, io, UpdateOutcome::NoSpace);
            return;
        }
        self.session.transaction_open = true;
        progress(io, &format!("Updating. New firmware size is {length} bytes."));
        self.state = UpdateState::Writing;
    }

    fn write_chunk<IO, St>(&mut self, io: &mut IO, storage: &mut St)
    where
        IO: Publisher + PayloadSource,
        St: UpdateStoragePort,
    {
        let want = self.chunk.len().min(self.session.remaining() as usize);
        if want == 0 {
            self.state = UpdateState::Finalizing;
            return;
        }

        let buf = &mut self.chunk[..want];
        let read = io.read(buf).min(want);
        if read == 0 {
            warn!(
                "Stream stalled at {} of {} bytes",
                self.session.bytes_consumed, self.session.expected_length
            );
            self.state = UpdateState::Finalizing;
            return;
        }

        let written = storage.write(&buf[..read]);
        // read <= remaining() <= u32::MAX
        self.session.bytes_consumed += read as u32;

        while let Some(threshold) = self.session.next_threshold() {
            progress(io, &format!("Read {threshold} bytes."));
        }

        if written < read {
            warn!("Storage accepted {} of {} bytes", written, read);
            self.state = UpdateState::Finalizing;
        } else if self.session.remaining() == 0 {
            self.state = UpdateState::Finalizing;
        }
    }

    fn finalize(&mut self, now_ms: u64, io: &mut impl Publisher, storage: &mut impl UpdateStoragePort) {
        self.session.transaction_open = false;
        let outcome = match storage.end() {
            Ok(()) if storage.is_finished() => {
                progress(io, "Update successful.");
                UpdateOutcome::Applied
            }
            Ok(()) => {
                progress(io, "Update not finished.");
                UpdateOutcome::NotFinished
            }
            Err(e) => {
                progress(io, &format!("Error occurred, #: {}.", e.code));
                UpdateOutcome::CommitFailed(e)
            }
        };
        self.reboot(now_ms, io, outcome);
    }

    fn reboot(&mut self, now_ms: u64, io: &mut impl Publisher, outcome: UpdateOutcome) {
        progress(io, "Restarting.");
        self.state = UpdateState::Rebooting {
            since_ms: now_ms,
            outcome,
        };
    }
}

fn progress(io: &mut impl Publisher, text: &str) {
    info!("{}", text);
    let payload = codec::encode(&ProgressMessage { message: text });
    io.publish(topic::UPDATE_PROGRESS, &payload, false);
}
