//! Heartbeat scheduler.
//!
//! ```text
//!   tick ──▶ connected? ──no──▶ (nothing; timer untouched)
//!               │ yes
//!               ▼
//!     now - last_beat >= interval? ──no──▶ (nothing)
//!               │ yes
//!               ▼
//!     emit sequence n, last_beat = now, n += 1
//! ```
//!
//! The first heartbeat after boot is due on the first connected tick.
//! The sequence counter only ever grows; it restarts at 0 with the process.

use log::debug;

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct HeartbeatScheduler {
    interval_ms: u32,
    /// Clock value of the last heartbeat, `None` before the first one.
    last_beat_at: Option<u64>,
    sequence: u64,
}

impl HeartbeatScheduler {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_beat_at: None,
            sequence: 0,
        }
    }

    /// Returns the sequence number to publish when a heartbeat is due.
    pub fn poll(&mut self, now_ms: u64, connected: bool) -> Option<u64> {
        if !connected {
            return None;
        }
        let due = self
            .last_beat_at
            .is_none_or(|at| now_ms.saturating_sub(at) >= u64::from(self.interval_ms));
        if !due {
            return None;
        }

        let seq = self.sequence;
        self.sequence += 1;
        self.last_beat_at = Some(now_ms);
        debug!("Heartbeat #{} due at {} ms", seq, now_ms);
        Some(seq)
    }

    /// Change the interval.  Takes effect from the last heartbeat.
    pub fn set_interval(&mut self, interval_ms: u32) {
        self.interval_ms = interval_ms;
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Next sequence value to be emitted.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
