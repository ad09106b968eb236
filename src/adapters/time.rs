//! Monotonic millisecond clock.
//!
//! Every timer in the core (reconnect cooldown, link ceiling, heartbeat,
//! reboot pause) is measured against the value passed into
//! [`ThingService::tick`](crate::app::service::ThingService::tick); this
//! adapter is where the host loop gets it from.
//!
//! - **`target_os = "espidf"`**: `esp_timer_get_time()`, microseconds
//!   since boot.
//! - **other targets**: `std::time::Instant` taken at construction.

pub struct MonotonicClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since boot.
    #[cfg(target_os = "espidf")]
    pub fn now_ms(&self) -> u64 {
        // SAFETY: reads the high-resolution timer, no preconditions.
        let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
        u64::try_from(us).unwrap_or(0) / 1_000
    }

    /// Milliseconds since the clock was created.
    #[cfg(not(target_os = "espidf"))]
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
