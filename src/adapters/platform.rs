//! Platform adapter: free heap for the heartbeat, and the device restart.
//!
//! - **`target_os = "espidf"`**: `esp_get_free_heap_size()` / `esp_ota::restart()`.
//! - **other targets**: a settable heap figure; restart panics, since a
//!   host process has nothing to reboot into.

use log::info;

use crate::app::ports::PlatformPort;

pub struct Platform {
    #[cfg(not(target_os = "espidf"))]
    free_heap: u32,
}

impl Default for Platform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            free_heap: 200 * 1024,
        }
    }

    /// Soft-reset the chip.
    #[cfg(target_os = "espidf")]
    pub fn restart(&self) -> ! {
        info!("Restarting.");
        esp_ota::restart();
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn restart(&self) -> ! {
        info!("Restarting (simulation).");
        panic!("device restart (simulation, no hardware reset)");
    }
}

#[cfg(not(target_os = "espidf"))]
impl Platform {
    pub fn set_free_heap(&mut self, bytes: u32) {
        self.free_heap = bytes;
    }
}

impl PlatformPort for Platform {
    #[cfg(target_os = "espidf")]
    fn free_heap(&self) -> u32 {
        // SAFETY: read-only query of the heap allocator statistics.
        unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
    }

    #[cfg(not(target_os = "espidf"))]
    fn free_heap(&self) -> u32 {
        self.free_heap
    }
}
