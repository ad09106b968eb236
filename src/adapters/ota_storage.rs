//! Firmware partition storage, backed by the `esp-ota` crate.
//!
//! Implements [`UpdateStoragePort`] over the inactive OTA slot:
//! `begin` opens the partition, `write` appends, `end` verifies the image
//! and marks it as the boot partition.  On simulation targets the image
//! is kept in memory.
//!
//! Declared sizes of zero, or above the slot capacity, fail reservation.
//! Committing fewer bytes than declared aborts the transaction and
//! leaves the running firmware as the boot image; `is_finished()` then
//! reports false.

use log::{info, warn};

use crate::app::ports::UpdateStoragePort;
use crate::error::StorageError;

/// Slot size assumed when the partition table cannot be queried.
pub const DEFAULT_CAPACITY: u32 = 4 * 1024 * 1024;

pub struct OtaPartitionStorage {
    capacity: u32,
    expected: u32,
    written: u32,
    open: bool,
    finished: bool,
    #[cfg(target_os = "espidf")]
    update: Option<esp_ota::OtaUpdate>,
    #[cfg(not(target_os = "espidf"))]
    image: Vec<u8>,
    #[cfg(not(target_os = "espidf"))]
    commit_error: Option<StorageError>,
}

impl OtaPartitionStorage {
    /// Capacity taken from the next update partition.
    #[cfg(target_os = "espidf")]
    pub fn new() -> Self {
        // SAFETY: a null start partition asks IDF for the next slot after
        // the running one. The result is either null or points into the
        // static partition table, so `as_ref` yields a valid reference.
        let part = unsafe {
            esp_idf_svc::sys::esp_ota_get_next_update_partition(core::ptr::null()).as_ref()
        };
        let capacity = match part {
            Some(part) => part.size,
            None => {
                warn!("OTA: no update partition found");
                0
            }
        };
        info!("OTA: update slot holds {} bytes", capacity);
        Self::with_capacity(capacity)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            capacity,
            expected: 0,
            written: 0,
            open: false,
            finished: false,
            #[cfg(target_os = "espidf")]
            update: None,
            #[cfg(not(target_os = "espidf"))]
            image: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            commit_error: None,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn bytes_written(&self) -> u32 {
        self.written
    }

    fn abort(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // esp-ota aborts when the OtaUpdate is dropped
            self.update.take();
        }
        self.open = false;
    }
}

impl Default for OtaPartitionStorage {
    fn default() -> Self {
        Self::new()
    }
}

// ── Simulation controls ───────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl OtaPartitionStorage {
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Make the next commit fail with `err`.
    pub fn fail_commit_with(&mut self, err: StorageError) {
        self.commit_error = Some(err);
    }
}

// ── UpdateStoragePort implementation ──────────────────────────

impl UpdateStoragePort for OtaPartitionStorage {
    fn begin(&mut self, size: u32) -> Result<(), StorageError> {
        if self.open {
            warn!("OTA: discarding unfinished transaction");
            self.abort();
        }
        if size == 0 || size > self.capacity {
            warn!("OTA: {} bytes does not fit a {} byte slot", size, self.capacity);
            return Err(StorageError::NO_SPACE);
        }

        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {:?}", e);
                StorageError::NO_SPACE
            })?;
            self.update = Some(update);
        }
        #[cfg(not(target_os = "espidf"))]
        self.image.clear();

        self.expected = size;
        self.written = 0;
        self.open = true;
        self.finished = false;
        info!("OTA: begin ({} bytes)", size);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> usize {
        if !self.open {
            return 0;
        }
        let room = (self.expected - self.written) as usize;
        let data = &data[..data.len().min(room)];

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.update.as_mut() else {
                return 0;
            };
            if let Err(e) = update.write(data) {
                warn!("esp-ota write failed: {:?}", e);
                self.abort();
                return 0;
            }
        }
        #[cfg(not(target_os = "espidf"))]
        self.image.extend_from_slice(data);

        self.written += data.len() as u32;
        data.len()
    }

    fn end(&mut self) -> Result<(), StorageError> {
        if !self.open {
            return Err(StorageError::NOT_STARTED);
        }
        if self.written < self.expected {
            warn!("OTA: only {} of {} bytes received", self.written, self.expected);
            self.abort();
            return Ok(());
        }
        self.open = false;

        #[cfg(target_os = "espidf")]
        {
            let update = self.update.take().ok_or(StorageError::NOT_STARTED)?;
            let mut completed = update.finalize().map_err(|e| {
                warn!("esp-ota finalize failed: {:?}", e);
                StorageError::VERIFY
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("esp-ota set_as_boot_partition failed: {:?}", e);
                StorageError::ACTIVATE
            })?;
        }
        #[cfg(not(target_os = "espidf"))]
        if let Some(e) = self.commit_error.take() {
            return Err(e);
        }

        self.finished = true;
        info!("OTA: image committed");
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running firmware valid so the bootloader does not roll back.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("OTA rollback check (simulation): skipped");
}
