//! Hardware adapter: bridges the on-chip services the core needs per tick.
//!
//! Owns the OTA partition storage and the platform adapter, exposing them
//! through [`UpdateStoragePort`] and [`PlatformPort`] so the service can
//! take both behind one `&mut` without a double borrow.

use crate::app::ports::{PlatformPort, UpdateStoragePort};
use crate::error::StorageError;

use super::ota_storage::OtaPartitionStorage;
use super::platform::Platform;

/// Concrete adapter that combines storage and platform behind port traits.
pub struct HardwareAdapter {
    pub storage: OtaPartitionStorage,
    pub platform: Platform,
}

impl HardwareAdapter {
    pub fn new(storage: OtaPartitionStorage, platform: Platform) -> Self {
        Self { storage, platform }
    }
}

// ── UpdateStoragePort implementation ──────────────────────────

impl UpdateStoragePort for HardwareAdapter {
    fn begin(&mut self, size: u32) -> Result<(), StorageError> {
        self.storage.begin(size)
    }

    fn write(&mut self, data: &[u8]) -> usize {
        self.storage.write(data)
    }

    fn end(&mut self) -> Result<(), StorageError> {
        self.storage.end()
    }

    fn is_finished(&self) -> bool {
        self.storage.is_finished()
    }
}

// ── PlatformPort implementation ───────────────────────────────

impl PlatformPort for HardwareAdapter {
    fn free_heap(&self) -> u32 {
        self.platform.free_heap()
    }
}
