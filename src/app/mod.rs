//! Application core — connectivity, dispatch and update orchestration.
//!
//! All interaction with the radio, the broker client and flash happens
//! through **port traits** defined in [`ports`], keeping this layer fully
//! testable without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
