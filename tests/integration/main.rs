//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one flow of the thing
//! against simulated adapters.  All tests run on the host (x86_64) with
//! no real hardware required.

mod command_tests;
mod connectivity_tests;
mod mock_hw;
mod ota_flow_tests;
