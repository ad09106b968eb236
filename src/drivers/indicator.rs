//! "Not connected" indicator driver.
//!
//! A single GPIO driven through the `embedded-hal` [`OutputPin`] trait,
//! so the same driver runs on an `esp_idf_hal::gpio::PinDriver` and on a
//! host [`SimPin`].  Polarity is decided by the connectivity supervisor;
//! this driver only applies the electrical level.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};
use log::warn;

use crate::app::ports::IndicatorPort;

pub struct IndicatorLed<P> {
    pin: P,
    level: Option<bool>,
}

impl<P: OutputPin> IndicatorLed<P> {
    pub fn new(pin: P) -> Self {
        Self { pin, level: None }
    }

    /// Last level written, `None` before the first write.
    pub fn level(&self) -> Option<bool> {
        self.level
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }
}

impl<P: OutputPin> IndicatorPort for IndicatorLed<P> {
    fn set_level(&mut self, high: bool) {
        if self.level == Some(high) {
            return;
        }
        let res = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match res {
            Ok(()) => self.level = Some(high),
            Err(e) => warn!("Indicator: pin write failed: {:?}", e),
        }
    }
}

// ── Simulation pin ────────────────────────────────────────────

/// In-memory output pin that counts edges.
#[derive(Debug, Default)]
pub struct SimPin {
    high: bool,
    writes: u32,
}

impl SimPin {
    pub fn is_high(&self) -> bool {
        self.high
    }

    pub fn writes(&self) -> u32 {
        self.writes
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.writes += 1;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.writes += 1;
        Ok(())
    }
}
