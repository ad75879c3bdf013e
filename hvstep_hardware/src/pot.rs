//! SPI backend for the digital potentiometer.

use rppal::spi::Spi;
use tracing::trace;

use crate::error::HwError;
use hvstep_traits::PotBus;

/// Write-only potentiometer bus on its own chip-enable line.
///
/// The device latches the wiper only after both bytes of a transfer have
/// clocked in, so a single `write` of the full frame is the atomicity
/// guarantee the controller relies on.
pub struct SpiPot {
    spi: Spi,
}

impl SpiPot {
    pub fn new(spi: Spi) -> Self {
        Self { spi }
    }
}

impl PotBus for SpiPot {
    fn transfer(&mut self, frame: [u8; 2]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.spi
            .write(&frame)
            .map_err(|e| Box::new(HwError::Spi(e.to_string())) as _)?;
        trace!(msb = frame[0], lsb = frame[1], "pot transfer");
        Ok(())
    }
}
