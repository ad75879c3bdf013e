//! Assembly of the full hardware rig from plain pin/bus numbers, so callers
//! never have to touch rppal types directly.

use std::time::Duration;

use rppal::gpio::Gpio;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use crate::ads1263::Ads1263;
use crate::error::{HwError, Result};
use crate::outputs::{GpioOutputs, OutputPins};
use crate::pot::SpiPot;
use crate::power::SystemPower;

#[derive(Debug, Clone, Copy)]
pub struct HardwareRigCfg {
    pub pot_bus: u8,
    pub pot_slave: u8,
    pub pot_clock_hz: u32,
    pub adc_bus: u8,
    pub adc_slave: u8,
    pub adc_clock_hz: u32,
    pub adc_drdy: u8,
    pub adc_rst: u8,
    pub drdy_timeout_ms: u64,
    pub pins: OutputPins,
}

fn bus(n: u8) -> Result<Bus> {
    match n {
        0 => Ok(Bus::Spi0),
        1 => Ok(Bus::Spi1),
        2 => Ok(Bus::Spi2),
        other => Err(HwError::Spi(format!("unknown SPI bus {other}"))),
    }
}

fn slave(n: u8) -> Result<SlaveSelect> {
    match n {
        0 => Ok(SlaveSelect::Ss0),
        1 => Ok(SlaveSelect::Ss1),
        2 => Ok(SlaveSelect::Ss2),
        other => Err(HwError::Spi(format!("unknown SPI slave select {other}"))),
    }
}

/// Open every peripheral of the rig. Fails as a whole if any part is
/// unreachable; nothing is energized by merely opening handles.
pub fn open_rig(cfg: HardwareRigCfg) -> Result<(Ads1263, SpiPot, GpioOutputs, SystemPower)> {
    let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;

    let adc_spi = Spi::new(
        bus(cfg.adc_bus)?,
        slave(cfg.adc_slave)?,
        cfg.adc_clock_hz,
        Mode::Mode1,
    )
    .map_err(|e| HwError::Spi(format!("open adc spi: {e}")))?;
    let drdy = gpio
        .get(cfg.adc_drdy)
        .map_err(|e| HwError::Gpio(format!("drdy pin {}: {e}", cfg.adc_drdy)))?
        .into_input_pullup();
    let rst = gpio
        .get(cfg.adc_rst)
        .map_err(|e| HwError::Gpio(format!("rst pin {}: {e}", cfg.adc_rst)))?
        .into_output_high();
    let adc = Ads1263::new(adc_spi, drdy, rst, Duration::from_millis(cfg.drdy_timeout_ms))?;

    let pot_spi = Spi::new(
        bus(cfg.pot_bus)?,
        slave(cfg.pot_slave)?,
        cfg.pot_clock_hz,
        Mode::Mode0,
    )
    .map_err(|e| HwError::Spi(format!("open pot spi: {e}")))?;
    let pot = SpiPot::new(pot_spi);

    let outputs = GpioOutputs::new(cfg.pins)?;

    Ok((adc, pot, outputs, SystemPower))
}
