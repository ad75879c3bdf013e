//! Register-level driver for the ADS1263-class acquisition HAT.
//!
//! One `acquire` pass scans every input channel against AINCOM and returns
//! the full frame, or fails as a whole: a checksum mismatch or a
//! conversion-ready timeout on any channel invalidates the entire frame.

use std::time::{Duration, Instant};

use rppal::gpio::{InputPin, OutputPin};
use rppal::spi::Spi;
use tracing::trace;

use crate::error::{HwError, Result};
use hvstep_traits::{ADC_CHANNEL_COUNT, AdcBank, RawFrame};

// Command opcodes
const CMD_RESET: u8 = 0x06;
const CMD_START1: u8 = 0x08;
const CMD_STOP1: u8 = 0x0A;
const CMD_RDATA1: u8 = 0x12;
const CMD_WREG: u8 = 0x40;

// Register addresses
const REG_MODE2: u8 = 0x05;
const REG_INPMUX: u8 = 0x06;
const REG_REFMUX: u8 = 0x0F;

// Configuration values: gain 1, 400 SPS, internal 2.5 V reference bypassed
// in favour of the 5 V supply reference pair.
const MODE2_GAIN1_400SPS: u8 = 0x86;
const REFMUX_SUPPLY: u8 = 0x24;

// Negative mux input fixed to AINCOM for single-ended scanning.
const INPMUX_AINCOM: u8 = 0x0A;

// Data frame: status byte, four data bytes, checksum byte.
const FRAME_LEN: usize = 6;
const CHECKSUM_SEED: u8 = 0x9B;

pub struct Ads1263 {
    spi: Spi,
    drdy: InputPin,
    rst: OutputPin,
    drdy_timeout: Duration,
}

impl Ads1263 {
    pub fn new(spi: Spi, drdy: InputPin, mut rst: OutputPin, drdy_timeout: Duration) -> Result<Self> {
        rst.set_high();
        let mut adc = Self {
            spi,
            drdy,
            rst,
            drdy_timeout,
        };
        adc.reset()?;
        adc.write_reg(REG_MODE2, MODE2_GAIN1_400SPS)?;
        adc.write_reg(REG_REFMUX, REFMUX_SUPPLY)?;
        Ok(adc)
    }

    fn reset(&mut self) -> Result<()> {
        self.rst.set_low();
        std::thread::sleep(Duration::from_millis(10));
        self.rst.set_high();
        std::thread::sleep(Duration::from_millis(10));
        self.command(CMD_RESET)
    }

    fn command(&mut self, op: u8) -> Result<()> {
        self.spi
            .write(&[op])
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(())
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<()> {
        // WREG: opcode | address, then (count - 1), then data.
        self.spi
            .write(&[CMD_WREG | reg, 0x00, value])
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(())
    }

    fn wait_conversion_ready(&self) -> Result<()> {
        let deadline = Instant::now() + self.drdy_timeout;
        while self.drdy.is_high() {
            if Instant::now() >= deadline {
                return Err(HwError::ConversionTimeout);
            }
            std::thread::sleep(Duration::from_micros(200));
        }
        Ok(())
    }

    /// Read one conversion for `channel` against AINCOM.
    fn read_channel(&mut self, channel: u8) -> Result<u32> {
        self.write_reg(REG_INPMUX, (channel << 4) | INPMUX_AINCOM)?;
        self.command(CMD_START1)?;
        self.wait_conversion_ready()?;
        self.command(CMD_STOP1)?;

        let tx = [CMD_RDATA1, 0, 0, 0, 0, 0, 0];
        let mut rx = [0u8; FRAME_LEN + 1];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| HwError::Spi(e.to_string()))?;

        // rx[0] is the byte clocked while sending the opcode; the frame
        // starts at rx[1]: status, data[4], checksum.
        let data = [rx[2], rx[3], rx[4], rx[5]];
        let checksum = rx[6];
        let expected = data
            .iter()
            .fold(CHECKSUM_SEED, |acc, b| acc.wrapping_add(*b));
        if checksum != expected {
            return Err(HwError::BadFrame("checksum mismatch"));
        }

        let code = u32::from_be_bytes(data);
        trace!(channel, code, "adc conversion");
        Ok(code)
    }
}

impl AdcBank for Ads1263 {
    fn acquire(&mut self) -> std::result::Result<RawFrame, Box<dyn std::error::Error + Send + Sync>> {
        let mut frame: RawFrame = [0; ADC_CHANNEL_COUNT];
        for (ch, slot) in frame.iter_mut().enumerate() {
            *slot = self.read_channel(ch as u8)?;
        }
        Ok(frame)
    }
}
