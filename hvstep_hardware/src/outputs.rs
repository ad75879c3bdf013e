//! GPIO backend for the rig's digital output lines.

use rppal::gpio::{Gpio, OutputPin};

use crate::error::{HwError, Result};
use hvstep_traits::{DigitalOutputs, Line};

/// BCM pin assignments for the output lines.
#[derive(Debug, Clone, Copy)]
pub struct OutputPins {
    pub amp_enable: u8,
    pub amp_led: u8,
    pub battery_led: u8,
    pub range_a: u8,
    pub range_b: u8,
}

pub struct GpioOutputs {
    amp_enable: OutputPin,
    amp_led: OutputPin,
    battery_led: OutputPin,
    range_a: OutputPin,
    range_b: OutputPin,
}

impl GpioOutputs {
    pub fn new(pins: OutputPins) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut claim = |bcm: u8| -> Result<OutputPin> {
            Ok(gpio
                .get(bcm)
                .map_err(|e| HwError::Gpio(format!("pin {bcm}: {e}")))?
                .into_output_low())
        };
        Ok(Self {
            amp_enable: claim(pins.amp_enable)?,
            amp_led: claim(pins.amp_led)?,
            battery_led: claim(pins.battery_led)?,
            range_a: claim(pins.range_a)?,
            range_b: claim(pins.range_b)?,
        })
    }

    fn pin_mut(&mut self, line: Line) -> &mut OutputPin {
        match line {
            Line::AmpEnable => &mut self.amp_enable,
            Line::AmpLed => &mut self.amp_led,
            Line::BatteryLed => &mut self.battery_led,
            Line::RangeA => &mut self.range_a,
            Line::RangeB => &mut self.range_b,
        }
    }
}

impl DigitalOutputs for GpioOutputs {
    fn set_line(
        &mut self,
        line: Line,
        high: bool,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let pin = self.pin_mut(line);
        if high {
            pin.set_high();
        } else {
            pin.set_low();
        }
        Ok(())
    }
}
