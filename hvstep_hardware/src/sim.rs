//! Simulated rig for development and tests.
//!
//! One `SimulatedRig` owns the shared state; `adc()`, `pot()`, `outputs()`
//! and `power()` hand out handles implementing the hardware traits against
//! that state. The electrical model is deliberately coarse: outputs scale
//! linearly with wiper position while the amplifier is enabled, and the
//! battery sits wherever a test puts it.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use hvstep_traits::{ADC_CHANNEL_COUNT, AdcBank, DigitalOutputs, HostPower, Line, PotBus, RawFrame};

const SIGN_BIT: u32 = 0x8000_0000;
const POSITIVE_FULL_SCALE: f64 = 0x7FFF_FFFFu32 as f64;
const NEGATIVE_FULL_SCALE: f64 = 2_147_483_648.0; // 2^31

/// Device-side mapping from a pin voltage to the sign-magnitude code the
/// ADC would report. Voltages above the reference use the sign-bit branch.
pub fn encode_voltage(v: f64, vref: f64) -> u32 {
    let v = v.clamp(0.0, 2.0 * vref);
    if v <= vref {
        ((v / vref) * POSITIVE_FULL_SCALE).round() as u32
    } else {
        // Magnitude saturates below 2^31 so rounding near vref cannot wrap
        // the sign-bit branch back to 2*vref.
        let magnitude = (((2.0 * vref - v) / vref) * NEGATIVE_FULL_SCALE)
            .round()
            .min(POSITIVE_FULL_SCALE) as u32;
        SIGN_BIT | magnitude
    }
}

// Channel wiring of the simulated rig; matches the default config.
const CH_CURRENT: usize = 3;
const CH_HV: usize = 7;
const CH_OPAMP: usize = 8;
const CH_BATTERY: usize = 9;

const VREF_V: f64 = 5.0;
const AMP_RAIL_V: f64 = 15.0;
const OPAMP_DIVIDER: f64 = 6.0;
const BATTERY_DIVIDER: f64 = 3.0;
const HV_FULL_SCALE_KV: f64 = 5.0;

struct RigState {
    max_position: u16,
    position: u16,
    lines: [bool; 5],
    battery_pack_v: f64,
    sensor_bias_v: f64,
    fail_acquires: u32,
    powered_off: bool,
}

fn line_index(line: Line) -> usize {
    match line {
        Line::AmpEnable => 0,
        Line::AmpLed => 1,
        Line::BatteryLed => 2,
        Line::RangeA => 3,
        Line::RangeB => 4,
    }
}

impl RigState {
    fn amp_enabled(&self) -> bool {
        self.lines[line_index(Line::AmpEnable)]
    }

    fn ratio(&self) -> f64 {
        f64::from(self.position.min(self.max_position)) / f64::from(self.max_position)
    }

    fn channel_voltage(&self, ch: usize) -> f64 {
        match ch {
            CH_BATTERY => self.battery_pack_v / BATTERY_DIVIDER,
            CH_OPAMP if self.amp_enabled() => AMP_RAIL_V * self.ratio() / OPAMP_DIVIDER,
            CH_HV if self.amp_enabled() => HV_FULL_SCALE_KV * self.ratio(),
            CH_CURRENT => {
                let load = if self.amp_enabled() {
                    0.2 * self.ratio()
                } else {
                    0.0
                };
                self.sensor_bias_v + load
            }
            _ => 0.0,
        }
    }
}

/// Factory and inspection handle for the simulated hardware.
#[derive(Clone)]
pub struct SimulatedRig {
    state: Rc<RefCell<RigState>>,
}

impl SimulatedRig {
    pub fn new(max_position: u16) -> Self {
        Self {
            state: Rc::new(RefCell::new(RigState {
                max_position: max_position.max(1),
                position: 0,
                lines: [false; 5],
                battery_pack_v: 7.4,
                sensor_bias_v: 1.0,
                fail_acquires: 0,
                powered_off: false,
            })),
        }
    }

    pub fn adc(&self) -> SimulatedAdc {
        SimulatedAdc {
            state: self.state.clone(),
        }
    }

    pub fn pot(&self) -> SimulatedPot {
        SimulatedPot {
            state: self.state.clone(),
        }
    }

    pub fn outputs(&self) -> SimulatedOutputs {
        SimulatedOutputs {
            state: self.state.clone(),
        }
    }

    pub fn power(&self) -> SimulatedPower {
        SimulatedPower {
            state: self.state.clone(),
        }
    }

    pub fn set_battery_v(&self, v: f64) {
        self.state.borrow_mut().battery_pack_v = v;
    }

    pub fn set_sensor_bias_v(&self, v: f64) {
        self.state.borrow_mut().sensor_bias_v = v;
    }

    /// Make the next `n` acquisitions fail, simulating a wedged bus.
    pub fn fail_next_acquires(&self, n: u32) {
        self.state.borrow_mut().fail_acquires = n;
    }

    pub fn position(&self) -> u16 {
        self.state.borrow().position
    }

    pub fn line(&self, line: Line) -> bool {
        self.state.borrow().lines[line_index(line)]
    }

    pub fn powered_off(&self) -> bool {
        self.state.borrow().powered_off
    }
}

pub struct SimulatedAdc {
    state: Rc<RefCell<RigState>>,
}

impl AdcBank for SimulatedAdc {
    fn acquire(&mut self) -> Result<RawFrame, Box<dyn std::error::Error + Send + Sync>> {
        let mut state = self.state.borrow_mut();
        if state.fail_acquires > 0 {
            state.fail_acquires -= 1;
            return Err(Box::new(std::io::Error::other("simulated short frame")));
        }
        let mut frame: RawFrame = [0; ADC_CHANNEL_COUNT];
        for (ch, slot) in frame.iter_mut().enumerate() {
            *slot = encode_voltage(state.channel_voltage(ch), VREF_V);
        }
        Ok(frame)
    }
}

pub struct SimulatedPot {
    state: Rc<RefCell<RigState>>,
}

impl PotBus for SimulatedPot {
    fn transfer(&mut self, frame: [u8; 2]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let position = u16::from_be_bytes(frame);
        self.state.borrow_mut().position = position;
        debug!(position, "sim pot write");
        Ok(())
    }
}

pub struct SimulatedOutputs {
    state: Rc<RefCell<RigState>>,
}

impl DigitalOutputs for SimulatedOutputs {
    fn set_line(
        &mut self,
        line: Line,
        high: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.state.borrow_mut().lines[line_index(line)] = high;
        Ok(())
    }
}

pub struct SimulatedPower {
    state: Rc<RefCell<RigState>>,
}

impl HostPower for SimulatedPower {
    fn power_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        debug!("sim host power-off");
        self.state.borrow_mut().powered_off = true;
        Ok(())
    }
}
