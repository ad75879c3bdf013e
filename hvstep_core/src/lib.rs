#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core control logic for the stepped HV supply (hardware-agnostic).
//!
//! This crate provides the hardware-independent step controller. All
//! hardware interactions go through the `hvstep_traits` traits (`AdcBank`,
//! `PotBus`, `DigitalOutputs`, `HostPower`).
//!
//! ## Architecture
//!
//! - **Decoding**: sign-magnitude ADC code to volts (`volts` module)
//! - **Configuration**: runtime config structs (`config` module)
//! - **Calibration**: injectable current-sensor polynomial (`curve` module)
//! - **Control**: one-step-at-a-time wiper transitions with HV ceiling and
//!   position bounds (`SupplyCore`)
//! - **Safety**: battery policy evaluated on every actuation, latched
//!   de-energize sequence on every fatal path
//! - **Status**: step outcomes and safety states (`status` module)
//!
//! ## Safety model
//!
//! Every step request is a single discrete, bounded, observably-settled
//! transition, and every fatal condition funnels into the same idempotent
//! sequence: amplifier off, wiper zeroed, auxiliary outputs low. Sensing
//! failures are never retried; a reading that cannot be trusted must not
//! feed a safety decision.

// Module declarations
pub mod config;
pub mod conversions;
pub mod curve;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod status;
pub mod util;
pub mod volts;

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use tracing::{error, info, warn};

use crate::hw_error::map_hw_error;
use crate::mocks::NoopHostPower;
use hvstep_traits::clock::{Clock, MonotonicClock};
use hvstep_traits::{ADC_CHANNEL_COUNT, AdcBank, DigitalOutputs, HostPower, Line, PotBus};

pub use crate::config::{
    BatteryPolicy, ChannelMap, SensorCfg, SensorRange, StepLimits, SupplySettings,
};
pub use crate::curve::CurrentCurve;
pub use crate::error::{BuildError, Result, SupplyError};
pub use crate::status::{SafetyState, StepDirection, StepOutcome, StepReading};

/// Step controller over injected hardware handles.
///
/// Owns the session-scoped controller state (wiper position plus the last
/// settled readings); the state resets on `begin` and on any fatal shutdown.
pub struct SupplyCore<A: AdcBank, P: PotBus, O: DigitalOutputs, H: HostPower> {
    adc: A,
    pot: P,
    outputs: O,
    power: H,
    clock: Arc<dyn Clock + Send + Sync>,
    settings: SupplySettings,

    position: u16,
    last_opamp_v: f64,
    last_hv_kv: f64,
    // Latched by the first fatal trigger; further triggers are no-ops and
    // further step requests are rejected until begin().
    shutdown_latched: bool,
}

impl<A: AdcBank, P: PotBus, O: DigitalOutputs, H: HostPower> core::fmt::Debug
    for SupplyCore<A, P, O, H>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SupplyCore")
            .field("position", &self.position)
            .field("last_opamp_v", &self.last_opamp_v)
            .field("last_hv_kv", &self.last_hv_kv)
            .field("shutdown_latched", &self.shutdown_latched)
            .finish()
    }
}

impl<A: AdcBank, P: PotBus, O: DigitalOutputs, H: HostPower> SupplyCore<A, P, O, H> {
    /// Validate settings and assemble a controller around concrete handles.
    pub fn new(
        adc: A,
        pot: P,
        outputs: O,
        power: H,
        settings: SupplySettings,
        clock: Option<Box<dyn Clock + Send + Sync>>,
    ) -> Result<Self> {
        validate_settings(&settings)?;
        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        Ok(Self {
            adc,
            pot,
            outputs,
            power,
            clock,
            settings,
            position: 0,
            last_opamp_v: 0.0,
            last_hv_kv: 0.0,
            shutdown_latched: false,
        })
    }

    /// Current wiper position.
    pub fn position(&self) -> u16 {
        self.position
    }

    /// Last settled readings together with the current position.
    pub fn last_reading(&self) -> StepReading {
        StepReading {
            position: self.position,
            opamp_v: self.last_opamp_v,
            hv_kv: self.last_hv_kv,
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_latched
    }

    /// Put the rig into its initial safe state and reset controller state.
    /// Clears a previous shutdown latch.
    pub fn begin(&mut self) -> Result<()> {
        self.shutdown_latched = false;
        self.all_auxiliary_off()?;
        self.set_wiper(0)?;
        self.set_amplifier(false)?;
        self.position = 0;
        self.last_opamp_v = 0.0;
        self.last_hv_kv = 0.0;
        Ok(())
    }

    /// One atomic all-channel acquisition, decoded for `channel`.
    ///
    /// Any failure of the underlying acquisition de-energizes the rig and
    /// propagates as fatal; partial frames do not exist at this boundary.
    pub fn read_voltage(&mut self, channel: usize) -> Result<f64> {
        let frame = match self.adc.acquire() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "adc acquisition failed; de-energizing");
                self.de_energize();
                return Err(eyre::Report::new(SupplyError::Acquisition(e.to_string())));
            }
        };
        let Some(code) = frame.get(channel).copied() else {
            self.de_energize();
            return Err(eyre::Report::new(SupplyError::Acquisition(format!(
                "channel {channel} absent from frame"
            ))));
        };
        Ok(volts::decode_voltage(code, self.settings.vref_v))
    }

    /// Write an absolute wiper position as one indivisible two-byte
    /// transfer, MSB first. Bounds are the caller's contract.
    pub fn set_wiper(&mut self, position: u16) -> Result<()> {
        debug_assert!(
            position <= self.settings.limits.max_position,
            "wiper position {position} out of range"
        );
        if let Err(e) = self.pot.transfer(position.to_be_bytes()) {
            let mapped = map_hw_error(&*e);
            self.de_energize();
            return Err(eyre::Report::new(mapped)).wrap_err("pot write");
        }
        Ok(())
    }

    /// Drive the amplifier enable and its indicator LED to the same level
    /// as one grouped operation.
    pub fn set_amplifier(&mut self, enabled: bool) -> Result<()> {
        self.set_line(Line::AmpEnable, enabled)?;
        self.set_line(Line::AmpLed, enabled)?;
        Ok(())
    }

    /// Force every auxiliary output low (LEDs and range selectors). Does
    /// not touch the amplifier enable line.
    pub fn all_auxiliary_off(&mut self) -> Result<()> {
        for line in Line::AUXILIARY {
            self.set_line(line, false)?;
        }
        Ok(())
    }

    /// Select the current-sensor hardware range: both selector lines low,
    /// then the chosen one high.
    pub fn select_range(&mut self, range: SensorRange) -> Result<()> {
        self.set_line(Line::RangeA, false)?;
        self.set_line(Line::RangeB, false)?;
        match range {
            SensorRange::One => self.set_line(Line::RangeA, true),
            SensorRange::Two => self.set_line(Line::RangeB, true),
        }
    }

    fn set_line(&mut self, line: Line, high: bool) -> Result<()> {
        self.outputs
            .set_line(line, high)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("digital output")
    }

    /// The safe shutdown sequence: amplifier off, wiper zeroed, auxiliary
    /// outputs low, controller state reset.
    ///
    /// Latched: the sequence runs once per fatal trigger no matter how many
    /// paths reach it, and it is best-effort all the way down so a failing
    /// output can never block the rest of the sequence.
    pub fn de_energize(&mut self) {
        if self.shutdown_latched {
            return;
        }
        self.shutdown_latched = true;
        warn!("de-energizing supply");
        for line in [Line::AmpEnable, Line::AmpLed] {
            if let Err(e) = self.outputs.set_line(line, false) {
                warn!(error = %e, ?line, "de-energize: output write failed");
            }
        }
        if let Err(e) = self.pot.transfer(0u16.to_be_bytes()) {
            warn!(error = %e, "de-energize: wiper zero failed");
        }
        for line in Line::AUXILIARY {
            if let Err(e) = self.outputs.set_line(line, false) {
                warn!(error = %e, ?line, "de-energize: output write failed");
            }
        }
        self.position = 0;
        self.last_opamp_v = 0.0;
        self.last_hv_kv = 0.0;
    }

    /// Sample the battery, update the indicator, and on a critical pack run
    /// the grace wait, the shutdown sequence, and the host power-off.
    pub fn check_battery(&mut self) -> Result<SafetyState> {
        let pack_v = self.read_voltage(self.settings.channels.battery)? * self.settings.battery.divider;
        let state = self.settings.battery.classify(pack_v);
        match state {
            SafetyState::Normal => {
                self.set_line(Line::BatteryLed, false)?;
                info!(battery_v = pack_v, "battery ok");
            }
            SafetyState::LowBattery => {
                self.set_line(Line::BatteryLed, true)?;
                warn!(battery_v = pack_v, "battery low");
            }
            SafetyState::Critical => {
                error!(
                    battery_v = pack_v,
                    grace_s = self.settings.battery.grace.as_secs(),
                    "battery critically low; de-energizing and powering down host"
                );
                self.clock.sleep(self.settings.battery.grace);
                self.de_energize();
                if let Err(e) = self.power.power_off() {
                    warn!(error = %e, "host power-off failed");
                }
            }
        }
        Ok(state)
    }

    /// Average idle samples of the sensor channel into the bias offset.
    /// Samples are taken back to back; nothing is actuating, so there is no
    /// settling wait between them.
    pub fn calibrate_bias(&mut self) -> Result<f64> {
        let samples = self.settings.sensor.bias_samples.max(1);
        let mut sum = 0.0;
        for _ in 0..samples {
            sum += self.read_voltage(self.settings.channels.current)?;
        }
        let bias_v = sum / f64::from(samples);
        info!(bias_v, samples, "current sensor bias calibrated");
        Ok(bias_v)
    }

    /// Latest sensor reading minus bias, pushed through the calibration
    /// curve; result in microamperes.
    pub fn measure_current(&mut self, bias_v: f64) -> Result<f64> {
        let x = self.read_voltage(self.settings.channels.current)? - bias_v;
        Ok(self.settings.curve.eval(x))
    }

    /// Raise the wiper one step unless a bound holds it, settle, re-sample.
    pub fn step_up(&mut self, settle: Duration) -> Result<StepOutcome> {
        self.step(StepDirection::Up, settle)
    }

    /// Lower the wiper one step unless already at the floor.
    pub fn step_down(&mut self, settle: Duration) -> Result<StepOutcome> {
        self.step(StepDirection::Down, settle)
    }

    fn step(&mut self, direction: StepDirection, settle: Duration) -> Result<StepOutcome> {
        if self.shutdown_latched {
            return Err(eyre::Report::new(SupplyError::State(
                "supply is de-energized".into(),
            )));
        }
        let gain = self.settings.limits.opamp_gain;
        let hv_channel = self.settings.channels.hv;
        let opamp_channel = self.settings.channels.opamp;

        let (stepped, opamp_v, hv_kv) = match direction {
            StepDirection::Up => {
                let mut hv_kv = self.read_voltage(hv_channel)?;
                let within_bounds = self.position < self.settings.limits.max_position
                    && hv_kv <= self.settings.limits.hv_ceiling_kv;
                if within_bounds {
                    let next = self.position + 1;
                    self.set_wiper(next)?;
                    self.position = next;
                    let opamp_v = self.read_voltage(opamp_channel)? * gain;
                    self.clock.sleep(settle);
                    hv_kv = self.read_voltage(hv_channel)?;
                    (true, opamp_v, hv_kv)
                } else {
                    // Held at the cap or the ceiling: refresh the amplifier
                    // reading, reuse the HV sample, skip the settle wait.
                    let opamp_v = self.read_voltage(opamp_channel)? * gain;
                    (false, opamp_v, hv_kv)
                }
            }
            StepDirection::Down => {
                if self.position > 0 {
                    let next = self.position - 1;
                    self.set_wiper(next)?;
                    self.position = next;
                    let opamp_v = self.read_voltage(opamp_channel)? * gain;
                    self.clock.sleep(settle);
                    let hv_kv = self.read_voltage(hv_channel)?;
                    (true, opamp_v, hv_kv)
                } else {
                    let opamp_v = self.read_voltage(opamp_channel)? * gain;
                    let hv_kv = self.read_voltage(hv_channel)?;
                    (false, opamp_v, hv_kv)
                }
            }
        };

        // Safety rides on every actuation event, stepped or held.
        let safety = self.check_battery()?;
        if safety == SafetyState::Critical {
            return Ok(StepOutcome {
                reading: self.last_reading(),
                stepped,
                safety,
            });
        }

        self.last_opamp_v = opamp_v;
        self.last_hv_kv = hv_kv;
        info!(
            position = self.position,
            opamp_v,
            hv_kv,
            stepped,
            direction = ?direction,
            "step evaluated"
        );
        Ok(StepOutcome {
            reading: StepReading {
                position: self.position,
                opamp_v,
                hv_kv,
            },
            stepped,
            safety,
        })
    }
}

fn validate_settings(s: &SupplySettings) -> Result<()> {
    if !(s.vref_v.is_finite() && s.vref_v > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "vref_v must be > 0",
        )));
    }
    for ch in [
        s.channels.battery,
        s.channels.opamp,
        s.channels.hv,
        s.channels.current,
    ] {
        if ch >= ADC_CHANNEL_COUNT {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "channel index out of range",
            )));
        }
    }
    if s.limits.max_position == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "max_position must be >= 1",
        )));
    }
    if !(s.limits.hv_ceiling_kv.is_finite() && s.limits.hv_ceiling_kv > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "hv_ceiling_kv must be > 0",
        )));
    }
    if !(s.limits.opamp_gain.is_finite() && s.limits.opamp_gain > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "opamp_gain must be > 0",
        )));
    }
    if !(s.battery.divider.is_finite() && s.battery.divider > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "battery divider must be > 0",
        )));
    }
    if s.battery.critical_below_v >= s.battery.warn_below_v {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "battery critical threshold must be below warning threshold",
        )));
    }
    if s.sensor.bias_samples == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "bias_samples must be >= 1",
        )));
    }
    if s.curve.is_empty() {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "sensor curve must have at least one coefficient",
        )));
    }
    if s.curve.coefficients().iter().any(|c| !c.is_finite()) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "sensor curve coefficients must be finite",
        )));
    }
    Ok(())
}

/// Dynamic-dispatch controller over boxed hardware handles.
pub type Supply =
    SupplyCore<Box<dyn AdcBank>, Box<dyn PotBus>, Box<dyn DigitalOutputs>, Box<dyn HostPower>>;

impl SupplyCore<Box<dyn AdcBank>, Box<dyn PotBus>, Box<dyn DigitalOutputs>, Box<dyn HostPower>> {
    /// Start building a boxed Supply.
    pub fn builder() -> SupplyBuilder<Missing, Missing, Missing> {
        SupplyBuilder::default()
    }
}

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

/// Builder for `Supply`. ADC, potentiometer bus, and digital outputs are
/// mandatory and tracked in the type-state; host power defaults to a no-op
/// handle so simulations can never take the host down by accident.
pub struct SupplyBuilder<A, P, O> {
    adc: Option<Box<dyn AdcBank>>,
    pot: Option<Box<dyn PotBus>>,
    outputs: Option<Box<dyn DigitalOutputs>>,
    power: Option<Box<dyn HostPower>>,
    settings: Option<SupplySettings>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _a: PhantomData<A>,
    _p: PhantomData<P>,
    _o: PhantomData<O>,
}

impl Default for SupplyBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            adc: None,
            pot: None,
            outputs: None,
            power: None,
            settings: None,
            clock: None,
            _a: PhantomData,
            _p: PhantomData,
            _o: PhantomData,
        }
    }
}

impl<A, P, O> SupplyBuilder<A, P, O> {
    /// Fallible build available in any type-state; returns a detailed
    /// BuildError for missing pieces.
    pub fn try_build(self) -> Result<Supply> {
        let SupplyBuilder {
            adc,
            pot,
            outputs,
            power,
            settings,
            clock,
            _a: _,
            _p: _,
            _o: _,
        } = self;

        let adc = adc.ok_or_else(|| eyre::Report::new(BuildError::MissingAdc))?;
        let pot = pot.ok_or_else(|| eyre::Report::new(BuildError::MissingPot))?;
        let outputs = outputs.ok_or_else(|| eyre::Report::new(BuildError::MissingOutputs))?;
        let power = power.unwrap_or_else(|| Box::new(NoopHostPower));
        let settings = settings.unwrap_or_default();

        SupplyCore::new(adc, pot, outputs, power, settings, clock)
    }

    pub fn with_settings(mut self, settings: SupplySettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Override just the sensor curve on top of whatever settings are set.
    pub fn with_curve(mut self, curve: CurrentCurve) -> Self {
        let mut settings = self.settings.unwrap_or_default();
        settings.curve = curve;
        self.settings = Some(settings);
        self
    }

    pub fn with_power(mut self, power: impl HostPower + 'static) -> Self {
        self.power = Some(Box::new(power));
        self
    }

    /// Provide a custom clock; defaults to MonotonicClock when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state when providing mandatory components
impl<P, O> SupplyBuilder<Missing, P, O> {
    pub fn with_adc(self, adc: impl AdcBank + 'static) -> SupplyBuilder<Set, P, O> {
        let SupplyBuilder {
            adc: _,
            pot,
            outputs,
            power,
            settings,
            clock,
            _a: _,
            _p: _,
            _o: _,
        } = self;
        SupplyBuilder {
            adc: Some(Box::new(adc)),
            pot,
            outputs,
            power,
            settings,
            clock,
            _a: PhantomData,
            _p: PhantomData,
            _o: PhantomData,
        }
    }
}

impl<A, O> SupplyBuilder<A, Missing, O> {
    pub fn with_pot(self, pot: impl PotBus + 'static) -> SupplyBuilder<A, Set, O> {
        let SupplyBuilder {
            adc,
            pot: _,
            outputs,
            power,
            settings,
            clock,
            _a: _,
            _p: _,
            _o: _,
        } = self;
        SupplyBuilder {
            adc,
            pot: Some(Box::new(pot)),
            outputs,
            power,
            settings,
            clock,
            _a: PhantomData,
            _p: PhantomData,
            _o: PhantomData,
        }
    }
}

impl<A, P> SupplyBuilder<A, P, Missing> {
    pub fn with_outputs(self, outputs: impl DigitalOutputs + 'static) -> SupplyBuilder<A, P, Set> {
        let SupplyBuilder {
            adc,
            pot,
            outputs: _,
            power,
            settings,
            clock,
            _a: _,
            _p: _,
            _o: _,
        } = self;
        SupplyBuilder {
            adc,
            pot,
            outputs: Some(Box::new(outputs)),
            power,
            settings,
            clock,
            _a: PhantomData,
            _p: PhantomData,
            _o: PhantomData,
        }
    }
}

impl SupplyBuilder<Set, Set, Set> {
    /// Validate and build the Supply. Only available when the ADC, the pot
    /// bus, and the outputs are all set.
    pub fn build(self) -> Result<Supply> {
        self.try_build()
    }
}
