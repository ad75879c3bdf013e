//! Runtime configuration structs for the supply controller.
//!
//! These are the validated, unit-normalized forms consumed by `SupplyCore`.
//! They are separate from the TOML-deserialized config in `hvstep_config`;
//! `conversions` maps between the two.

use std::time::Duration;

use crate::curve::CurrentCurve;
use crate::status::SafetyState;

/// ADC channel assignments for the observed quantities.
#[derive(Debug, Clone, Copy)]
pub struct ChannelMap {
    pub battery: usize,
    pub opamp: usize,
    pub hv: usize,
    pub current: usize,
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            battery: 9,
            opamp: 8,
            hv: 7,
            current: 3,
        }
    }
}

/// Bounds and scaling for the step controller.
#[derive(Debug, Clone, Copy)]
pub struct StepLimits {
    /// Highest addressable wiper position, inclusive. The step-up guard is
    /// `position < max_position`, so positions never leave
    /// `[0, max_position]`.
    pub max_position: u16,
    /// Step-up holds (without actuating) once the HV output exceeds this.
    pub hv_ceiling_kv: f64,
    /// Undoes the amplifier-output divider on the measured channel.
    pub opamp_gain: f64,
}

impl Default for StepLimits {
    fn default() -> Self {
        Self {
            max_position: 0x101,
            hv_ceiling_kv: 4.0,
            opamp_gain: 6.0,
        }
    }
}

/// Battery thresholds in pack volts, i.e. after undoing the divider.
#[derive(Debug, Clone, Copy)]
pub struct BatteryPolicy {
    pub divider: f64,
    pub warn_below_v: f64,
    pub critical_below_v: f64,
    /// Observation window between detecting a critical pack and acting on it.
    pub grace: Duration,
}

impl Default for BatteryPolicy {
    fn default() -> Self {
        Self {
            divider: 3.0,
            warn_below_v: 6.5,
            critical_below_v: 6.0,
            grace: Duration::from_secs(5),
        }
    }
}

impl BatteryPolicy {
    /// Classify a pack voltage. The warning threshold itself is healthy:
    /// only voltages strictly below it warn.
    pub fn classify(&self, pack_v: f64) -> SafetyState {
        if pack_v >= self.warn_below_v {
            SafetyState::Normal
        } else if pack_v >= self.critical_below_v {
            SafetyState::LowBattery
        } else {
            SafetyState::Critical
        }
    }
}

/// Hardware range selector of the current sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorRange {
    #[default]
    One,
    Two,
}

/// Current-sensor sampling setup (the curve itself lives in `SupplySettings`).
#[derive(Debug, Clone, Copy)]
pub struct SensorCfg {
    pub range: SensorRange,
    /// Back-to-back idle samples averaged into the bias offset.
    pub bias_samples: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            range: SensorRange::One,
            bias_samples: 10,
        }
    }
}

/// Everything the controller needs besides the hardware handles.
#[derive(Debug, Clone)]
pub struct SupplySettings {
    /// ADC reference voltage in volts.
    pub vref_v: f64,
    pub channels: ChannelMap,
    pub limits: StepLimits,
    pub battery: BatteryPolicy,
    pub sensor: SensorCfg,
    pub curve: CurrentCurve,
}

impl Default for SupplySettings {
    fn default() -> Self {
        Self {
            vref_v: 5.0,
            channels: ChannelMap::default(),
            limits: StepLimits::default(),
            battery: BatteryPolicy::default(),
            sensor: SensorCfg::default(),
            curve: CurrentCurve::new(hvstep_config::SensorCfg::default().coefficients),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_threshold_is_still_normal() {
        let policy = BatteryPolicy::default();
        assert_eq!(policy.classify(6.5), SafetyState::Normal);
        assert_eq!(policy.classify(7.0), SafetyState::Normal);
    }

    #[test]
    fn band_between_thresholds_warns() {
        let policy = BatteryPolicy::default();
        assert_eq!(policy.classify(6.2), SafetyState::LowBattery);
        assert_eq!(policy.classify(6.0), SafetyState::LowBattery);
    }

    #[test]
    fn below_critical_threshold_is_critical() {
        let policy = BatteryPolicy::default();
        assert_eq!(policy.classify(5.9), SafetyState::Critical);
        assert_eq!(policy.classify(0.0), SafetyState::Critical);
    }
}
