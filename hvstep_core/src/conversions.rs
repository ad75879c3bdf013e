//! From-impls mapping `hvstep_config` (TOML-deserialized) types onto the
//! runtime configuration consumed by `SupplyCore`.

use std::time::Duration;

use crate::config::{
    BatteryPolicy, ChannelMap, SensorCfg, SensorRange, StepLimits, SupplySettings,
};
use crate::curve::CurrentCurve;

impl From<&hvstep_config::Channels> for ChannelMap {
    fn from(c: &hvstep_config::Channels) -> Self {
        Self {
            battery: c.battery,
            opamp: c.opamp,
            hv: c.hv,
            current: c.current,
        }
    }
}

impl From<&hvstep_config::StepCfg> for StepLimits {
    fn from(s: &hvstep_config::StepCfg) -> Self {
        Self {
            max_position: s.max_position,
            hv_ceiling_kv: s.hv_ceiling_kv,
            opamp_gain: s.opamp_gain,
        }
    }
}

impl From<&hvstep_config::BatteryCfg> for BatteryPolicy {
    fn from(b: &hvstep_config::BatteryCfg) -> Self {
        Self {
            divider: b.divider,
            warn_below_v: b.warn_below_v,
            critical_below_v: b.critical_below_v,
            grace: Duration::from_secs(b.grace_s),
        }
    }
}

impl From<&hvstep_config::SensorCfg> for SensorCfg {
    fn from(s: &hvstep_config::SensorCfg) -> Self {
        Self {
            range: if s.range == 2 {
                SensorRange::Two
            } else {
                SensorRange::One
            },
            bias_samples: s.bias_samples,
        }
    }
}

impl From<&hvstep_config::SensorCurve> for CurrentCurve {
    fn from(c: &hvstep_config::SensorCurve) -> Self {
        CurrentCurve::new(c.coefficients.clone())
    }
}

impl From<&hvstep_config::Config> for SupplySettings {
    fn from(cfg: &hvstep_config::Config) -> Self {
        Self {
            vref_v: cfg.adc.vref_v,
            channels: (&cfg.channels).into(),
            limits: (&cfg.step).into(),
            battery: (&cfg.battery).into(),
            sensor: (&cfg.sensor).into(),
            curve: CurrentCurve::new(cfg.sensor.coefficients.clone()),
        }
    }
}
