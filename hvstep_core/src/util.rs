//! RC-network timing helpers.
//!
//! The controller itself only ever receives a `Duration`; these helpers are
//! how the orchestrator turns the physical constants into settle waits,
//! keeping the physics out of the safety-critical loop.

use std::time::Duration;

/// RC time constant in seconds for a resistance in megaohms and a
/// capacitance in microfarads (the 1e6 and 1e-6 cancel).
#[inline]
pub fn tau_seconds(r_mohm: f64, c_uf: f64) -> f64 {
    r_mohm * c_uf
}

/// Settle wait of `factor` time constants, clamped to non-negative.
#[inline]
pub fn settle_after(factor: f64, tau_s: f64) -> Duration {
    let secs = factor * tau_s;
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

/// Charge settle wait: `factor_up` time constants of the series branch.
pub fn charge_settle(rc: &hvstep_config::RcCfg) -> Duration {
    settle_after(rc.factor_up, tau_seconds(rc.r_series_mohm, rc.capacitance_uf))
}

/// Discharge settle wait: `factor_down` time constants of the series plus
/// shunt branch.
pub fn discharge_settle(rc: &hvstep_config::RcCfg) -> Duration {
    settle_after(
        rc.factor_down,
        tau_seconds(rc.r_series_mohm + rc.r_shunt_mohm, rc.capacitance_uf),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tau_units_cancel() {
        // 1.5 MOhm * 0.01 uF = 15 ms
        assert!((tau_seconds(1.5, 0.01) - 0.015).abs() < 1e-12);
    }

    #[test]
    fn settle_is_factor_times_tau() {
        let d = settle_after(5.0, 0.015);
        assert!((d.as_secs_f64() - 0.075).abs() < 1e-9);
    }

    #[test]
    fn non_finite_or_negative_settle_clamps_to_zero() {
        assert_eq!(settle_after(-1.0, 0.5), Duration::ZERO);
        assert_eq!(settle_after(f64::NAN, 0.5), Duration::ZERO);
    }

    #[test]
    fn discharge_uses_series_plus_shunt() {
        let rc = hvstep_config::RcCfg::default();
        // (1.5 + 25.0) MOhm * 0.01 uF * 5 = 1.325 s
        let d = discharge_settle(&rc);
        assert!((d.as_secs_f64() - 1.325).abs() < 1e-9, "{d:?}");
        // charge: 1.5 MOhm * 0.01 uF * 5 = 75 ms
        let d = charge_settle(&rc);
        assert!((d.as_secs_f64() - 0.075).abs() < 1e-9, "{d:?}");
    }
}
