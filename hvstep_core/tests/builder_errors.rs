use hvstep_core::error::BuildError;
use hvstep_core::mocks::{FaultyAdc, OpLog, SpyOutputs, SpyPot};
use hvstep_core::{CurrentCurve, Supply, SupplySettings};
use rstest::rstest;

#[test]
fn try_build_reports_the_first_missing_piece() {
    let err = Supply::builder().try_build().expect_err("missing adc");
    assert!(matches!(err.downcast_ref::<BuildError>(), Some(BuildError::MissingAdc)));

    let err = Supply::builder()
        .with_adc(FaultyAdc)
        .try_build()
        .expect_err("missing pot");
    assert!(matches!(err.downcast_ref::<BuildError>(), Some(BuildError::MissingPot)));

    let err = Supply::builder()
        .with_adc(FaultyAdc)
        .with_pot(SpyPot { log: OpLog::default() })
        .try_build()
        .expect_err("missing outputs");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingOutputs)
    ));
}

fn settings_with(mutate: impl FnOnce(&mut SupplySettings)) -> SupplySettings {
    let mut s = SupplySettings::default();
    mutate(&mut s);
    s
}

#[rstest]
#[case(settings_with(|s| s.vref_v = 0.0), "vref_v")]
#[case(settings_with(|s| s.limits.max_position = 0), "max_position")]
#[case(settings_with(|s| s.limits.hv_ceiling_kv = -1.0), "hv_ceiling_kv")]
#[case(settings_with(|s| s.channels.hv = 10), "channel index")]
#[case(settings_with(|s| { s.battery.warn_below_v = 6.0; s.battery.critical_below_v = 6.5; }), "critical threshold")]
#[case(settings_with(|s| s.sensor.bias_samples = 0), "bias_samples")]
#[case(settings_with(|s| s.curve = CurrentCurve::new(vec![])), "at least one coefficient")]
#[case(settings_with(|s| s.curve = CurrentCurve::new(vec![f64::NAN])), "finite")]
fn rejects_invalid_settings(#[case] settings: SupplySettings, #[case] needle: &str) {
    let log = OpLog::default();
    let err = Supply::builder()
        .with_adc(FaultyAdc)
        .with_pot(SpyPot { log: log.clone() })
        .with_outputs(SpyOutputs { log })
        .with_settings(settings)
        .build()
        .expect_err("invalid settings must be rejected");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => {
            assert!(msg.contains(needle), "error {msg:?} missing needle {needle:?}");
        }
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn default_settings_build_cleanly() {
    let log = OpLog::default();
    Supply::builder()
        .with_adc(FaultyAdc)
        .with_pot(SpyPot { log: log.clone() })
        .with_outputs(SpyOutputs { log })
        .build()
        .expect("defaults are valid");
}
