use hvstep_core::mocks::{InstantClock, OpLog, ScriptAdc, SpyOutputs, SpyPot, frame};
use hvstep_core::{CurrentCurve, SensorRange, Supply, SupplySettings};
use hvstep_traits::Line;
use rstest::rstest;

const VREF: f64 = 5.0;
const CH_CURRENT: usize = 3;

fn supply_with(frames: Vec<hvstep_traits::RawFrame>, settings: SupplySettings, log: &OpLog) -> Supply {
    Supply::builder()
        .with_adc(ScriptAdc::new(frames))
        .with_pot(SpyPot { log: log.clone() })
        .with_outputs(SpyOutputs { log: log.clone() })
        .with_settings(settings)
        .with_clock(Box::new(InstantClock::new()))
        .build()
        .expect("build supply")
}

#[test]
fn bias_is_the_average_of_ten_identical_samples() {
    let log = OpLog::default();
    let frames = vec![frame(&[(CH_CURRENT, 1.0)], VREF); 10];
    let mut supply = supply_with(frames, SupplySettings::default(), &log);

    let bias = supply.calibrate_bias().expect("calibrate");
    assert!((bias - 1.0).abs() < 1e-6, "got {bias}");
}

#[test]
fn bias_averages_a_varying_sample_train() {
    let log = OpLog::default();
    let volts = [0.8, 0.9, 1.0, 1.1, 1.2, 1.2, 1.1, 1.0, 0.9, 0.8];
    let frames: Vec<_> = volts.iter().map(|v| frame(&[(CH_CURRENT, *v)], VREF)).collect();
    let mut supply = supply_with(frames, SupplySettings::default(), &log);

    let bias = supply.calibrate_bias().expect("calibrate");
    let expected = volts.iter().sum::<f64>() / volts.len() as f64;
    assert!((bias - expected).abs() < 1e-6, "got {bias}, want {expected}");
}

#[test]
fn current_subtracts_bias_then_applies_the_curve() {
    let log = OpLog::default();
    let mut settings = SupplySettings::default();
    // Identity curve: microamps == bias-corrected volts.
    settings.curve = CurrentCurve::new(vec![0.0, 1.0]);
    let frames = vec![frame(&[(CH_CURRENT, 1.8)], VREF)];
    let mut supply = supply_with(frames, settings, &log);

    let ua = supply.measure_current(1.0).expect("measure");
    assert!((ua - 0.8).abs() < 1e-6, "got {ua}");
}

#[test]
fn current_uses_the_injected_calibration_table() {
    let log = OpLog::default();
    let settings = SupplySettings::default();
    let curve = settings.curve.clone();
    let frames = vec![frame(&[(CH_CURRENT, 1.4)], VREF)];
    let mut supply = supply_with(frames, settings, &log);

    let ua = supply.measure_current(1.0).expect("measure");
    let expected = curve.eval(0.4);
    assert!((ua - expected).abs() < 1e-6, "got {ua}, want {expected}");
}

#[rstest]
#[case(SensorRange::One, Line::RangeA, Line::RangeB)]
#[case(SensorRange::Two, Line::RangeB, Line::RangeA)]
fn range_select_raises_exactly_one_selector(
    #[case] range: SensorRange,
    #[case] raised: Line,
    #[case] lowered: Line,
) {
    let log = OpLog::default();
    let mut supply = supply_with(
        vec![frame(&[], VREF)],
        SupplySettings::default(),
        &log,
    );

    supply.select_range(range).expect("select range");
    assert_eq!(log.last_level(raised), Some(true));
    assert_eq!(log.last_level(lowered), Some(false));
}
