use std::time::Duration;

use hvstep_core::mocks::{FaultyAdc, InstantClock, OpLog, RigOp, ScriptAdc, SpyOutputs, SpyPot, frame};
use hvstep_core::{Supply, SupplyError, SupplySettings};
use hvstep_traits::Line;

const VREF: f64 = 5.0;
const CH_HV: usize = 7;
const CH_OPAMP: usize = 8;
const CH_BATTERY: usize = 9;

fn build_with_adc(adc: impl hvstep_traits::AdcBank + 'static, log: &OpLog) -> Supply {
    Supply::builder()
        .with_adc(adc)
        .with_pot(SpyPot { log: log.clone() })
        .with_outputs(SpyOutputs { log: log.clone() })
        .with_settings(SupplySettings::default())
        .with_clock(Box::new(InstantClock::new()))
        .build()
        .expect("build supply")
}

/// Index of the first op matching the predicate, or panic.
fn position_of(ops: &[RigOp], what: &str, pred: impl Fn(&RigOp) -> bool) -> usize {
    ops.iter()
        .position(pred)
        .unwrap_or_else(|| panic!("{what} missing from {ops:?}"))
}

#[test]
fn acquisition_failure_is_fatal_and_never_actuates() {
    let log = OpLog::default();
    let mut supply = build_with_adc(FaultyAdc, &log);

    let err = supply
        .step_up(Duration::from_secs(1))
        .expect_err("acquisition failure must propagate");
    assert!(
        matches!(err.downcast_ref::<SupplyError>(), Some(SupplyError::Acquisition(_))),
        "unexpected error: {err}"
    );
    assert!(supply.is_shut_down());

    // The only wiper write is the zeroing inside the shutdown sequence.
    assert_eq!(log.pot_writes(), vec![0]);
}

#[test]
fn fatal_sequence_order_is_amp_then_wiper_then_auxiliary() {
    let log = OpLog::default();
    let mut supply = build_with_adc(FaultyAdc, &log);

    let _ = supply.step_up(Duration::ZERO);
    let ops = log.snapshot();

    let amp_off = position_of(&ops, "amp disable", |op| {
        matches!(op, RigOp::Level(Line::AmpEnable, false))
    });
    let wiper_zero = position_of(&ops, "wiper zero", |op| matches!(op, RigOp::PotWrite(0)));
    let battery_led_off = position_of(&ops, "battery led low", |op| {
        matches!(op, RigOp::Level(Line::BatteryLed, false))
    });
    let range_a_off = position_of(&ops, "range a low", |op| {
        matches!(op, RigOp::Level(Line::RangeA, false))
    });

    assert!(amp_off < wiper_zero, "amp must drop before the wiper: {ops:?}");
    assert!(wiper_zero < battery_led_off, "wiper before auxiliary: {ops:?}");
    assert!(wiper_zero < range_a_off, "wiper before auxiliary: {ops:?}");
}

#[test]
fn double_fatal_trigger_runs_the_sequence_once() {
    let log = OpLog::default();
    let mut supply = build_with_adc(FaultyAdc, &log);

    let _ = supply.step_up(Duration::ZERO);
    let after_first = log.snapshot();

    // Second trigger in quick succession: redundant call is safe and adds
    // nothing.
    supply.de_energize();
    assert_eq!(log.snapshot(), after_first);

    // Further step requests are rejected without touching the hardware.
    let err = supply.step_up(Duration::ZERO).expect_err("latched supply");
    assert!(
        matches!(err.downcast_ref::<SupplyError>(), Some(SupplyError::State(_))),
        "unexpected error: {err}"
    );
    assert_eq!(log.snapshot(), after_first);
}

#[test]
fn failure_after_actuation_still_zeroes_the_wiper() {
    let log = OpLog::default();
    let healthy = frame(
        &[(CH_HV, 0.5), (CH_OPAMP, 1.0), (CH_BATTERY, 7.4 / 3.0)],
        VREF,
    );
    // First acquisition (the pre-step HV read) succeeds, everything after
    // fails: the wiper write has already landed when the fault hits.
    let adc = ScriptAdc::failing_after(vec![healthy], 1);
    let mut supply = build_with_adc(adc, &log);

    let err = supply.step_up(Duration::ZERO).expect_err("fault mid-step");
    assert!(
        matches!(err.downcast_ref::<SupplyError>(), Some(SupplyError::Acquisition(_))),
        "unexpected error: {err}"
    );
    assert_eq!(
        log.pot_writes(),
        vec![1, 0],
        "the committed step is followed by the shutdown zeroing"
    );
    assert_eq!(supply.position(), 0, "state reset on fatal shutdown");
}

#[test]
fn de_energize_resets_last_readings() {
    let log = OpLog::default();
    let healthy = frame(
        &[(CH_HV, 0.5), (CH_OPAMP, 1.0), (CH_BATTERY, 7.4 / 3.0)],
        VREF,
    );
    let mut supply = build_with_adc(ScriptAdc::new(vec![healthy]), &log);

    supply.step_up(Duration::ZERO).expect("step");
    let before = supply.last_reading();
    assert!(before.opamp_v > 0.0);

    supply.de_energize();
    let after = supply.last_reading();
    assert_eq!(after.position, 0);
    assert_eq!(after.opamp_v, 0.0);
    assert_eq!(after.hv_kv, 0.0);
}
