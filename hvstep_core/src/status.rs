//! Controller status and measurement types.

/// Battery classification derived on every actuation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyState {
    /// Pack is healthy; indicator off.
    Normal,
    /// Pack is low; indicator on, session continues.
    LowBattery,
    /// Pack is critically low; the supply has been de-energized and the
    /// host asked to power down. Terminal for the session.
    Critical,
}

/// Direction of one requested wiper transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Up,
    Down,
}

/// Measurement tuple observed at the end of a step request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReading {
    /// Wiper position after the request.
    pub position: u16,
    /// Amplifier output in volts (divider already undone).
    pub opamp_v: f64,
    /// HV output in kilovolts.
    pub hv_kv: f64,
}

/// Result of one `step_up`/`step_down` request.
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    pub reading: StepReading,
    /// Whether the wiper actually moved; `false` means the request held at
    /// a bound (floor, position cap, or HV ceiling).
    pub stepped: bool,
    pub safety: SafetyState,
}
