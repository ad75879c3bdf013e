#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and sensor-curve parsing for the stepped HV supply.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The current-sensor calibration curve can come from the TOML
//!   `[sensor].coefficients` array or from a CSV table loaded with
//!   `load_curve_csv` (strict `power,coefficient` header).
use serde::Deserialize;

/// GPIO output pin assignments (BCM numbering).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pins {
    /// Enables the 15 V amplifier stage.
    pub amp_enable: u8,
    /// Red LED paired with the amplifier enable.
    pub amp_led: u8,
    /// Red LED for the low-battery warning.
    pub battery_led: u8,
    /// Current-sensor range selector, range 1.
    pub range_a: u8,
    /// Current-sensor range selector, range 2.
    pub range_b: u8,
    /// ADC conversion-ready input.
    pub adc_drdy: u8,
    /// ADC reset output.
    pub adc_rst: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            amp_enable: 21,
            amp_led: 20,
            battery_led: 16,
            range_a: 19,
            range_b: 26,
            adc_drdy: 17,
            adc_rst: 18,
        }
    }
}

/// SPI bus assignments for the potentiometer and the ADC.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SpiCfg {
    pub pot_bus: u8,
    pub pot_slave: u8,
    pub pot_clock_hz: u32,
    pub adc_bus: u8,
    pub adc_slave: u8,
    pub adc_clock_hz: u32,
}

impl Default for SpiCfg {
    fn default() -> Self {
        Self {
            pot_bus: 0,
            pot_slave: 1,
            pot_clock_hz: 976_000,
            adc_bus: 0,
            adc_slave: 0,
            adc_clock_hz: 2_000_000,
        }
    }
}

/// ADC constants.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AdcCfg {
    /// Reference voltage of the acquisition HAT in volts.
    pub vref_v: f64,
}

impl Default for AdcCfg {
    fn default() -> Self {
        Self { vref_v: 5.0 }
    }
}

/// ADC channel assignments for the physical quantities.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Channels {
    /// Battery voltage (behind a 1/3 divider and 5 V buffer).
    pub battery: usize,
    /// Amplifier output (behind a 1/3 divider and 5 V buffer).
    pub opamp: usize,
    /// HV output (behind a 1/1000 divider, so decoded volts read as kV).
    pub hv: usize,
    /// Current-sensor output.
    pub current: usize,
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            battery: 9,
            opamp: 8,
            hv: 7,
            current: 3,
        }
    }
}

/// Step-controller bounds and scaling.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct StepCfg {
    /// Highest addressable wiper position, inclusive.
    pub max_position: u16,
    /// Safety ceiling on the HV output in kilovolts; step-up holds above it.
    pub hv_ceiling_kv: f64,
    /// Multiplier undoing the amplifier-output divider (1/3 divider on a
    /// 15 V rail, measured against a 5 V buffer -> 6.0).
    pub opamp_gain: f64,
}

impl Default for StepCfg {
    fn default() -> Self {
        Self {
            max_position: 0x101,
            hv_ceiling_kv: 4.0,
            opamp_gain: 6.0,
        }
    }
}

/// Battery policy thresholds (volts at the pack, after undoing the divider).
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct BatteryCfg {
    /// Multiplier undoing the battery divider.
    pub divider: f64,
    /// Below this the low-battery indicator turns on.
    pub warn_below_v: f64,
    /// Below this the session terminates and the host powers down.
    pub critical_below_v: f64,
    /// Observation window before a critical shutdown proceeds, in seconds.
    pub grace_s: u64,
}

impl Default for BatteryCfg {
    fn default() -> Self {
        Self {
            divider: 3.0,
            warn_below_v: 6.5,
            critical_below_v: 6.0,
            grace_s: 5,
        }
    }
}

/// RC network of the load; the orchestrator turns these into settle times.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct RcCfg {
    /// Series resistance in megaohms.
    pub r_series_mohm: f64,
    /// Shunt resistance across the load in megaohms.
    pub r_shunt_mohm: f64,
    /// Load capacitance in microfarads.
    pub capacitance_uf: f64,
    /// Settle wait is `factor_up * tau_up` after a step up.
    pub factor_up: f64,
    /// Settle wait is `factor_down * tau_down` after a step down.
    pub factor_down: f64,
}

impl Default for RcCfg {
    fn default() -> Self {
        Self {
            r_series_mohm: 1.5,
            r_shunt_mohm: 25.0,
            capacitance_uf: 0.01,
            factor_up: 5.0,
            factor_down: 5.0,
        }
    }
}

/// Current-sensor setup, including its calibration polynomial.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorCfg {
    /// Hardware range selector: 1 or 2.
    pub range: u8,
    /// Number of back-to-back idle samples averaged into the bias offset.
    pub bias_samples: u32,
    /// Polynomial coefficients in ascending powers of (volts - bias); output
    /// is microamperes. Overridden by a `--curve` CSV when given.
    pub coefficients: Vec<f64>,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            range: 1,
            bias_samples: 10,
            // Shipped calibration for the CS-1 sensor, x^0 .. x^8.
            coefficients: vec![
                0.0,
                1.195_100_092_281_8,
                -7.631_926_068_674_2,
                22.317_456_636_728_3,
                -28.448_512_253_201,
                19.432_571_836_044_6,
                -7.327_866_806_548_7,
                1.434_316_816_931_9,
                -0.113_725_044_978_03,
            ],
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    /// Path to a .log file (JSON lines); console-only when absent.
    pub file: Option<String>,
    /// "error" | "warn" | "info" | "debug" | "trace".
    pub level: Option<String>,
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never).
    pub rotation: Option<String>,
}

/// Session orchestration defaults.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionCfg {
    /// Directory measurement files are written into.
    pub data_dir: String,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            data_dir: ".".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub spi: SpiCfg,
    pub adc: AdcCfg,
    pub channels: Channels,
    pub step: StepCfg,
    pub battery: BatteryCfg,
    pub rc: RcCfg,
    pub sensor: SensorCfg,
    pub logging: Logging,
    pub session: SessionCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Usable ADC channel indices are 0..=9 on this HAT.
const CHANNEL_LIMIT: usize = 10;
/// Cap on the polynomial length (degree 15); calibrations beyond this are
/// almost certainly data-entry mistakes.
const CURVE_LEN_LIMIT: usize = 16;

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // ADC
        if !(self.adc.vref_v.is_finite() && self.adc.vref_v > 0.0) {
            eyre::bail!("adc.vref_v must be a positive voltage");
        }

        // Channels
        let chans = [
            ("channels.battery", self.channels.battery),
            ("channels.opamp", self.channels.opamp),
            ("channels.hv", self.channels.hv),
            ("channels.current", self.channels.current),
        ];
        for (name, ch) in chans {
            if ch >= CHANNEL_LIMIT {
                eyre::bail!("{name} must be < {CHANNEL_LIMIT}, got {ch}");
            }
        }
        for i in 0..chans.len() {
            for j in (i + 1)..chans.len() {
                if chans[i].1 == chans[j].1 {
                    eyre::bail!("{} and {} share channel {}", chans[i].0, chans[j].0, chans[i].1);
                }
            }
        }

        // Step bounds
        if self.step.max_position == 0 {
            eyre::bail!("step.max_position must be >= 1");
        }
        if self.step.max_position > 1024 {
            eyre::bail!("step.max_position is unreasonably large (>1024)");
        }
        if !(self.step.hv_ceiling_kv.is_finite() && self.step.hv_ceiling_kv > 0.0) {
            eyre::bail!("step.hv_ceiling_kv must be a positive voltage");
        }
        if !(self.step.opamp_gain.is_finite() && self.step.opamp_gain > 0.0) {
            eyre::bail!("step.opamp_gain must be > 0");
        }

        // Battery policy
        if !(self.battery.divider.is_finite() && self.battery.divider > 0.0) {
            eyre::bail!("battery.divider must be > 0");
        }
        if !self.battery.warn_below_v.is_finite() || !self.battery.critical_below_v.is_finite() {
            eyre::bail!("battery thresholds must be finite");
        }
        if self.battery.critical_below_v >= self.battery.warn_below_v {
            eyre::bail!("battery.critical_below_v must be below battery.warn_below_v");
        }
        if self.battery.grace_s > 60 {
            eyre::bail!("battery.grace_s is unreasonably large (>60s)");
        }

        // RC network
        let rc = [
            ("rc.r_series_mohm", self.rc.r_series_mohm),
            ("rc.r_shunt_mohm", self.rc.r_shunt_mohm),
            ("rc.capacitance_uf", self.rc.capacitance_uf),
            ("rc.factor_up", self.rc.factor_up),
            ("rc.factor_down", self.rc.factor_down),
        ];
        for (name, v) in rc {
            if !(v.is_finite() && v > 0.0) {
                eyre::bail!("{name} must be > 0");
            }
        }

        // Sensor
        if !matches!(self.sensor.range, 1 | 2) {
            eyre::bail!("sensor.range must be 1 or 2");
        }
        if self.sensor.bias_samples == 0 {
            eyre::bail!("sensor.bias_samples must be >= 1");
        }
        if self.sensor.bias_samples > 1000 {
            eyre::bail!("sensor.bias_samples is unreasonably large (>1000)");
        }
        validate_coefficients(&self.sensor.coefficients)?;

        Ok(())
    }
}

fn validate_coefficients(coeffs: &[f64]) -> eyre::Result<()> {
    if coeffs.is_empty() {
        eyre::bail!("sensor curve needs at least one coefficient");
    }
    if coeffs.len() > CURVE_LEN_LIMIT {
        eyre::bail!(
            "sensor curve has {} coefficients, limit is {CURVE_LEN_LIMIT}",
            coeffs.len()
        );
    }
    if let Some(idx) = coeffs.iter().position(|c| !c.is_finite()) {
        eyre::bail!("sensor curve coefficient for x^{idx} is not finite");
    }
    Ok(())
}

/// Sensor-curve CSV schema.
///
/// Expected headers:
/// power,coefficient
///
/// Example:
/// power,coefficient
/// 1,1.1951
/// 2,-7.6319
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CurveRow {
    pub power: u8,
    pub coefficient: f64,
}

/// Calibration polynomial for a current sensor, ascending powers.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorCurve {
    pub coefficients: Vec<f64>,
}

impl SensorCurve {
    /// Build the curve from CSV rows. Powers may arrive in any order; gaps
    /// are zero-filled, duplicates are rejected.
    pub fn from_rows(rows: Vec<CurveRow>) -> eyre::Result<Self> {
        if rows.is_empty() {
            eyre::bail!("sensor curve CSV has no data rows");
        }
        let max_power = rows.iter().map(|r| usize::from(r.power)).max().unwrap_or(0);
        if max_power >= CURVE_LEN_LIMIT {
            eyre::bail!("sensor curve power {max_power} exceeds limit {}", CURVE_LEN_LIMIT - 1);
        }
        let mut coefficients = vec![0.0f64; max_power + 1];
        let mut seen = vec![false; max_power + 1];
        for row in rows {
            let p = usize::from(row.power);
            if seen[p] {
                eyre::bail!("sensor curve CSV repeats power {p}");
            }
            if !row.coefficient.is_finite() {
                eyre::bail!("sensor curve coefficient for x^{p} is not finite");
            }
            seen[p] = true;
            coefficients[p] = row.coefficient;
        }
        Ok(Self { coefficients })
    }
}

impl TryFrom<Vec<CurveRow>> for SensorCurve {
    type Error = eyre::Report;
    fn try_from(rows: Vec<CurveRow>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

pub fn load_curve_csv(path: &std::path::Path) -> eyre::Result<SensorCurve> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open sensor curve CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["power", "coefficient"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "sensor curve CSV must have headers 'power,coefficient', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CurveRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    SensorCurve::from_rows(rows)
}
