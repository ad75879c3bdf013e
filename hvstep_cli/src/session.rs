//! Session orchestration: rig assembly, sensor calibration, the interactive
//! step-and-measure loop, and the measurement log file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crossbeam_channel::Receiver;
use eyre::WrapErr;
use thiserror::Error;
use tracing::info;

use hvstep_config::Config;
use hvstep_core::util::{charge_settle, discharge_settle};
use hvstep_core::{SafetyState, StepDirection, Supply, SupplySettings};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("battery critically low; session terminated")]
    CriticalBattery,
    #[error("invalid thrust value after one retry")]
    InvalidThrust,
    #[error("invalid measurement file name")]
    InvalidFileName,
}

/// One unit of operator input: a typed line, or an interrupt (Ctrl-C or a
/// closed stdin). Both arrive on the same channel so a pending prompt can be
/// short-circuited by the interrupt.
pub enum Input {
    Line(String),
    Interrupted,
}

/// Spawn the stdin reader thread and hook Ctrl-C into the same channel.
pub fn input_pump() -> Receiver<Input> {
    let (tx, rx) = crossbeam_channel::unbounded();

    {
        let tx = tx.clone();
        let _ = ctrlc::set_handler(move || {
            let _ = tx.send(Input::Interrupted);
        });
    }

    std::thread::spawn(move || {
        use std::io::BufRead;
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if tx.send(Input::Line(l)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        // stdin closed: treat like an interrupt so prompts unblock.
        let _ = tx.send(Input::Interrupted);
    });

    rx
}

fn next_line(inputs: &Receiver<Input>) -> Option<String> {
    match inputs.recv() {
        Ok(Input::Line(l)) => Some(l),
        Ok(Input::Interrupted) | Err(_) => None,
    }
}

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

enum ThrustInput {
    Value(f64),
    Interrupted,
    Invalid,
}

/// Ask for the thrust reading; one retry on a malformed value, then fatal.
fn read_thrust(inputs: &Receiver<Input>) -> ThrustInput {
    for attempt in 0..2 {
        prompt("Enter the thrust reading (any units) from the electronic scale: ");
        match next_line(inputs) {
            None => return ThrustInput::Interrupted,
            Some(line) => match line.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => return ThrustInput::Value(v),
                _ => {
                    if attempt == 0 {
                        println!();
                        println!(
                            "That was not a number. One more try; a second failure ends the session."
                        );
                    }
                }
            },
        }
    }
    ThrustInput::Invalid
}

/// Resolve the measurement file stem: CLI flag, or an interactive prompt
/// with one retry. `Ok(None)` means the operator chose to quit.
fn resolve_name(
    given: Option<String>,
    inputs: &Receiver<Input>,
) -> eyre::Result<Option<String>> {
    if let Some(n) = given {
        let stem = n.trim().to_string();
        if stem.is_empty() {
            return Err(eyre::Report::new(SessionError::InvalidFileName));
        }
        return Ok(Some(stem));
    }
    for attempt in 0..2 {
        prompt("Enter the file name (without extension) for the measurement data, or q to quit: ");
        match next_line(inputs) {
            None => return Ok(None),
            Some(line) => {
                let stem = line.trim();
                if stem.eq_ignore_ascii_case("q") {
                    return Ok(None);
                }
                if !stem.is_empty() {
                    return Ok(Some(stem.to_string()));
                }
                if attempt == 0 {
                    println!("The file name cannot be empty; one more try.");
                }
            }
        }
    }
    Err(eyre::Report::new(SessionError::InvalidFileName))
}

fn create_measurement_file(dir: &str, stem: &str) -> eyre::Result<(PathBuf, fs::File)> {
    fs::create_dir_all(dir).wrap_err_with(|| format!("create data dir {dir:?}"))?;
    let path = Path::new(dir).join(format!("{stem}.txt"));
    let mut file =
        fs::File::create(&path).wrap_err_with(|| format!("create measurement file {path:?}"))?;
    let stamp = chrono::Local::now().format("%d-%b-%Y %H:%M");
    writeln!(file, "# Stepped HV supply measurement log")?;
    writeln!(file, "# File name: {stem}.txt")?;
    writeln!(file, "# Date and time: {stamp}")?;
    writeln!(
        file,
        "# Columns: OpAmp output (V), HV output (kV), current (uA), thrust (your units)"
    )?;
    writeln!(file, "# Note: Negative values must be treated as invalid")?;
    writeln!(file)?;
    Ok((path, file))
}

#[cfg(feature = "hardware")]
fn assemble(cfg: &Config, settings: SupplySettings) -> eyre::Result<Supply> {
    use hvstep_hardware::{HardwareRigCfg, OutputPins, open_rig};

    let rig_cfg = HardwareRigCfg {
        pot_bus: cfg.spi.pot_bus,
        pot_slave: cfg.spi.pot_slave,
        pot_clock_hz: cfg.spi.pot_clock_hz,
        adc_bus: cfg.spi.adc_bus,
        adc_slave: cfg.spi.adc_slave,
        adc_clock_hz: cfg.spi.adc_clock_hz,
        adc_drdy: cfg.pins.adc_drdy,
        adc_rst: cfg.pins.adc_rst,
        drdy_timeout_ms: 1000,
        pins: OutputPins {
            amp_enable: cfg.pins.amp_enable,
            amp_led: cfg.pins.amp_led,
            battery_led: cfg.pins.battery_led,
            range_a: cfg.pins.range_a,
            range_b: cfg.pins.range_b,
        },
    };
    let (adc, pot, outputs, power) = open_rig(rig_cfg).wrap_err("open hardware rig")?;
    info!("using hardware rig");
    Supply::builder()
        .with_adc(adc)
        .with_pot(pot)
        .with_outputs(outputs)
        .with_power(power)
        .with_settings(settings)
        .build()
}

#[cfg(not(feature = "hardware"))]
fn assemble(_cfg: &Config, settings: SupplySettings) -> eyre::Result<Supply> {
    let rig = hvstep_hardware::SimulatedRig::new(settings.limits.max_position);
    if let Ok(raw) = std::env::var("HVSTEP_SIM_BATTERY_V")
        && let Ok(v) = raw.parse::<f64>()
    {
        rig.set_battery_v(v);
    }
    if let Ok(raw) = std::env::var("HVSTEP_SIM_ADC_FAILS")
        && let Ok(n) = raw.parse::<u32>()
    {
        rig.fail_next_acquires(n);
    }
    info!("using simulated rig");
    Supply::builder()
        .with_adc(rig.adc())
        .with_pot(rig.pot())
        .with_outputs(rig.outputs())
        .with_power(rig.power())
        .with_settings(settings)
        .build()
}

/// Interactive step-and-measure session.
pub fn run_session(
    cfg: &Config,
    curve: Option<hvstep_config::SensorCurve>,
    name: Option<String>,
    skip_discharge: bool,
) -> eyre::Result<()> {
    let mut settings = SupplySettings::from(cfg);
    if let Some(c) = curve {
        settings.curve = (&c).into();
    }
    let sensor_range = settings.sensor.range;
    let mut supply = assemble(cfg, settings)?;
    let inputs = input_pump();

    supply.begin().wrap_err("initial safe state")?;

    if skip_discharge {
        info!("initial discharge wait skipped");
    } else {
        let wait = discharge_settle(&cfg.rc);
        println!(
            "Wait for the initial safety discharge of the capacitor... {:.3} s",
            wait.as_secs_f64()
        );
        std::thread::sleep(wait);
    }

    println!("Calibrating the current sensor...");
    supply.select_range(sensor_range)?;
    let bias_v = supply.calibrate_bias()?;
    println!("Bias voltage measured at the current sensor output = {bias_v:.4} V");

    let Some(stem) = resolve_name(name, &inputs)? else {
        supply.de_energize();
        println!("Session ended before any measurement.");
        return Ok(());
    };
    let (path, mut file) = create_measurement_file(&cfg.session.data_dir, &stem)?;
    info!(path = %path.display(), "measurement file created");

    supply.set_amplifier(true)?;
    println!();
    println!("Type u + Enter to raise the voltage one step, d + Enter to lower it, q + Enter to stop.");
    println!("After each command, wait for the readings before the next one.");
    println!("You will be asked for the thrust value from the electronic scale after every step.");
    println!();

    let settle_up = charge_settle(&cfg.rc);
    let settle_down = discharge_settle(&cfg.rc);

    loop {
        let Some(line) = next_line(&inputs) else {
            println!("The session was interrupted.");
            break;
        };
        let direction = match line.trim() {
            "u" | "U" => StepDirection::Up,
            "d" | "D" => StepDirection::Down,
            "q" | "Q" => {
                println!("The session has been ended by your request.");
                break;
            }
            "" => continue,
            other => {
                println!("Unrecognized command {other:?}; use u, d, or q.");
                continue;
            }
        };

        let outcome = match direction {
            StepDirection::Up => supply.step_up(settle_up)?,
            StepDirection::Down => supply.step_down(settle_down)?,
        };
        if outcome.safety == SafetyState::Critical {
            return Err(eyre::Report::new(SessionError::CriticalBattery));
        }
        if !outcome.stepped {
            println!("Held: the output is at its limit for this direction.");
        }
        println!("Op Amp output = {:.4} V", outcome.reading.opamp_v);
        println!("Actual HV output = {:.4} kV", outcome.reading.hv_kv);

        let current_ua = supply.measure_current(bias_v)?;
        println!("Current through the capacitor = {current_ua:.4} uA");

        let thrust = match read_thrust(&inputs) {
            ThrustInput::Value(v) => v,
            ThrustInput::Interrupted => {
                println!("The session was interrupted.");
                break;
            }
            ThrustInput::Invalid => {
                supply.de_energize();
                return Err(eyre::Report::new(SessionError::InvalidThrust));
            }
        };

        writeln!(
            file,
            "{:.6} {:.6} {:.6} {:.6}",
            outcome.reading.opamp_v, outcome.reading.hv_kv, current_ua, thrust
        )?;
        println!();
    }

    supply.de_energize();
    println!("Warning: wait until the capacitor is fully discharged before disconnecting it.");
    Ok(())
}

/// Build the rig, take one frame, report the observed voltages.
pub fn self_check(cfg: &Config) -> eyre::Result<()> {
    let settings = SupplySettings::from(cfg);
    let channels = settings.channels;
    let opamp_gain = settings.limits.opamp_gain;
    let divider = settings.battery.divider;
    let mut supply = assemble(cfg, settings)?;

    supply.begin()?;
    let battery_v = supply.read_voltage(channels.battery)? * divider;
    let opamp_v = supply.read_voltage(channels.opamp)? * opamp_gain;
    let hv_kv = supply.read_voltage(channels.hv)?;
    println!("battery = {battery_v:.3} V, opamp = {opamp_v:.3} V, hv = {hv_kv:.3} kV");
    supply.de_energize();
    println!("self-check ok");
    Ok(())
}
