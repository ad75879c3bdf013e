use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use assert_cmd::Command;
use tempfile::tempdir;

// Build a minimal valid TOML config for sim mode: near-instant settle waits,
// no battery grace so the critical-path test stays fast, and a per-test
// data directory.
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let data_dir = dir.path().join("data");
    let toml = format!(
        r#"
[battery]
divider = 3.0
warn_below_v = 6.5
critical_below_v = 6.0
grace_s = 0

[rc]
r_series_mohm = 0.001
r_shunt_mohm = 0.001
capacitance_uf = 0.001
factor_up = 1.0
factor_down = 1.0

[session]
data_dir = "{}"
"#,
        data_dir.display()
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn hvstep(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("hvstep_cli").unwrap();
    cmd.arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = hvstep(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    hvstep(&cfg)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn session_steps_measures_and_logs_one_row() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    hvstep(&cfg)
        .args(["run", "--name", "trial", "--skip-discharge"])
        .write_stdin("u\n0.25\nq\n")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Bias voltage measured"))
        .stdout(predicate::str::contains("Current through the capacitor"))
        .stdout(predicate::str::contains("ended by your request"));

    let log = fs::read_to_string(dir.path().join("data/trial.txt")).expect("measurement file");
    let rows: Vec<&str> = log
        .lines()
        .filter(|l| !l.starts_with('#') && !l.trim().is_empty())
        .collect();
    assert_eq!(rows.len(), 1, "one accepted step -> one row:\n{log}");
    let cols: Vec<f64> = rows[0]
        .split_whitespace()
        .map(|c| c.parse().expect("numeric column"))
        .collect();
    assert_eq!(cols.len(), 4);
    assert!((cols[3] - 0.25).abs() < 1e-9, "thrust column: {}", cols[3]);
}

#[test]
fn second_bad_thrust_value_ends_the_session_safely() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    hvstep(&cfg)
        .args(["run", "--name", "bad", "--skip-discharge"])
        .write_stdin("u\nabc\nxyz\n")
        .assert()
        .code(5)
        .stderr(predicate::str::contains("thrust"));
}

#[test]
fn critical_battery_exits_with_the_battery_code() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    hvstep(&cfg)
        .args(["run", "--name", "batt", "--skip-discharge"])
        .env("HVSTEP_SIM_BATTERY_V", "5.5")
        .write_stdin("u\n")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Battery"));
}

#[test]
fn acquisition_failure_is_fatal_before_any_actuation() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    hvstep(&cfg)
        .args(["run", "--name", "adc", "--skip-discharge"])
        .env("HVSTEP_SIM_ADC_FAILS", "50")
        .write_stdin("u\n")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("de-energized"));
}

#[test]
fn quitting_at_the_name_prompt_is_clean() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    hvstep(&cfg)
        .args(["run", "--skip-discharge"])
        .write_stdin("q\n")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Session ended before any measurement"));
}

#[test]
fn curve_csv_override_is_accepted() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let curve = dir.path().join("curve.csv");
    fs::write(&curve, "power,coefficient\n1,1.0\n").unwrap();

    hvstep(&cfg)
        .arg("--curve")
        .arg(&curve)
        .args(["run", "--name", "curved", "--skip-discharge"])
        .write_stdin("u\n0.0\nq\n")
        .assert()
        .code(0);
}

#[test]
fn malformed_curve_csv_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let curve = dir.path().join("curve.csv");
    fs::write(&curve, "coeff,power\n1,1.0\n").unwrap();

    hvstep(&cfg)
        .arg("--curve")
        .arg(&curve)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("power,coefficient"));
}
