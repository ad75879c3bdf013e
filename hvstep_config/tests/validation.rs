use hvstep_config::load_toml;

#[test]
fn empty_toml_uses_rig_defaults_and_validates() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults should pass validation");
    assert_eq!(cfg.step.max_position, 0x101);
    assert_eq!(cfg.channels.battery, 9);
    assert_eq!(cfg.sensor.coefficients.len(), 9);
}

#[test]
fn rejects_critical_threshold_above_warning() {
    let toml = r#"
[battery]
warn_below_v = 6.0
critical_below_v = 6.5
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject inverted thresholds");
    assert!(
        format!("{err}").contains("critical_below_v must be below"),
        "unexpected error: {err}"
    );
}

#[test]
fn rejects_out_of_range_channel() {
    let toml = r#"
[channels]
battery = 12
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject channel >= 10");
    assert!(format!("{err}").contains("channels.battery"), "unexpected error: {err}");
}

#[test]
fn rejects_shared_channels() {
    let toml = r#"
[channels]
opamp = 7
hv = 7
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject duplicate channel");
    assert!(format!("{err}").contains("share channel 7"), "unexpected error: {err}");
}

#[test]
fn rejects_zero_max_position() {
    let toml = r#"
[step]
max_position = 0
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject max_position=0");
    assert!(
        format!("{err}").contains("step.max_position must be >= 1"),
        "unexpected error: {err}"
    );
}

#[test]
fn rejects_bad_sensor_range() {
    let toml = r#"
[sensor]
range = 3
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject range=3");
    assert!(format!("{err}").contains("sensor.range"), "unexpected error: {err}");
}

#[test]
fn rejects_empty_curve() {
    let toml = r#"
[sensor]
coefficients = []
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject empty coefficients");
    assert!(
        format!("{err}").contains("at least one coefficient"),
        "unexpected error: {err}"
    );
}

#[test]
fn accepts_full_rig_config() {
    let toml = r#"
[pins]
amp_enable = 21
amp_led = 20
battery_led = 16
range_a = 19
range_b = 26

[adc]
vref_v = 5.0

[channels]
battery = 9
opamp = 8
hv = 7
current = 3

[step]
max_position = 257
hv_ceiling_kv = 4.0
opamp_gain = 6.0

[battery]
divider = 3.0
warn_below_v = 6.5
critical_below_v = 6.0
grace_s = 5

[rc]
r_series_mohm = 1.5
r_shunt_mohm = 25.0
capacitance_uf = 0.01
factor_up = 5.0
factor_down = 5.0

[sensor]
range = 1
bias_samples = 10
coefficients = [0.0, 1.1951, -7.6319]
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.battery.grace_s, 5);
    assert_eq!(cfg.sensor.coefficients, vec![0.0, 1.1951, -7.6319]);
}
