use std::io::Write;

use hvstep_config::{SensorCurve, load_curve_csv};
use rstest::rstest;
use tempfile::NamedTempFile;

fn write_csv(contents: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("tempfile");
    f.write_all(contents.as_bytes()).expect("write csv");
    f
}

#[test]
fn loads_curve_with_unordered_rows_and_gaps() {
    let f = write_csv(
        "power,coefficient\n\
         3,22.3174\n\
         1,1.1951\n\
         8,-0.1137\n",
    );
    let curve = load_curve_csv(f.path()).expect("load curve");
    assert_eq!(curve.coefficients.len(), 9);
    assert_eq!(curve.coefficients[1], 1.1951);
    assert_eq!(curve.coefficients[3], 22.3174);
    assert_eq!(curve.coefficients[8], -0.1137);
    // gaps are zero-filled
    assert_eq!(curve.coefficients[0], 0.0);
    assert_eq!(curve.coefficients[5], 0.0);
}

#[rstest]
#[case("coeff,power\n1,1.0\n", "must have headers")]
#[case("power,coefficient\n", "no data rows")]
#[case("power,coefficient\n2,1.0\n2,3.0\n", "repeats power 2")]
#[case("power,coefficient\n1,NaN\n", "not finite")]
#[case("power,coefficient\n40,1.0\n", "exceeds limit")]
fn rejects_malformed_curve_csv(#[case] contents: &str, #[case] needle: &str) {
    let f = write_csv(contents);
    let err = load_curve_csv(f.path()).expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "error {err} missing needle {needle:?}"
    );
}

#[test]
fn from_rows_matches_csv_loader() {
    let f = write_csv("power,coefficient\n0,0.5\n1,2.0\n");
    let via_csv = load_curve_csv(f.path()).expect("load curve");
    let via_rows = SensorCurve::from_rows(vec![
        hvstep_config::CurveRow {
            power: 0,
            coefficient: 0.5,
        },
        hvstep_config::CurveRow {
            power: 1,
            coefficient: 2.0,
        },
    ])
    .expect("from rows");
    assert_eq!(via_csv, via_rows);
}
