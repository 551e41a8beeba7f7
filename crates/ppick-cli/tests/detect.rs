use assert_cmd::cargo::cargo_bin_cmd;
use ppick_lib::{
    metrics::quality::PulseQuality,
    synth::{pulse_trace, PulseSpec},
    Polarity,
};
use serde::Deserialize;
use std::{error::Error, fs, path::Path};

#[derive(Deserialize)]
struct DetectOutput {
    station_id: Option<String>,
    p_arrival: f64,
    onset_time: f64,
    end_time: f64,
    peak_amplitude: f64,
    peak_time: f64,
    polarity: Polarity,
    pulse_area: f64,
    quality: PulseQuality,
}

#[derive(Deserialize)]
struct DetectFailure {
    error: String,
    message: String,
}

fn synth_sac(path: &Path, extra: &[&str]) {
    let mut cmd = cargo_bin_cmd!("ppick");
    cmd.args(["synth", "--out", path.to_str().expect("utf8 path")]);
    cmd.args(extra);
    cmd.assert().success();
}

#[test]
fn detects_pulse_from_sac_header_arrival() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let sac = dir.path().join("XX.SYN.HHZ.SAC");
    synth_sac(&sac, &["--begin", "-2.5"]);

    let mut cmd = cargo_bin_cmd!("ppick");
    cmd.args(["detect", "--sac", sac.to_str().expect("utf8 path")]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let out: DetectOutput = serde_json::from_slice(&output)?;

    assert_eq!(out.station_id.as_deref(), Some("XX.SYN"));
    assert_eq!(out.polarity, Polarity::Positive);
    assert_close(out.p_arrival, 1.0, 1e-9);
    assert_close(out.onset_time, 1.01, 1e-9);
    assert_close(out.peak_time, 1.1, 1e-9);
    assert_close(out.peak_amplitude, 5.0, 1e-5);
    assert_close(out.end_time, 1.3, 0.01);
    assert_close(out.pulse_area, 0.7475, 0.01);
    assert!(out.onset_time <= out.peak_time && out.peak_time <= out.end_time);
    assert!(out.quality.is_acceptable());
    Ok(())
}

#[test]
fn detects_negative_pulse_from_stdin_samples() -> Result<(), Box<dyn Error>> {
    let spec = PulseSpec {
        polarity: Polarity::Negative,
        ..PulseSpec::default()
    };
    let samples: String = pulse_trace(&spec, 0)
        .data
        .iter()
        .map(|v| format!("{}\n", v))
        .collect();

    let mut cmd = cargo_bin_cmd!("ppick");
    cmd.args(["detect", "--delta", "0.01", "--arrival", "1.0"])
        .write_stdin(samples);
    let output = cmd.assert().success().get_output().stdout.clone();
    let out: DetectOutput = serde_json::from_slice(&output)?;

    assert_eq!(out.station_id, None);
    assert_eq!(out.polarity, Polarity::Negative);
    assert_close(out.peak_amplitude, -5.0, 1e-9);
    assert!(out.pulse_area < 0.0);
    Ok(())
}

#[test]
fn missing_arrival_reports_reason_and_fails() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let sac = dir.path().join("XX.SYN.HHZ.SAC");
    synth_sac(&sac, &["--no-pick"]);

    let mut cmd = cargo_bin_cmd!("ppick");
    cmd.args(["detect", "--sac", sac.to_str().expect("utf8 path")]);
    let output = cmd.assert().code(2).get_output().stdout.clone();
    let failure: DetectFailure = serde_json::from_slice(&output)?;
    assert_eq!(failure.error, "invalid_arrival");
    assert!(!failure.message.is_empty());
    Ok(())
}

#[test]
fn arrival_past_trace_end_is_an_empty_window() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("ppick");
    cmd.args(["detect", "--delta", "0.1", "--arrival", "10"])
        .write_stdin("0\n1\n0\n");
    let output = cmd.assert().code(2).get_output().stdout.clone();
    let failure: DetectFailure = serde_json::from_slice(&output)?;
    assert_eq!(failure.error, "empty_window");
    Ok(())
}

#[test]
fn flat_window_has_no_peak() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("ppick");
    cmd.args(["detect", "--delta", "0.1", "--arrival", "0"])
        .write_stdin("0\n0\n0\n0\n");
    let output = cmd.assert().code(2).get_output().stdout.clone();
    let failure: DetectFailure = serde_json::from_slice(&output)?;
    assert_eq!(failure.error, "no_peak_found");
    Ok(())
}

#[test]
fn config_file_shortens_the_search_window() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let sac = dir.path().join("XX.SYN.HHZ.SAC");
    synth_sac(&sac, &[]);
    let config = dir.path().join("picker.toml");
    fs::write(&config, "[detector]\nsearch_window = 0.2\n")?;

    let mut cmd = cargo_bin_cmd!("ppick");
    cmd.args([
        "--config",
        config.to_str().expect("utf8 path"),
        "detect",
        "--sac",
        sac.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let out: DetectOutput = serde_json::from_slice(&output)?;
    // the zero crossing at 1.3 lies beyond the window
    assert_close(out.end_time, 1.2, 1e-9);
    assert!(out.quality.end_at_window_close);
    assert!(!out.quality.is_acceptable());
    Ok(())
}

#[test]
fn invalid_config_is_rejected() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("picker.toml");
    fs::write(&config, "[detector]\nthreshold_fraction = 1.5\n")?;

    let mut cmd = cargo_bin_cmd!("ppick");
    cmd.args([
        "--config",
        config.to_str().expect("utf8 path"),
        "detect",
        "--delta",
        "0.1",
        "--arrival",
        "0",
    ])
    .write_stdin("0\n1\n0\n");
    cmd.assert().failure();
    Ok(())
}

fn assert_close(a: f64, b: f64, tol: f64) {
    let diff = (a - b).abs();
    assert!(
        diff <= tol,
        "diff {} exceeded tol {} ({} vs {})",
        diff,
        tol,
        a,
        b
    );
}
