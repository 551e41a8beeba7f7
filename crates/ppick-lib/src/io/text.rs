use crate::signal::Trace;
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Relative spread allowed between consecutive sample intervals.
const SPACING_TOLERANCE: f64 = 1e-6;

/// Parse newline-delimited samples, ignoring blank/comment lines.
///
/// Each line holds either one amplitude or a `time amplitude` pair
/// (whitespace or comma separated). Single-column input needs `delta`;
/// two-column input derives it and must be uniformly spaced, with the first
/// time becoming the trace's `begin`.
pub fn parse_trace(text: &str, delta: Option<f64>) -> Result<Trace> {
    let mut times = Vec::new();
    let mut data = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<f64> = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .map(|f| f.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("line {} is not numeric: {}", idx + 1, trimmed))?;
        match fields.as_slice() {
            [y] => data.push(*y),
            [t, y] => {
                times.push(*t);
                data.push(*y);
            }
            _ => bail!("line {} has {} columns, expected 1 or 2", idx + 1, fields.len()),
        }
    }
    if data.is_empty() {
        bail!("no numeric samples found");
    }
    if times.is_empty() {
        let delta = delta.context("single-column input needs a sampling interval")?;
        if !(delta > 0.0) {
            bail!("sampling interval must be positive, got {}", delta);
        }
        return Ok(Trace::new(delta, data));
    }
    if times.len() != data.len() {
        bail!("mixed one- and two-column lines");
    }
    if times.len() < 2 {
        bail!("two-column input needs at least two samples");
    }
    let step = times[1] - times[0];
    if !(step > 0.0) {
        bail!("time column must increase");
    }
    for (i, pair) in times.windows(2).enumerate() {
        let dt = pair[1] - pair[0];
        if (dt - step).abs() > step * SPACING_TOLERANCE {
            bail!("sample {} breaks uniform spacing ({} vs {})", i + 1, dt, step);
        }
    }
    let mut trace = Trace::new(step, data);
    trace.begin = times[0];
    Ok(trace)
}

/// Read a trace from a newline-delimited text file.
pub fn read_trace(path: &Path, delta: Option<f64>) -> Result<Trace> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_trace(&text, delta).with_context(|| format!("parsing {}", path.display()))
}
