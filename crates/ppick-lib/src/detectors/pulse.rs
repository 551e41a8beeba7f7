use crate::{
    detectors::peaks::{locate_dominant_peak, Peak, Polarity},
    error::DetectError,
    signal::Trace,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Header value meaning "not set" in SAC files.
pub const UNDEFINED_SENTINEL: f64 = -12345.0;

/// Tunable parameters of the pulse pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Fraction of the peak amplitude below which the signal counts as quiet
    /// when searching back for the onset.
    pub threshold_fraction: f64,
    /// Length of the analysis window after the arrival (seconds).
    pub search_window: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_fraction: 0.05,
            search_window: 1.0,
        }
    }
}

/// Features of one detected P-wave pulse, all in trace-local seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseResult {
    pub p_arrival: f64,
    pub onset_time: f64,
    pub end_time: f64,
    pub peak_amplitude: f64,
    pub peak_time: f64,
    pub polarity: Polarity,
    pub pulse_area: f64,
}

/// Stateless pulse detector; one instance can serve any number of traces.
#[derive(Debug, Clone, Copy, Default)]
pub struct PulseDetector {
    config: DetectorConfig,
}

impl PulseDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run window → peak → onset → end → area on one trace.
    pub fn detect(&self, trace: &Trace, p_arrival: f64) -> Result<PulseResult, DetectError> {
        if !is_defined_arrival(p_arrival) {
            return Err(DetectError::InvalidArrival);
        }
        let window = trace.window(p_arrival, self.config.search_window);
        if window.is_empty() {
            return Err(DetectError::EmptyWindow);
        }
        debug!(
            "window: samples {}..{} ({} points) from arrival {:.4}",
            window.offset,
            window.offset + window.len() - 1,
            window.len(),
            p_arrival
        );

        let peak = locate_dominant_peak(window.samples, &window.times)
            .ok_or(DetectError::NoPeakFound)?;
        debug!(
            "dominant peak: {} {:.6e} at {:.4}",
            peak.polarity, peak.amplitude, peak.time
        );

        let onset_time = detect_onset(
            window.samples,
            &window.times,
            &peak,
            self.config.threshold_fraction,
        )
        .unwrap_or_else(|| {
            warn!("onset search exhausted; falling back to arrival {:.4}", p_arrival);
            p_arrival
        });
        let end_time = detect_zero_crossing(window.samples, &window.times, &peak)
            .unwrap_or_else(|| {
                let last = window.times[window.times.len() - 1];
                warn!("no zero crossing after peak; falling back to window end {:.4}", last);
                last
            });
        let pulse_area = pulse_area(window.samples, &window.times, onset_time, end_time);
        debug!(
            "onset {:.4} end {:.4} area {:.6e}",
            onset_time, end_time, pulse_area
        );

        Ok(PulseResult {
            p_arrival,
            onset_time,
            end_time,
            peak_amplitude: peak.amplitude,
            peak_time: peak.time,
            polarity: peak.polarity,
            pulse_area,
        })
    }

    /// Like [`detect`](Self::detect) for callers holding an optional header pick.
    pub fn detect_opt(
        &self,
        trace: &Trace,
        p_arrival: Option<f64>,
    ) -> Result<PulseResult, DetectError> {
        let arrival = p_arrival.ok_or(DetectError::InvalidArrival)?;
        self.detect(trace, arrival)
    }
}

/// Finite and not the "undefined" header sentinel.
pub fn is_defined_arrival(value: f64) -> bool {
    value.is_finite() && value != UNDEFINED_SENTINEL
}

/// Walk back from the peak to the last sample still below
/// `|peak| * threshold_fraction`; the onset is the sample right after it.
///
/// `None` when every sample from the peak back to the window start is loud.
pub fn detect_onset(
    samples: &[f64],
    times: &[f64],
    peak: &Peak,
    threshold_fraction: f64,
) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let threshold = peak.amplitude.abs() * threshold_fraction;
    let start = peak.index.min(samples.len() - 1);
    (0..=start)
        .rev()
        .find(|&i| samples[i].abs() < threshold)
        .map(|i| times[(i + 1).min(times.len() - 1)])
}

/// First sign change at or after the peak, interpolated linearly.
///
/// `None` when the signal keeps its sign until the window closes.
pub fn detect_zero_crossing(samples: &[f64], times: &[f64], peak: &Peak) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    (peak.index..samples.len() - 1)
        .find(|&i| sign(samples[i]) != sign(samples[i + 1]))
        .map(|i| interpolate_zero_crossing(times[i], samples[i], times[i + 1], samples[i + 1]))
}

/// Time where the segment `(t0, y0)–(t1, y1)` crosses zero. Equal
/// amplitudes have no unique crossing, so `t0` is returned.
pub fn interpolate_zero_crossing(t0: f64, y0: f64, t1: f64, y1: f64) -> f64 {
    if y1 == y0 {
        return t0;
    }
    t0 + (0.0 - y0) * (t1 - t0) / (y1 - y0)
}

/// Trapezoidal integral of the samples whose time lies in `[onset, end]`.
/// An empty selection integrates to zero.
pub fn pulse_area(samples: &[f64], times: &[f64], onset: f64, end: f64) -> f64 {
    let selected: Vec<(f64, f64)> = times
        .iter()
        .zip(samples)
        .filter(|(t, _)| **t >= onset && **t <= end)
        .map(|(t, y)| (*t, *y))
        .collect();
    trapezoid(&selected)
}

fn trapezoid(points: &[(f64, f64)]) -> f64 {
    points
        .windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) * 0.5)
        .sum()
}

/// Three-valued sign: zero is its own class.
fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}
