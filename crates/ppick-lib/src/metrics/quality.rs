use crate::{detectors::pulse::PulseResult, signal::Trace};
use serde::{Deserialize, Serialize};

/// Minimum peak-to-noise ratio for an unflagged pick.
pub const MIN_PEAK_TO_NOISE: f64 = 3.0;

/// Review hints for an automatic pick. None of these invalidate the result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseQuality {
    /// The onset search landed before the supplied arrival.
    pub onset_before_arrival: bool,
    /// No zero crossing was found; the end is the window close.
    pub end_at_window_close: bool,
    /// Onset and end enclose fewer than two samples.
    pub degenerate_area: bool,
    /// |peak| over the RMS of the pre-arrival segment.
    pub peak_to_noise: Option<f64>,
}

impl PulseQuality {
    pub fn is_acceptable(&self) -> bool {
        !self.onset_before_arrival
            && !self.end_at_window_close
            && !self.degenerate_area
            && self.peak_to_noise.map_or(true, |r| r >= MIN_PEAK_TO_NOISE)
    }
}

/// Assess a result against the trace and the detector's window length.
pub fn assess_pulse(trace: &Trace, result: &PulseResult, search_window: f64) -> PulseQuality {
    let window = trace.window(result.p_arrival, search_window);
    let window_end = window.end_time();
    let end_at_window_close = window_end.map_or(false, |end| result.end_time == end)
        && !window.samples.last().map_or(false, |v| *v == 0.0);
    let enclosed = window
        .times
        .iter()
        .filter(|t| **t >= result.onset_time && **t <= result.end_time)
        .count();

    PulseQuality {
        onset_before_arrival: result.onset_time < result.p_arrival,
        end_at_window_close,
        degenerate_area: enclosed < 2,
        peak_to_noise: pre_arrival_rms(trace, result.p_arrival, search_window)
            .filter(|rms| *rms > 0.0)
            .map(|rms| result.peak_amplitude.abs() / rms),
    }
}

/// RMS of the samples in `[arrival - length, arrival)`.
fn pre_arrival_rms(trace: &Trace, arrival: f64, length: f64) -> Option<f64> {
    let window = trace.window(arrival - length, length);
    let noise: Vec<f64> = window
        .times
        .iter()
        .zip(window.samples)
        .filter(|(t, _)| **t < arrival)
        .map(|(_, v)| *v)
        .collect();
    if noise.is_empty() {
        return None;
    }
    Some((noise.iter().map(|v| v * v).sum::<f64>() / noise.len() as f64).sqrt())
}
