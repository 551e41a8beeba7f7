use crate::{detectors::peaks::Polarity, signal::Trace};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Shape of a synthetic first-motion pulse, for demos and tests.
///
/// The trace is flat until `arrival`, ramps linearly to `peak_amplitude`
/// (signed by `polarity`) at `peak_time`, falls back through zero at
/// `zero_crossing`, then swings into an opposite lobe of
/// `trough_fraction * peak_amplitude` lasting `2 * trough_duration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseSpec {
    pub delta: f64,
    pub npts: usize,
    pub arrival: f64,
    pub peak_time: f64,
    pub peak_amplitude: f64,
    pub polarity: Polarity,
    pub zero_crossing: f64,
    pub trough_fraction: f64,
    pub trough_duration: f64,
    /// Half-width of uniform background noise; `0` for a clean trace.
    pub noise: f64,
    pub network: Option<String>,
    pub station: Option<String>,
    pub channel: Option<String>,
}

impl Default for PulseSpec {
    fn default() -> Self {
        Self {
            delta: 0.01,
            npts: 400,
            arrival: 1.0,
            peak_time: 1.1,
            peak_amplitude: 5.0,
            polarity: Polarity::Positive,
            zero_crossing: 1.3,
            trough_fraction: 0.3,
            trough_duration: 0.1,
            noise: 0.0,
            network: Some("XX".into()),
            station: Some("SYN".into()),
            channel: Some("HHZ".into()),
        }
    }
}

impl PulseSpec {
    /// Noise-free amplitude at trace-local time `t`.
    pub fn amplitude_at(&self, t: f64) -> f64 {
        let amp = self.peak_amplitude * self.polarity.sign();
        let trough = -amp * self.trough_fraction;
        let trough_mid = self.zero_crossing + self.trough_duration;
        let trough_end = trough_mid + self.trough_duration;
        if t <= self.arrival || t >= trough_end {
            0.0
        } else if t <= self.peak_time {
            amp * ramp(self.arrival, self.peak_time, t)
        } else if t <= self.zero_crossing {
            amp * (1.0 - ramp(self.peak_time, self.zero_crossing, t))
        } else if t <= trough_mid {
            trough * ramp(self.zero_crossing, trough_mid, t)
        } else {
            trough * (1.0 - ramp(trough_mid, trough_end, t))
        }
    }
}

fn ramp(from: f64, to: f64, t: f64) -> f64 {
    if to <= from {
        1.0
    } else {
        (t - from) / (to - from)
    }
}

/// Render `spec` into a trace; the same seed always yields the same noise.
pub fn pulse_trace(spec: &PulseSpec, seed: u64) -> Trace {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = (0..spec.npts)
        .map(|i| {
            let clean = spec.amplitude_at(i as f64 * spec.delta);
            if spec.noise > 0.0 {
                clean + rng.gen_range(-spec.noise..=spec.noise)
            } else {
                clean
            }
        })
        .collect();
    let mut trace = Trace::new(spec.delta, data);
    trace.network = spec.network.clone();
    trace.station = spec.station.clone();
    trace.channel = spec.channel.clone();
    trace
}
