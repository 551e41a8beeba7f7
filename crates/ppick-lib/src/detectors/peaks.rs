use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fraction of the window's absolute maximum a peak must reach to count.
pub const PEAK_SIGNIFICANCE: f64 = 0.1;

/// Initial direction of ground motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Positive => "positive",
            Polarity::Negative => "negative",
        }
    }

    /// `+1.0` or `-1.0`, as stored in numeric header fields.
    pub fn sign(&self) -> f64 {
        match self {
            Polarity::Positive => 1.0,
            Polarity::Negative => -1.0,
        }
    }

    pub fn from_sign(value: f64) -> Option<Self> {
        if value > 0.0 {
            Some(Polarity::Positive)
        } else if value < 0.0 {
            Some(Polarity::Negative)
        } else {
            None
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Polarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" | "+" | "up" => Ok(Polarity::Positive),
            "negative" | "-" | "down" => Ok(Polarity::Negative),
            other => Err(format!("unknown polarity: {}", other)),
        }
    }
}

/// The dominant excursion of an analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Signed amplitude; negative for a negative-polarity peak
    pub amplitude: f64,
    /// Trace-local time
    pub time: f64,
    /// Index inside the analysis window
    pub index: usize,
    pub polarity: Polarity,
}

/// Indices of strict local maxima. A flat-topped maximum reports the middle
/// of its plateau (rounded down); the first and last samples never qualify.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut out = Vec::new();
    if x.len() < 3 {
        return out;
    }
    let i_max = x.len() - 1;
    let mut i = 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < i_max && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                out.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    out
}

/// Local maxima whose value is at least `height`.
pub fn find_peaks(x: &[f64], height: f64) -> Vec<usize> {
    local_maxima(x)
        .into_iter()
        .filter(|&i| x[i] >= height)
        .collect()
}

/// Pick the earliest significant positive or negative excursion.
///
/// Both polarities are searched independently against a threshold of
/// [`PEAK_SIGNIFICANCE`] times the window's absolute maximum. The one that
/// comes first wins; positive wins a tie.
pub fn locate_dominant_peak(samples: &[f64], times: &[f64]) -> Option<Peak> {
    if samples.is_empty() {
        return None;
    }
    let abs_max = samples.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let height = abs_max * PEAK_SIGNIFICANCE;

    let first_pos = find_peaks(samples, height).first().copied();
    let negated: Vec<f64> = samples.iter().map(|v| -v).collect();
    let first_neg = find_peaks(&negated, height).first().copied();
    debug!(
        "peak search: height={:.6e} first_pos={:?} first_neg={:?}",
        height, first_pos, first_neg
    );

    let (index, polarity) = match (first_pos, first_neg) {
        (Some(pos), Some(neg)) if pos <= neg => (pos, Polarity::Positive),
        (Some(pos), None) => (pos, Polarity::Positive),
        (_, Some(neg)) => (neg, Polarity::Negative),
        (None, None) => return None,
    };
    Some(Peak {
        amplitude: samples[index],
        time: times[index],
        index,
        polarity,
    })
}
