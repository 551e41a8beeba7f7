use serde::{Deserialize, Serialize};

/// Sample-index slack used when mapping window bounds onto the sample grid.
const GRID_TOLERANCE: f64 = 1e-9;

/// Uniformly sampled single-component trace.
///
/// Sample `i` sits at trace-local time `i * delta`. `begin` is the offset of
/// the first sample from the recording's reference time and is only needed
/// when converting to or from header times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Sampling interval in seconds
    pub delta: f64,
    /// Reference-time offset of the first sample (SAC `b`)
    #[serde(default)]
    pub begin: f64,
    /// Samples
    pub data: Vec<f64>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub station: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

impl Trace {
    pub fn new(delta: f64, data: Vec<f64>) -> Self {
        Self {
            delta,
            begin: 0.0,
            data,
            network: None,
            station: None,
            channel: None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn sampling_rate(&self) -> f64 {
        1.0 / self.delta
    }
    pub fn time_at(&self, index: usize) -> f64 {
        index as f64 * self.delta
    }
    /// Trace-local time of the last sample, `None` for an empty trace.
    pub fn end_time(&self) -> Option<f64> {
        self.data.len().checked_sub(1).map(|i| self.time_at(i))
    }

    /// `NET.STA` identifier when both header names are known.
    pub fn station_id(&self) -> Option<String> {
        match (&self.network, &self.station) {
            (Some(net), Some(sta)) => Some(format!("{}.{}", net, sta)),
            (None, Some(sta)) => Some(sta.clone()),
            _ => None,
        }
    }

    /// Borrow the samples whose trace-local time falls in `[start, start + length]`.
    ///
    /// Times stay on the trace axis; they are not re-based to the window start.
    /// Returns an empty window when the range misses the trace entirely.
    pub fn window(&self, start: f64, length: f64) -> Window<'_> {
        let end = start + length;
        if self.data.is_empty() || !(self.delta > 0.0) || end < 0.0 {
            return Window::empty();
        }
        let first = (start / self.delta - GRID_TOLERANCE).ceil().max(0.0);
        let last = (end / self.delta + GRID_TOLERANCE).floor();
        let max_index = (self.data.len() - 1) as f64;
        if first > max_index || last < first {
            return Window::empty();
        }
        let first = first as usize;
        let last = last.min(max_index) as usize;
        let times = (first..=last).map(|i| self.time_at(i)).collect();
        Window {
            offset: first,
            samples: &self.data[first..=last],
            times,
        }
    }
}

/// Contiguous analysis window borrowed from a [`Trace`].
#[derive(Debug, Clone)]
pub struct Window<'a> {
    /// Index of the first window sample inside the parent trace
    pub offset: usize,
    pub samples: &'a [f64],
    /// Trace-local time of every window sample
    pub times: Vec<f64>,
}

impl<'a> Window<'a> {
    fn empty() -> Self {
        Self {
            offset: 0,
            samples: &[],
            times: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    pub fn start_time(&self) -> Option<f64> {
        self.times.first().copied()
    }
    pub fn end_time(&self) -> Option<f64> {
        self.times.last().copied()
    }
}
