use crate::{picks::PickSet, signal::Trace};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    /// Stroke width in pixels
    pub width: u32,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

pub const TRACE_COLOR: Color = Color(0x202020);
pub const ARRIVAL_COLOR: Color = Color(0x1F77B4);
pub const ONSET_COLOR: Color = Color(0x2CA02C);
pub const END_COLOR: Color = Color(0xD62728);
pub const PEAK_COLOR: Color = Color(0xFF7F0E);
pub const TRACE_WIDTH: u32 = 1;
pub const MARKER_WIDTH: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    /// A vertical marker at a given time.
    Marker { name: String, x: f64, style: Style },
    /// Single highlighted point.
    Point {
        name: String,
        at: [f64; 2],
        color: Color,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over line points, or `None` without lines.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| match s {
            Series::Line(line) => line.points.as_slice(),
            _ => &[],
        });
        let first = points.next()?;
        let init = (first[0], first[0], first[1], first[1]);
        Some(points.fold(init, |(x0, x1, y0, y1), p| {
            (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1]))
        }))
    }
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        let sample = points[start];
        result.push(sample);
    }
    result
}

/// Trace segment `[from, to]` (trace-local seconds) with pick markers.
pub fn figure_for_pulse(
    title: &str,
    trace: &Trace,
    picks: &PickSet,
    from: f64,
    to: f64,
    max_points: usize,
) -> Figure {
    let segment = trace.window(from, (to - from).max(0.0));
    let points: Vec<[f64; 2]> = segment
        .times
        .iter()
        .zip(segment.samples)
        .map(|(t, v)| [*t, *v])
        .collect();
    let mut fig = Figure::new(Some(title.to_string()));
    fig.x.label = Some("time (s)".into());
    fig.y.label = Some("amplitude".into());
    fig.add_series(Series::Line(LineSeries {
        name: trace.station_id().unwrap_or_else(|| "trace".into()),
        points: decimate_points(&points, max_points),
        style: Style {
            width: TRACE_WIDTH,
            color: TRACE_COLOR,
        },
    }));

    let markers = [
        ("arrival", picks.p_arrival, ARRIVAL_COLOR),
        ("onset", picks.onset_time, ONSET_COLOR),
        ("end", picks.end_time, END_COLOR),
    ];
    for (name, time, color) in markers {
        if let Some(x) = time {
            fig.add_series(Series::Marker {
                name: name.into(),
                x,
                style: Style {
                    width: MARKER_WIDTH,
                    color,
                },
            });
        }
    }
    if let (Some(t), Some(a)) = (picks.peak_time, picks.peak_amplitude) {
        fig.add_series(Series::Point {
            name: "peak".into(),
            at: [t, a],
            color: PEAK_COLOR,
        });
    }
    fig
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimation_keeps_short_series() {
        let pts = vec![[0.0, 1.0], [1.0, 2.0]];
        assert_eq!(decimate_points(&pts, 10), pts);
        let long: Vec<[f64; 2]> = (0..100).map(|i| [i as f64, 0.0]).collect();
        assert_eq!(decimate_points(&long, 10).len(), 10);
    }

    #[test]
    fn pulse_figure_has_trace_and_markers() {
        let trace = Trace::new(0.1, vec![0.0, 1.0, 3.0, 1.0, -1.0, 0.0]);
        let picks = PickSet {
            p_arrival: Some(0.1),
            onset_time: Some(0.1),
            end_time: Some(0.35),
            peak_time: Some(0.2),
            peak_amplitude: Some(3.0),
            ..PickSet::default()
        };
        let fig = figure_for_pulse("demo", &trace, &picks, 0.0, 0.5, 1024);
        assert_eq!(fig.series.len(), 5);
        let (x0, x1, y0, y1) = fig.bounds().unwrap();
        assert_eq!((x0, y0, y1), (0.0, -1.0, 3.0));
        assert!((x1 - 0.5).abs() < 1e-12);
        assert!(matches!(fig.series[4], Series::Point { .. }));
        match (&fig.series[0], &fig.series[3]) {
            (Series::Line(line), Series::Marker { name, style, .. }) => {
                assert_eq!(line.style.width, TRACE_WIDTH);
                assert_eq!(name, "end");
                assert_eq!(style.width, MARKER_WIDTH);
                assert_eq!(style.color, END_COLOR);
            }
            other => panic!("unexpected series layout: {:?}", other),
        }
    }

    #[test]
    fn empty_figure_has_no_bounds() {
        assert!(Figure::new(None).bounds().is_none());
    }

    #[test]
    fn color_splits_into_channels() {
        assert_eq!(Color(0x12_34_56).rgb(), (0x12, 0x34, 0x56));
    }
}
