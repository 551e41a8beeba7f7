use thiserror::Error;

/// Why a detection call produced no pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DetectError {
    #[error("arrival time is missing or undefined")]
    InvalidArrival,
    #[error("analysis window contains no samples")]
    EmptyWindow,
    #[error("no peak exceeds the significance threshold")]
    NoPeakFound,
}

impl DetectError {
    /// Stable reason code for logs and machine-readable output.
    pub fn reason(&self) -> &'static str {
        match self {
            DetectError::InvalidArrival => "invalid_arrival",
            DetectError::EmptyWindow => "empty_window",
            DetectError::NoPeakFound => "no_peak_found",
        }
    }
}
