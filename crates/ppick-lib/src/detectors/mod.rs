pub mod peaks;
pub mod pulse;

pub use peaks::{Peak, Polarity};
pub use pulse::{DetectorConfig, PulseDetector, PulseResult};
