pub mod catalog;
pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod picks;
pub mod plot;
pub mod signal;
pub mod synth;

pub use detectors::*;
pub use error::DetectError;
pub use signal::*;
