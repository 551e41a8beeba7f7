use crate::detectors::pulse::DetectorConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How traces and arrival picks are pulled out of waveform files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Subtract the header `b` value so header picks land on the trace-local axis.
    pub arrival_relative_to_begin: bool,
    /// Component letter that marks the vertical trace in file names.
    pub component_suffix: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            arrival_relative_to_begin: true,
            component_suffix: "Z".into(),
        }
    }
}

/// Top-level picker configuration, usually read from `picker.toml`.
///
/// ```toml
/// [detector]
/// threshold_fraction = 0.05
/// search_window = 1.0
///
/// [ingest]
/// arrival_relative_to_begin = true
/// component_suffix = "Z"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickerConfig {
    pub detector: DetectorConfig,
    pub ingest: IngestConfig,
}

impl PickerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: PickerConfig = toml::from_str(text).context("parsing picker config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Reject parameter values the detector does not guard against.
    pub fn validate(&self) -> Result<()> {
        let tf = self.detector.threshold_fraction;
        if !(tf > 0.0 && tf < 1.0) {
            bail!("threshold_fraction must be in (0, 1), got {}", tf);
        }
        let sw = self.detector.search_window;
        if !(sw.is_finite() && sw > 0.0) {
            bail!("search_window must be a positive number of seconds, got {}", sw);
        }
        if self.ingest.component_suffix.trim().is_empty() {
            bail!("component_suffix must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = PickerConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, PickerConfig::default());
        assert_eq!(cfg.detector.threshold_fraction, 0.05);
        assert_eq!(cfg.detector.search_window, 1.0);
        assert!(cfg.ingest.arrival_relative_to_begin);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let cfg = PickerConfig::from_toml_str(
            "[detector]\nsearch_window = 0.5\n[ingest]\ncomponent_suffix = \"N\"\n",
        )
        .unwrap();
        assert_eq!(cfg.detector.search_window, 0.5);
        assert_eq!(cfg.detector.threshold_fraction, 0.05);
        assert_eq!(cfg.ingest.component_suffix, "N");
        assert!(cfg.ingest.arrival_relative_to_begin);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(PickerConfig::from_toml_str("[detector]\nthreshold_fraction = 1.5\n").is_err());
        assert!(PickerConfig::from_toml_str("[detector]\nthreshold_fraction = 0.0\n").is_err());
        assert!(PickerConfig::from_toml_str("[detector]\nsearch_window = -1.0\n").is_err());
        assert!(PickerConfig::from_toml_str("[ingest]\ncomponent_suffix = \" \"\n").is_err());
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[detector]\nthreshold_fraction = 0.1").unwrap();
        let cfg = PickerConfig::load(file.path()).unwrap();
        assert_eq!(cfg.detector.threshold_fraction, 0.1);
    }
}
