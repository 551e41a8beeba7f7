use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Waveform files of one station, keyed by component code (e.g. `BHZ`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationFiles {
    pub components: BTreeMap<String, PathBuf>,
}

/// Event directories found under a data root, each mapping `NET.STA` to files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub root: PathBuf,
    pub events: BTreeMap<String, BTreeMap<String, StationFiles>>,
}

impl Catalog {
    /// Index every `<root>/<event>/NET.STA.<CMP>.SAC` whose component ends in
    /// `component_suffix` (case-insensitive).
    pub fn scan(root: &Path, component_suffix: &str) -> Result<Self> {
        let wanted = format!("{}.SAC", component_suffix.to_ascii_uppercase());
        let mut events = BTreeMap::new();
        let entries =
            fs::read_dir(root).with_context(|| format!("failed to list {}", root.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("reading entry in {}", root.display()))?;
            let event_path = entry.path();
            if !event_path.is_dir() {
                continue;
            }
            let event_id = entry.file_name().to_string_lossy().to_string();
            let stations = scan_event(&event_path, &wanted)?;
            log::debug!("event {}: {} station(s)", event_id, stations.len());
            events.insert(event_id, stations);
        }
        Ok(Self {
            root: root.to_path_buf(),
            events,
        })
    }

    pub fn station_count(&self) -> usize {
        self.events.values().map(|s| s.len()).sum()
    }

    /// `(event, station)` pairs in sorted order.
    pub fn stations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.events.iter().flat_map(|(event, stations)| {
            stations
                .keys()
                .map(move |station| (event.as_str(), station.as_str()))
        })
    }

    /// Vertical-component file of a station; the first component in code order
    /// when several qualify.
    pub fn station_file(&self, event_id: &str, station_id: &str) -> Option<&Path> {
        self.events
            .get(event_id)?
            .get(station_id)?
            .components
            .values()
            .next()
            .map(PathBuf::as_path)
    }
}

fn scan_event(dir: &Path, wanted_suffix: &str) -> Result<BTreeMap<String, StationFiles>> {
    let mut stations: BTreeMap<String, StationFiles> = BTreeMap::new();
    let entries = fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("reading entry in {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();
        if !name.to_ascii_uppercase().ends_with(wanted_suffix) || !path.is_file() {
            continue;
        }
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() < 4 {
            log::warn!("skipping {}: expected NET.STA.CMP.SAC", name);
            continue;
        }
        let station = format!("{}.{}", parts[0], parts[1]);
        stations
            .entry(station)
            .or_default()
            .components
            .insert(parts[2].to_string(), path);
    }
    Ok(stations)
}
