use crate::detectors::{peaks::Polarity, pulse::PulseResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Current picks of one station; every value may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PickSet {
    pub p_arrival: Option<f64>,
    pub onset_time: Option<f64>,
    pub end_time: Option<f64>,
    pub peak_time: Option<f64>,
    pub peak_amplitude: Option<f64>,
    pub pulse_area: Option<f64>,
    pub polarity: Option<Polarity>,
}

impl From<&PulseResult> for PickSet {
    fn from(result: &PulseResult) -> Self {
        Self {
            p_arrival: Some(result.p_arrival),
            onset_time: Some(result.onset_time),
            end_time: Some(result.end_time),
            peak_time: Some(result.peak_time),
            peak_amplitude: Some(result.peak_amplitude),
            pulse_area: Some(result.pulse_area),
            polarity: Some(result.polarity),
        }
    }
}

impl PickSet {
    pub fn is_empty(&self) -> bool {
        *self == PickSet::default()
    }

    pub fn get(&self, kind: PickKind) -> Option<f64> {
        match kind {
            PickKind::Arrival => self.p_arrival,
            PickKind::Onset => self.onset_time,
            PickKind::End => self.end_time,
        }
    }

    pub fn set(&mut self, kind: PickKind, time: Option<f64>) {
        match kind {
            PickKind::Arrival => self.p_arrival = time,
            PickKind::Onset => self.onset_time = time,
            PickKind::End => self.end_time = time,
        }
    }
}

/// Time picks an analyst can place by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickKind {
    Arrival,
    Onset,
    End,
}

impl fmt::Display for PickKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PickKind::Arrival => "p_arrival",
            PickKind::Onset => "onset_time",
            PickKind::End => "end_time",
        })
    }
}

impl FromStr for PickKind {
    type Err = String;

    /// Accepts the short names (`arrival`, `onset`, `end`) and the column names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arrival" | "p_arrival" => Ok(PickKind::Arrival),
            "onset" | "onset_time" => Ok(PickKind::Onset),
            "end" | "end_time" => Ok(PickKind::End),
            other => Err(format!(
                "unknown pick '{}', expected arrival, onset or end",
                other
            )),
        }
    }
}

/// One change to a station's picks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PickEdit {
    /// Place, move, or (with `None`) remove a single pick.
    Manual { kind: PickKind, time: Option<f64> },
    /// Replace the whole set with an automatic detection.
    Auto(PickSet),
}

impl PickEdit {
    fn apply_to(&self, current: &PickSet) -> PickSet {
        match self {
            PickEdit::Manual { kind, time } => {
                let mut next = *current;
                next.set(*kind, *time);
                next
            }
            PickEdit::Auto(picks) => *picks,
        }
    }

    pub fn describe(&self, before: &PickSet) -> String {
        match self {
            PickEdit::Manual { kind, time: None } => format!("remove pick: {}", kind),
            PickEdit::Manual { kind, .. } if before.get(*kind).is_none() => {
                format!("add pick: {}", kind)
            }
            PickEdit::Manual { kind, .. } => format!("move pick: {}", kind),
            PickEdit::Auto(_) => "automatic pick".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub edit: PickEdit,
    pub before: PickSet,
    pub label: String,
}

/// Undoable edit log over one station's [`PickSet`].
///
/// Entries before `cursor` are applied; entries after it can be redone.
/// Applying a new edit drops the redo tail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PickHistory {
    current: PickSet,
    entries: Vec<HistoryEntry>,
    cursor: usize,
}

impl PickHistory {
    pub fn new(initial: PickSet) -> Self {
        Self {
            current: initial,
            entries: Vec::new(),
            cursor: 0,
        }
    }

    pub fn current(&self) -> &PickSet {
        &self.current
    }

    pub fn apply(&mut self, edit: PickEdit) -> &PickSet {
        self.entries.truncate(self.cursor);
        let label = edit.describe(&self.current);
        self.entries.push(HistoryEntry {
            edit,
            before: self.current,
            label,
        });
        self.cursor = self.entries.len();
        self.current = edit.apply_to(&self.current);
        &self.current
    }

    /// Revert the latest applied edit. Returns `false` when there is none.
    pub fn undo(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.current = self.entries[self.cursor].before;
        true
    }

    /// Re-apply the next reverted edit. Returns `false` when there is none.
    pub fn redo(&mut self) -> bool {
        match self.entries.get(self.cursor) {
            Some(entry) => {
                self.current = entry.edit.apply_to(&entry.before);
                self.cursor += 1;
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }
    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }
    pub fn undo_label(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .map(|i| self.entries[i].label.as_str())
    }
    pub fn redo_label(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(|e| e.label.as_str())
    }
    pub fn applied(&self) -> &[HistoryEntry] {
        &self.entries[..self.cursor]
    }
}

/// Event/station key in the pick book.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationKey {
    pub event_id: String,
    pub station_id: String,
}

impl StationKey {
    pub fn new(event_id: impl Into<String>, station_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            station_id: station_id.into(),
        }
    }
}

/// Saved picks for every visited station, ordered by event then station.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PickBook {
    stations: BTreeMap<StationKey, PickSet>,
}

impl PickBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a station's picks; empty sets are not kept.
    pub fn save(&mut self, key: StationKey, picks: PickSet) {
        if picks.is_empty() {
            self.stations.remove(&key);
        } else {
            self.stations.insert(key, picks);
        }
    }

    pub fn get(&self, key: &StationKey) -> Option<&PickSet> {
        self.stations.get(key)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StationKey, &PickSet)> {
        self.stations.iter()
    }
}
