use crate::{
    detectors::peaks::Polarity,
    picks::{PickBook, PickSet, StationKey},
};
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

/// One exported station row; absent picks become empty cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickRow {
    pub event_id: String,
    pub station_id: String,
    pub p_arrival: Option<f64>,
    pub polarity: Option<Polarity>,
    pub onset_time: Option<f64>,
    pub end_time: Option<f64>,
    pub peak_amplitude: Option<f64>,
    pub peak_time: Option<f64>,
    pub pulse_area: Option<f64>,
}

impl PickRow {
    pub fn new(key: &StationKey, picks: &PickSet) -> Self {
        Self {
            event_id: key.event_id.clone(),
            station_id: key.station_id.clone(),
            p_arrival: picks.p_arrival,
            polarity: picks.polarity,
            onset_time: picks.onset_time,
            end_time: picks.end_time,
            peak_amplitude: picks.peak_amplitude,
            peak_time: picks.peak_time,
            pulse_area: picks.pulse_area,
        }
    }

    fn into_entry(self) -> (StationKey, PickSet) {
        (
            StationKey::new(self.event_id, self.station_id),
            PickSet {
                p_arrival: self.p_arrival,
                onset_time: self.onset_time,
                end_time: self.end_time,
                peak_time: self.peak_time,
                peak_amplitude: self.peak_amplitude,
                pulse_area: self.pulse_area,
                polarity: self.polarity,
            },
        )
    }
}

/// Write the book as CSV, one row per station in event/station order.
pub fn write_picks<W: Write>(writer: W, book: &PickBook) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    for (key, picks) in book.iter() {
        writer.serialize(PickRow::new(key, picks))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_picks_csv(path: &Path, book: &PickBook) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_picks(file, book).with_context(|| format!("writing picks to {}", path.display()))
}

pub fn read_picks<R: Read>(reader: R) -> Result<PickBook> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let mut book = PickBook::new();
    for (idx, row) in reader.deserialize::<PickRow>().enumerate() {
        let row = row.with_context(|| format!("parsing pick row {}", idx + 1))?;
        let (key, picks) = row.into_entry();
        book.save(key, picks);
    }
    Ok(book)
}

pub fn read_picks_csv(path: &Path) -> Result<PickBook> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening picks {}", path.display()))?;
    read_picks(file).with_context(|| format!("in {}", path.display()))
}
