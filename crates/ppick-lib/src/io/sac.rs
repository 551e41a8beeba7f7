use crate::{
    detectors::{
        peaks::Polarity,
        pulse::{PulseDetector, PulseResult},
    },
    error::DetectError,
    picks::PickSet,
    signal::Trace,
};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const HEADER_LEN: usize = 632;
const NUM_FLOATS: usize = 70;
const NUM_INTS: usize = 40;
const STRING_BYTES: usize = 192;
const INT_OFFSET: usize = NUM_FLOATS * 4;
const STRING_OFFSET: usize = INT_OFFSET + NUM_INTS * 4;

pub const UNDEFINED_F: f32 = -12345.0;
pub const UNDEFINED_I: i32 = -12345;
const UNDEFINED_S: &[u8; 8] = b"-12345  ";
const HEADER_VERSION: i32 = 6;

// float header words
const DELTA: usize = 0;
const DEPMIN: usize = 1;
const DEPMAX: usize = 2;
const B: usize = 5;
const E: usize = 6;
const T0: usize = 10;
const USER0: usize = 40;
const DEPMEN: usize = 56;

// integer header words
const NVHDR: usize = 6;
const NPTS: usize = 9;
const IFTYPE: usize = 15;
const LEVEN: usize = 35;
const ITIME: i32 = 1;

// string header offsets (bytes into the string block) and widths
const KSTNM: (usize, usize) = (0, 8);
const KT0: usize = 48;
const KCMPNM: (usize, usize) = (160, 8);
const KNETWK: (usize, usize) = (168, 8);

/// Header slots used for storing pulse picks.
const T_ARRIVAL: usize = 4;
const T_ONSET: usize = 5;
const T_END: usize = 6;
const T_PEAK: usize = 7;
const USER_PEAK_AMP: usize = 0;
const USER_AREA: usize = 1;
const USER_POLARITY: usize = 2;

#[derive(Debug, Error, PartialEq)]
pub enum SacError {
    #[error("file holds {0} bytes, shorter than the 632-byte SAC header")]
    Truncated(usize),
    #[error("header version word is {0} in both byte orders; not a SAC v6 file")]
    UnknownVersion(i32),
    #[error("header declares {expected} samples but the file holds {found}")]
    DataLength { expected: usize, found: usize },
    #[error("unevenly sampled SAC files are not supported")]
    Uneven,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn read_f32(self, b: [u8; 4]) -> f32 {
        match self {
            ByteOrder::Little => f32::from_le_bytes(b),
            ByteOrder::Big => f32::from_be_bytes(b),
        }
    }
    fn read_i32(self, b: [u8; 4]) -> i32 {
        match self {
            ByteOrder::Little => i32::from_le_bytes(b),
            ByteOrder::Big => i32::from_be_bytes(b),
        }
    }
    fn f32_bytes(self, v: f32) -> [u8; 4] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }
    fn i32_bytes(self, v: i32) -> [u8; 4] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }
}

/// Widen a header float through its shortest decimal form, so `0.01f32`
/// reads back as `0.01` rather than `0.009999999776482582`.
fn widen(v: f32) -> f64 {
    v.to_string().parse().unwrap_or(v as f64)
}

fn word(buf: &[u8], offset: usize) -> [u8; 4] {
    [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]]
}

/// Raw SAC (version 6) header words with sentinel-aware accessors.
///
/// Words holding the SAC "undefined" value read back as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SacHeader {
    floats: [f32; NUM_FLOATS],
    ints: [i32; NUM_INTS],
    strings: [u8; STRING_BYTES],
}

impl SacHeader {
    /// Fresh header for an evenly sampled time series; everything else undefined.
    pub fn new(delta: f32, npts: usize, begin: f32) -> Self {
        let mut strings = [0u8; STRING_BYTES];
        for chunk in strings.chunks_mut(8) {
            chunk.copy_from_slice(UNDEFINED_S);
        }
        let mut header = Self {
            floats: [UNDEFINED_F; NUM_FLOATS],
            ints: [UNDEFINED_I; NUM_INTS],
            strings,
        };
        header.floats[DELTA] = delta;
        header.floats[B] = begin;
        header.floats[E] = begin + delta * npts.saturating_sub(1) as f32;
        header.ints[NVHDR] = HEADER_VERSION;
        header.ints[NPTS] = npts as i32;
        header.ints[IFTYPE] = ITIME;
        header.ints[LEVEN] = 1;
        header
    }

    fn float(&self, idx: usize) -> Option<f32> {
        let v = self.floats[idx];
        (v != UNDEFINED_F).then_some(v)
    }

    fn set_float(&mut self, idx: usize, value: Option<f64>) {
        self.floats[idx] = value.map(|v| v as f32).unwrap_or(UNDEFINED_F);
    }

    fn string(&self, (offset, len): (usize, usize)) -> Option<String> {
        let raw = &self.strings[offset..offset + len];
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches(['\0', ' ']).trim();
        if text.is_empty() || text == "-12345" {
            None
        } else {
            Some(text.to_string())
        }
    }

    fn set_string(&mut self, (offset, len): (usize, usize), value: Option<&str>) {
        let slot = &mut self.strings[offset..offset + len];
        slot.fill(b' ');
        let text = value.unwrap_or("-12345").as_bytes();
        let n = text.len().min(len);
        slot[..n].copy_from_slice(&text[..n]);
    }

    pub fn delta(&self) -> f64 {
        widen(self.floats[DELTA])
    }
    /// Reference-time offset of the first sample; zero when undefined.
    pub fn begin(&self) -> f64 {
        self.float(B).map_or(0.0, widen)
    }
    pub fn npts(&self) -> usize {
        self.ints[NPTS].max(0) as usize
    }
    pub fn is_evenly_sampled(&self) -> bool {
        self.ints[LEVEN] != 0
    }

    /// Time marker `t0`..`t9`.
    ///
    /// # Panics
    ///
    /// The marker accessors panic when `n` is not in `0..10`.
    pub fn t(&self, n: usize) -> Option<f64> {
        assert!(n < 10, "SAC has markers t0..t9");
        self.float(T0 + n).map(widen)
    }
    pub fn set_t(&mut self, n: usize, value: Option<f64>) {
        assert!(n < 10, "SAC has markers t0..t9");
        self.set_float(T0 + n, value);
    }
    pub fn set_t_label(&mut self, n: usize, label: Option<&str>) {
        assert!(n < 10, "SAC has markers t0..t9");
        self.set_string((KT0 + n * 8, 8), label);
    }
    pub fn t_label(&self, n: usize) -> Option<String> {
        assert!(n < 10, "SAC has markers t0..t9");
        self.string((KT0 + n * 8, 8))
    }

    /// User variable `user0`..`user9`.
    ///
    /// # Panics
    ///
    /// The user accessors panic when `n` is not in `0..10`.
    pub fn user(&self, n: usize) -> Option<f64> {
        assert!(n < 10, "SAC has user0..user9");
        self.float(USER0 + n).map(widen)
    }
    pub fn set_user(&mut self, n: usize, value: Option<f64>) {
        assert!(n < 10, "SAC has user0..user9");
        self.set_float(USER0 + n, value);
    }

    pub fn station(&self) -> Option<String> {
        self.string(KSTNM)
    }
    pub fn network(&self) -> Option<String> {
        self.string(KNETWK)
    }
    pub fn channel(&self) -> Option<String> {
        self.string(KCMPNM)
    }
    pub fn set_station(&mut self, value: Option<&str>) {
        self.set_string(KSTNM, value);
    }
    pub fn set_network(&mut self, value: Option<&str>) {
        self.set_string(KNETWK, value);
    }
    pub fn set_channel(&mut self, value: Option<&str>) {
        self.set_string(KCMPNM, value);
    }

    /// P arrival on the trace-local axis: `t1`, else `t3`.
    ///
    /// Header markers are relative to the reference time; with
    /// `relative_to_begin` the begin offset `b` is subtracted so the value
    /// indexes the samples directly.
    pub fn arrival_time(&self, relative_to_begin: bool) -> Option<f64> {
        let pick = self.t(1).or_else(|| self.t(3))?;
        Some(if relative_to_begin {
            pick - self.begin()
        } else {
            pick
        })
    }

    /// Store a detection in the pick slots (`t4`..`t7`, `user0`..`user2`).
    pub fn write_pulse(&mut self, result: &PulseResult, relative_to_begin: bool) {
        self.write_picks(&PickSet::from(result), relative_to_begin);
    }

    /// Store a pick set; absent picks clear their slot.
    pub fn write_picks(&mut self, picks: &PickSet, relative_to_begin: bool) {
        let shift = if relative_to_begin { self.begin() } else { 0.0 };
        let marks = [
            (T_ARRIVAL, picks.p_arrival, "Parr"),
            (T_ONSET, picks.onset_time, "Pons"),
            (T_END, picks.end_time, "Pend"),
            (T_PEAK, picks.peak_time, "Ppeak"),
        ];
        for (slot, value, label) in marks {
            self.set_t(slot, value.map(|t| t + shift));
            self.set_t_label(slot, value.map(|_| label));
        }
        self.set_user(USER_PEAK_AMP, picks.peak_amplitude);
        self.set_user(USER_AREA, picks.pulse_area);
        self.set_user(USER_POLARITY, picks.polarity.map(|p| p.sign()));
    }

    /// Read back picks stored by [`write_picks`](Self::write_picks).
    pub fn read_picks(&self, relative_to_begin: bool) -> PickSet {
        let shift = if relative_to_begin { self.begin() } else { 0.0 };
        PickSet {
            p_arrival: self.t(T_ARRIVAL).map(|t| t - shift),
            onset_time: self.t(T_ONSET).map(|t| t - shift),
            end_time: self.t(T_END).map(|t| t - shift),
            peak_time: self.t(T_PEAK).map(|t| t - shift),
            peak_amplitude: self.user(USER_PEAK_AMP),
            pulse_area: self.user(USER_AREA),
            polarity: self.user(USER_POLARITY).and_then(Polarity::from_sign),
        }
    }
}

/// A SAC header plus its samples. Only evenly sampled files are accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct SacFile {
    pub header: SacHeader,
    pub data: Vec<f32>,
    pub byte_order: ByteOrder,
}

impl SacFile {
    pub fn parse(buf: &[u8]) -> std::result::Result<Self, SacError> {
        if buf.len() < HEADER_LEN {
            return Err(SacError::Truncated(buf.len()));
        }
        let version_word = word(buf, INT_OFFSET + NVHDR * 4);
        let byte_order = if i32::from_le_bytes(version_word) == HEADER_VERSION {
            ByteOrder::Little
        } else if i32::from_be_bytes(version_word) == HEADER_VERSION {
            ByteOrder::Big
        } else {
            return Err(SacError::UnknownVersion(i32::from_le_bytes(version_word)));
        };

        let mut floats = [0f32; NUM_FLOATS];
        for (i, slot) in floats.iter_mut().enumerate() {
            *slot = byte_order.read_f32(word(buf, i * 4));
        }
        let mut ints = [0i32; NUM_INTS];
        for (i, slot) in ints.iter_mut().enumerate() {
            *slot = byte_order.read_i32(word(buf, INT_OFFSET + i * 4));
        }
        let mut strings = [0u8; STRING_BYTES];
        strings.copy_from_slice(&buf[STRING_OFFSET..HEADER_LEN]);
        let header = SacHeader {
            floats,
            ints,
            strings,
        };
        if !header.is_evenly_sampled() {
            return Err(SacError::Uneven);
        }

        let npts = header.npts();
        let available = (buf.len() - HEADER_LEN) / 4;
        if available < npts {
            return Err(SacError::DataLength {
                expected: npts,
                found: available,
            });
        }
        let data = (0..npts)
            .map(|i| byte_order.read_f32(word(buf, HEADER_LEN + i * 4)))
            .collect();
        Ok(Self {
            header,
            data,
            byte_order,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let buf = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&buf).with_context(|| format!("parsing SAC file {}", path.display()))
    }

    /// Serialize in the file's byte order, refreshing `npts` and the
    /// amplitude summary words from the samples.
    pub fn to_bytes(&self) -> Vec<u8> {
        let order = self.byte_order;
        let mut header = self.header.clone();
        header.ints[NPTS] = self.data.len() as i32;
        if !self.data.is_empty() {
            let min = self.data.iter().copied().fold(f32::INFINITY, f32::min);
            let max = self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mean = self.data.iter().map(|v| *v as f64).sum::<f64>() / self.data.len() as f64;
            header.floats[DEPMIN] = min;
            header.floats[DEPMAX] = max;
            header.floats[DEPMEN] = mean as f32;
        }

        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        for v in header.floats {
            out.extend_from_slice(&order.f32_bytes(v));
        }
        for v in header.ints {
            out.extend_from_slice(&order.i32_bytes(v));
        }
        out.extend_from_slice(&header.strings);
        for v in &self.data {
            out.extend_from_slice(&order.f32_bytes(*v));
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_bytes())
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// Picks already stored in the header, or a fresh detection when there
    /// are none. Stored picks without `t4` take the header arrival.
    pub fn stored_or_detected(
        &self,
        detector: &PulseDetector,
        relative_to_begin: bool,
    ) -> std::result::Result<PickSet, DetectError> {
        let arrival = self.header.arrival_time(relative_to_begin);
        let stored = self.header.read_picks(relative_to_begin);
        if !stored.is_empty() {
            return Ok(PickSet {
                p_arrival: stored.p_arrival.or(arrival),
                ..stored
            });
        }
        detector
            .detect_opt(&self.to_trace(), arrival)
            .map(|result| PickSet::from(&result))
    }

    pub fn to_trace(&self) -> Trace {
        Trace {
            delta: self.header.delta(),
            begin: self.header.begin(),
            data: self.data.iter().map(|v| *v as f64).collect(),
            network: self.header.network(),
            station: self.header.station(),
            channel: self.header.channel(),
        }
    }

    pub fn from_trace(trace: &Trace) -> Self {
        let mut header = SacHeader::new(trace.delta as f32, trace.len(), trace.begin as f32);
        header.set_network(trace.network.as_deref());
        header.set_station(trace.station.as_deref());
        header.set_channel(trace.channel.as_deref());
        Self {
            header,
            data: trace.data.iter().map(|v| *v as f32).collect(),
            byte_order: ByteOrder::Little,
        }
    }
}

/// Load a SAC file as a trace along with its resolved P arrival.
pub fn load_trace(path: &Path, relative_to_begin: bool) -> Result<(Trace, Option<f64>)> {
    let sac = SacFile::read(path)?;
    let arrival = sac.header.arrival_time(relative_to_begin);
    Ok((sac.to_trace(), arrival))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> SacFile {
        let mut trace = Trace::new(0.01, vec![0.0, 1.5, -2.0, 0.25]);
        trace.begin = 2.0;
        trace.network = Some("XX".into());
        trace.station = Some("STA1".into());
        trace.channel = Some("HHZ".into());
        SacFile::from_trace(&trace)
    }

    #[test]
    fn round_trips_through_bytes() {
        let sac = sample_file();
        let bytes = sac.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + 16);
        let back = SacFile::parse(&bytes).unwrap();
        assert_eq!(back.data, sac.data);
        assert_eq!(back.byte_order, ByteOrder::Little);
        let trace = back.to_trace();
        assert!((trace.delta - 0.01).abs() < 1e-7);
        assert_eq!(trace.begin, 2.0);
        assert_eq!(trace.station_id().as_deref(), Some("XX.STA1"));
        assert_eq!(trace.channel.as_deref(), Some("HHZ"));
    }

    #[test]
    fn reads_big_endian_files() {
        let mut sac = sample_file();
        sac.byte_order = ByteOrder::Big;
        let bytes = sac.to_bytes();
        assert_eq!(&bytes[INT_OFFSET + NVHDR * 4..INT_OFFSET + NVHDR * 4 + 4], &[0, 0, 0, 6]);
        let back = SacFile::parse(&bytes).unwrap();
        assert_eq!(back.byte_order, ByteOrder::Big);
        assert_eq!(back.data, vec![0.0, 1.5, -2.0, 0.25]);
    }

    #[test]
    fn rejects_short_and_foreign_buffers() {
        assert_eq!(SacFile::parse(&[0u8; 100]), Err(SacError::Truncated(100)));
        assert!(matches!(
            SacFile::parse(&[0u8; HEADER_LEN]),
            Err(SacError::UnknownVersion(0))
        ));
        let mut bytes = sample_file().to_bytes();
        bytes.truncate(HEADER_LEN + 8);
        assert_eq!(
            SacFile::parse(&bytes),
            Err(SacError::DataLength {
                expected: 4,
                found: 2
            })
        );
    }

    #[test]
    fn rejects_uneven_sampling() {
        let mut sac = sample_file();
        sac.header.ints[LEVEN] = 0;
        assert_eq!(SacFile::parse(&sac.to_bytes()), Err(SacError::Uneven));
    }

    #[test]
    fn header_floats_widen_to_their_decimal_value() {
        let header = SacHeader::new(0.01, 10, 0.3);
        assert_eq!(header.delta(), 0.01);
        assert_eq!(header.begin(), 0.3);
        assert_eq!(widen(12.34), 12.34);
    }

    #[test]
    fn undefined_markers_are_none() {
        let header = SacHeader::new(0.01, 10, 0.0);
        assert_eq!(header.t(1), None);
        assert_eq!(header.user(0), None);
        assert_eq!(header.station(), None);
        assert_eq!(header.arrival_time(true), None);
    }

    #[test]
    #[should_panic(expected = "t0..t9")]
    fn marker_index_past_t9_panics() {
        SacHeader::new(0.01, 10, 0.0).set_t(10, Some(1.0));
    }

    #[test]
    #[should_panic(expected = "user0..user9")]
    fn user_index_past_user9_panics() {
        SacHeader::new(0.01, 10, 0.0).user(10);
    }

    #[test]
    fn arrival_prefers_t1_then_t3() {
        let mut header = SacHeader::new(0.01, 10, 1.5);
        header.set_t(3, Some(7.0));
        assert_eq!(header.arrival_time(false), Some(7.0));
        header.set_t(1, Some(5.0));
        assert_eq!(header.arrival_time(false), Some(5.0));
        assert_eq!(header.arrival_time(true), Some(3.5));
        header.set_t(1, None);
        assert_eq!(header.arrival_time(true), Some(5.5));
    }

    #[test]
    fn pulse_picks_survive_a_file_round_trip() {
        let mut sac = sample_file();
        let result = PulseResult {
            p_arrival: 0.5,
            onset_time: 0.51,
            end_time: 0.75,
            peak_amplitude: 10.0,
            peak_time: 0.6,
            polarity: Polarity::Negative,
            pulse_area: 1.25,
        };
        sac.header.write_pulse(&result, true);
        let back = SacFile::parse(&sac.to_bytes()).unwrap();
        // begin is 2.0, so header markers sit on the reference axis
        assert!((back.header.t(4).unwrap() - 2.5).abs() < 1e-6);
        assert_eq!(back.header.t_label(5).as_deref(), Some("Pons"));
        let picks = back.header.read_picks(true);
        assert!((picks.onset_time.unwrap() - 0.51).abs() < 1e-5);
        assert!((picks.end_time.unwrap() - 0.75).abs() < 1e-5);
        assert!((picks.peak_time.unwrap() - 0.6).abs() < 1e-5);
        assert_eq!(picks.peak_amplitude, Some(10.0));
        assert_eq!(picks.pulse_area, Some(1.25));
        assert_eq!(picks.polarity, Some(Polarity::Negative));
    }

    #[test]
    fn stored_picks_win_over_detection() {
        use crate::synth::{pulse_trace, PulseSpec};

        let mut sac = SacFile::from_trace(&pulse_trace(&PulseSpec::default(), 0));
        let detector = PulseDetector::default();
        assert_eq!(
            sac.stored_or_detected(&detector, true),
            Err(DetectError::InvalidArrival)
        );

        sac.header.set_t(1, Some(1.0));
        let detected = sac.stored_or_detected(&detector, true).unwrap();
        assert!((detected.peak_time.unwrap() - 1.1).abs() < 1e-6);

        let manual = PickSet {
            onset_time: Some(0.98),
            ..PickSet::default()
        };
        sac.header.write_picks(&manual, true);
        let shown = sac.stored_or_detected(&detector, true).unwrap();
        assert_eq!(shown.onset_time, Some(0.98));
        assert_eq!(shown.p_arrival, Some(1.0));
        assert_eq!(shown.peak_time, None);
    }

    #[test]
    fn clearing_a_pick_restores_undefined() {
        let mut header = SacHeader::new(0.01, 10, 0.0);
        let mut picks = PickSet {
            onset_time: Some(1.0),
            ..PickSet::default()
        };
        header.write_picks(&picks, true);
        assert_eq!(header.t(5), Some(1.0));
        picks.onset_time = None;
        header.write_picks(&picks, true);
        assert_eq!(header.t(5), None);
        assert_eq!(header.t_label(5), None);
    }

    #[test]
    fn reads_and_writes_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("XX.STA1.HHZ.SAC");
        sample_file().write(&path).unwrap();
        let (trace, arrival) = load_trace(&path, true).unwrap();
        assert_eq!(trace.len(), 4);
        assert_eq!(arrival, None);
        assert!(SacFile::read(&dir.path().join("missing.SAC")).is_err());
    }
}
