use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use plotters::prelude::*;
use ppick_lib::{
    catalog::Catalog,
    config::PickerConfig,
    io::{csv as csv_io, sac, text as text_io},
    metrics::quality::{assess_pulse, PulseQuality},
    picks::{PickBook, PickEdit, PickHistory, PickKind, PickSet, StationKey},
    plot::{figure_for_pulse, Figure, Series, Style},
    signal::Trace,
    synth::{pulse_trace, PulseSpec},
    DetectError, Polarity, PulseDetector, PulseResult,
};
use serde::Serialize;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
    process::ExitCode,
};

#[derive(Parser)]
#[command(
    name = "ppick",
    version,
    about = "PPick: first-motion P-wave pulse picking for SAC waveforms"
)]
struct Cli {
    /// Picker configuration (TOML with [detector] and [ingest] tables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the P pulse on one trace and print it as JSON
    Detect {
        /// SAC file; the arrival comes from its t1/t3 header pick
        #[arg(long, conflicts_with = "input")]
        sac: Option<PathBuf>,
        /// Newline-delimited samples (stdin when neither --sac nor --input is given)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Sampling interval for single-column text input
        #[arg(long)]
        delta: Option<f64>,
        /// Arrival on the trace-local axis; overrides the header pick
        #[arg(long, allow_hyphen_values = true)]
        arrival: Option<f64>,
        #[arg(long)]
        threshold_fraction: Option<f64>,
        #[arg(long)]
        search_window: Option<f64>,
    },
    /// Index `<root>/<event>/NET.STA.CMP.SAC` files and print the catalog
    Scan {
        #[arg(long)]
        root: PathBuf,
    },
    /// Detect every station of a catalog and export the picks as CSV
    Batch {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Also store the picks in each SAC header
        #[arg(long, default_value_t = false)]
        write_sac: bool,
    },
    /// Render a trace with its picks to a PNG via plotters
    Plot {
        #[arg(long)]
        sac: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Seconds shown before the arrival
        #[arg(long, default_value_t = 0.5)]
        before: f64,
        /// Ignore picks stored in the header and detect again
        #[arg(long, default_value_t = false)]
        redetect: bool,
    },
    /// Edit the picks stored in a SAC header (t4..t7, user0..user2)
    Pick {
        #[arg(long)]
        sac: PathBuf,
        /// Replace the stored picks with an automatic detection first
        #[arg(long, default_value_t = false)]
        auto: bool,
        /// Place or move a pick, e.g. `onset=1.02` (repeatable)
        #[arg(long = "set", value_name = "KIND=TIME", value_parser = parse_pick_assignment)]
        set: Vec<(PickKind, f64)>,
        /// Remove a pick: arrival, onset or end (repeatable)
        #[arg(long = "clear", value_name = "KIND")]
        clear: Vec<PickKind>,
        /// Revert the last N edits
        #[arg(long, default_value_t = 0)]
        undo: usize,
        /// Print the result without touching any file
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Pick book CSV to update with the station's picks
        #[arg(long)]
        book: Option<PathBuf>,
        /// Event id for the book row; defaults to the SAC file's directory name
        #[arg(long)]
        event: Option<String>,
    },
    /// Write a synthetic single-pulse SAC trace with its arrival in t1
    Synth {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 0.01)]
        delta: f64,
        #[arg(long, default_value_t = 400)]
        npts: usize,
        #[arg(long, default_value_t = 1.0)]
        arrival: f64,
        #[arg(long, default_value_t = 1.1)]
        peak_time: f64,
        #[arg(long, default_value_t = 5.0)]
        amplitude: f64,
        #[arg(long, default_value = "positive")]
        polarity: Polarity,
        #[arg(long, default_value_t = 1.3)]
        zero_crossing: f64,
        #[arg(long, default_value_t = 0.0)]
        noise: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Header begin offset `b`
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        begin: f64,
        #[arg(long, default_value = "XX")]
        network: String,
        #[arg(long, default_value = "SYN")]
        station: String,
        #[arg(long, default_value = "HHZ")]
        channel: String,
        /// Leave t1 unset
        #[arg(long, default_value_t = false)]
        no_pick: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();
    let config = match &cli.config {
        Some(path) => PickerConfig::load(path)?,
        None => PickerConfig::default(),
    };
    match cli.command {
        Commands::Detect {
            sac,
            input,
            delta,
            arrival,
            threshold_fraction,
            search_window,
        } => {
            let mut config = config;
            if let Some(tf) = threshold_fraction {
                config.detector.threshold_fraction = tf;
            }
            if let Some(sw) = search_window {
                config.detector.search_window = sw;
            }
            config.validate()?;
            return cmd_detect(&config, sac.as_deref(), input.as_deref(), delta, arrival);
        }
        Commands::Scan { root } => cmd_scan(&config, &root)?,
        Commands::Batch {
            root,
            out,
            write_sac,
        } => cmd_batch(&config, &root, &out, write_sac)?,
        Commands::Plot {
            sac,
            out,
            before,
            redetect,
        } => cmd_plot(&config, &sac, &out, before, redetect)?,
        Commands::Pick {
            sac,
            auto,
            set,
            clear,
            undo,
            dry_run,
            book,
            event,
        } => {
            let mut edits = Vec::new();
            for (kind, time) in set {
                edits.push(PickEdit::Manual {
                    kind,
                    time: Some(time),
                });
            }
            for kind in clear {
                edits.push(PickEdit::Manual { kind, time: None });
            }
            let target = PickTarget {
                sac: &sac,
                book: book.as_deref(),
                event,
                dry_run,
            };
            cmd_pick(&config, &target, auto, &edits, undo)?
        }
        Commands::Synth {
            out,
            delta,
            npts,
            arrival,
            peak_time,
            amplitude,
            polarity,
            zero_crossing,
            noise,
            seed,
            begin,
            network,
            station,
            channel,
            no_pick,
        } => {
            let spec = PulseSpec {
                delta,
                npts,
                arrival,
                peak_time,
                peak_amplitude: amplitude,
                polarity,
                zero_crossing,
                noise,
                network: Some(network),
                station: Some(station),
                channel: Some(channel),
                ..PulseSpec::default()
            };
            cmd_synth(&spec, seed, begin, !no_pick, &out)?
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct DetectOutput {
    station_id: Option<String>,
    #[serde(flatten)]
    result: PulseResult,
    quality: PulseQuality,
}

#[derive(Serialize)]
struct DetectFailure<'a> {
    error: &'a str,
    message: String,
}

fn read_text_trace(input: Option<&Path>, delta: Option<f64>) -> Result<Trace> {
    match input {
        Some(path) => text_io::read_trace(path, delta),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_trace(&buf, delta)
        }
    }
}

fn cmd_detect(
    config: &PickerConfig,
    sac_path: Option<&Path>,
    input: Option<&Path>,
    delta: Option<f64>,
    arrival: Option<f64>,
) -> Result<ExitCode> {
    let (trace, header_arrival) = match sac_path {
        Some(path) => sac::load_trace(path, config.ingest.arrival_relative_to_begin)?,
        None => (read_text_trace(input, delta)?, None),
    };
    let arrival = arrival.or(header_arrival);
    let detector = PulseDetector::new(config.detector);
    match detector.detect_opt(&trace, arrival) {
        Ok(result) => {
            let out = DetectOutput {
                station_id: trace.station_id(),
                quality: assess_pulse(&trace, &result, config.detector.search_window),
                result,
            };
            println!("{}", serde_json::to_string(&out)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            print_failure(&err)?;
            Ok(ExitCode::from(2))
        }
    }
}

fn print_failure(err: &DetectError) -> Result<()> {
    let failure = DetectFailure {
        error: err.reason(),
        message: err.to_string(),
    };
    println!("{}", serde_json::to_string(&failure)?);
    Ok(())
}

fn cmd_scan(config: &PickerConfig, root: &Path) -> Result<()> {
    let catalog = Catalog::scan(root, &config.ingest.component_suffix)?;
    info!(
        "{} event(s), {} station(s) under {}",
        catalog.events.len(),
        catalog.station_count(),
        root.display()
    );
    println!("{}", serde_json::to_string(&catalog)?);
    Ok(())
}

#[derive(Serialize)]
struct BatchSummary {
    stations: usize,
    detected: usize,
    failed: usize,
    /// Stations whose header write-back failed; their picks are still exported
    write_failed: usize,
    out: PathBuf,
}

fn cmd_batch(config: &PickerConfig, root: &Path, out: &Path, write_sac: bool) -> Result<()> {
    let catalog = Catalog::scan(root, &config.ingest.component_suffix)?;
    let detector = PulseDetector::new(config.detector);
    let relative = config.ingest.arrival_relative_to_begin;
    let mut book = PickBook::new();
    let mut detected = 0;
    let mut failed = 0;
    let mut write_failed = 0;
    for (event_id, station_id) in catalog.stations() {
        let Some(path) = catalog.station_file(event_id, station_id) else {
            continue;
        };
        let key = StationKey::new(event_id, station_id);
        let mut file = match sac::SacFile::read(path) {
            Ok(file) => file,
            Err(err) => {
                warn!("{}/{}: {:#}", event_id, station_id, err);
                failed += 1;
                continue;
            }
        };
        let arrival = file.header.arrival_time(relative);
        let picks = match detector.detect_opt(&file.to_trace(), arrival) {
            Ok(result) => {
                detected += 1;
                PickSet::from(&result)
            }
            Err(err) => {
                warn!("{}/{}: {} ({})", event_id, station_id, err, err.reason());
                failed += 1;
                PickSet {
                    p_arrival: arrival,
                    ..PickSet::default()
                }
            }
        };
        if write_sac && !picks.is_empty() {
            file.header.write_picks(&picks, relative);
            if let Err(err) = file.write(path) {
                warn!("{}/{}: {:#}", event_id, station_id, err);
                write_failed += 1;
            }
        }
        book.save(key, picks);
    }
    csv_io::write_picks_csv(out, &book)?;
    info!("wrote {} row(s) to {}", book.len(), out.display());
    let summary = BatchSummary {
        stations: catalog.station_count(),
        detected,
        failed,
        write_failed,
        out: out.to_path_buf(),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

/// Parse `KIND=TIME` for `pick --set`.
fn parse_pick_assignment(s: &str) -> std::result::Result<(PickKind, f64), String> {
    let (kind, time) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KIND=TIME, got '{}'", s))?;
    let time: f64 = time
        .trim()
        .parse()
        .map_err(|_| format!("invalid time '{}'", time))?;
    if !time.is_finite() {
        return Err(format!("invalid time '{}'", s));
    }
    Ok((kind.parse::<PickKind>()?, time))
}

struct PickTarget<'a> {
    sac: &'a Path,
    book: Option<&'a Path>,
    event: Option<String>,
    dry_run: bool,
}

#[derive(Serialize)]
struct PickOutput {
    station_id: Option<String>,
    picks: PickSet,
    applied: Vec<String>,
    redo: Option<String>,
    written: bool,
}

fn cmd_pick(
    config: &PickerConfig,
    target: &PickTarget<'_>,
    auto: bool,
    edits: &[PickEdit],
    undo: usize,
) -> Result<()> {
    let relative = config.ingest.arrival_relative_to_begin;
    let mut file = sac::SacFile::read(target.sac)?;
    let trace = file.to_trace();
    let mut history = PickHistory::new(file.header.read_picks(relative));

    if auto {
        let arrival = history
            .current()
            .p_arrival
            .or_else(|| file.header.arrival_time(relative));
        match PulseDetector::new(config.detector).detect_opt(&trace, arrival) {
            Ok(result) => {
                history.apply(PickEdit::Auto(PickSet::from(&result)));
            }
            Err(err) => warn!("automatic pick skipped: {} ({})", err, err.reason()),
        }
    }
    for edit in edits {
        history.apply(*edit);
    }
    for _ in 0..undo {
        if !history.undo() {
            warn!("nothing left to undo");
            break;
        }
    }

    let picks = *history.current();
    if !target.dry_run {
        file.header.write_picks(&picks, relative);
        file.write(target.sac)?;
        info!("stored picks in {}", target.sac.display());
        if let Some(book_path) = target.book {
            let event_id = match &target.event {
                Some(event) => event.clone(),
                None => target
                    .sac
                    .parent()
                    .and_then(Path::file_name)
                    .map(|name| name.to_string_lossy().to_string())
                    .context("cannot infer the event id; pass --event")?,
            };
            let station_id = trace
                .station_id()
                .context("SAC header has no station name for the pick book")?;
            let mut book = if book_path.exists() {
                csv_io::read_picks_csv(book_path)?
            } else {
                PickBook::new()
            };
            book.save(StationKey::new(event_id, station_id), picks);
            csv_io::write_picks_csv(book_path, &book)?;
            info!("updated {} ({} row(s))", book_path.display(), book.len());
        }
    }

    let out = PickOutput {
        station_id: trace.station_id(),
        picks,
        applied: history
            .applied()
            .iter()
            .map(|entry| entry.label.clone())
            .collect(),
        redo: history.redo_label().map(str::to_string),
        written: !target.dry_run,
    };
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

fn cmd_plot(
    config: &PickerConfig,
    sac_path: &Path,
    out: &Path,
    before: f64,
    redetect: bool,
) -> Result<()> {
    let relative = config.ingest.arrival_relative_to_begin;
    let file = sac::SacFile::read(sac_path)?;
    let trace = file.to_trace();
    let header_arrival = file.header.arrival_time(relative);
    let detector = PulseDetector::new(config.detector);
    let found = if redetect {
        detector
            .detect_opt(&trace, header_arrival)
            .map(|result| PickSet::from(&result))
    } else {
        file.stored_or_detected(&detector, relative)
    };
    let picks = match found {
        Ok(picks) => picks,
        Err(err) => {
            warn!("plotting without pulse picks: {}", err);
            PickSet {
                p_arrival: header_arrival,
                ..PickSet::default()
            }
        }
    };
    let arrival = picks
        .p_arrival
        .or(header_arrival)
        .context("trace has no arrival pick in t1, t3 or t4")?;
    let title = trace
        .station_id()
        .unwrap_or_else(|| sac_path.display().to_string());
    let fig = figure_for_pulse(
        &title,
        &trace,
        &picks,
        arrival - before,
        arrival + config.detector.search_window,
        2000,
    );
    draw_plotters_figure(out, &fig)
}

fn cmd_synth(spec: &PulseSpec, seed: u64, begin: f64, pick: bool, out: &Path) -> Result<()> {
    if !(spec.delta > 0.0) || spec.npts == 0 {
        bail!("synthetic trace needs a positive delta and at least one sample");
    }
    let mut trace = pulse_trace(spec, seed);
    trace.begin = begin;
    let mut file = sac::SacFile::from_trace(&trace);
    if pick {
        file.header.set_t(1, Some(spec.arrival + begin));
    }
    file.write(out)?;
    info!("wrote {} samples to {}", trace.len(), out.display());
    Ok(())
}

fn rgb(color: ppick_lib::plot::Color) -> RGBColor {
    let (r, g, b) = color.rgb();
    RGBColor(r, g, b)
}

fn stroke(style: &Style) -> ShapeStyle {
    rgb(style.color).stroke_width(style.width.max(1))
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    let (x_min, x_max, mut y_min, mut y_max) =
        fig.bounds().context("nothing to plot in the requested span")?;
    let pad = ((y_max - y_min) * 0.05).max(1e-9);
    y_min -= pad;
    y_max += pad;
    let x_max = if x_max > x_min { x_max } else { x_min + 1.0 };

    let backend = BitMapBackend::new(path, (900, 480));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Trace".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    chart
        .configure_mesh()
        .x_desc(fig.x.label.clone().unwrap_or_default())
        .y_desc(fig.y.label.clone().unwrap_or_default())
        .draw()?;
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                chart.draw_series(LineSeries::new(
                    line.points.iter().map(|p| (p[0], p[1])),
                    stroke(&line.style),
                ))?;
            }
            Series::Marker { x, style, .. } => {
                chart.draw_series(LineSeries::new(
                    [(*x, y_min), (*x, y_max)],
                    stroke(style),
                ))?;
            }
            Series::Point { at, color, .. } => {
                chart.draw_series(std::iter::once(Circle::new(
                    (at[0], at[1]),
                    4,
                    rgb(*color).filled(),
                )))?;
            }
        }
    }
    root.present()?;
    Ok(())
}
