//! flimkit CLI
//!
//! Phasor analysis of time-resolved fluorescence images from the command line.
#![allow(clippy::cast_precision_loss, clippy::too_many_lines)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use flimkit_algorithms::plot::finite_points;
use flimkit_algorithms::{
    analyze_session, phasor_center, phasor_from_signal, summarize_groups, Calibration,
    CalibrationConfig, Dataset, FilterConfig, RawSignal, Roi, RoiColor, Session,
};
use flimkit_io::{open_source, CsvWriter, LayerRegistry, RawLayout, SampleType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    FlimIo(#[from] flimkit_io::Error),

    #[error("{0}")]
    Core(#[from] flimkit_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid arguments: {0}")]
    Usage(String),
}

/// Element type of raw input files.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Dtype {
    U8,
    U16,
    U32,
}

impl From<Dtype> for SampleType {
    fn from(value: Dtype) -> Self {
        match value {
            Dtype::U8 => Self::U8,
            Dtype::U16 => Self::U16,
            Dtype::U32 => Self::U32,
        }
    }
}

/// Geometry of headerless raw inputs. Ignored for HDF5 files.
#[derive(Args, Debug, Clone)]
struct LayoutArgs {
    /// Time bins per pixel
    #[arg(long)]
    bins: Option<usize>,

    /// Image height in pixels
    #[arg(long)]
    height: Option<usize>,

    /// Image width in pixels
    #[arg(long)]
    width: Option<usize>,

    /// Element type of raw files
    #[arg(long, value_enum, default_value = "u16")]
    dtype: Dtype,

    /// Channels stored in each raw file
    #[arg(long, default_value = "1")]
    channels: usize,

    /// Channel to analyze
    #[arg(long, default_value = "0")]
    channel: usize,
}

impl LayoutArgs {
    /// The raw layout, if any geometry was given.
    fn layout(&self) -> Result<Option<RawLayout>> {
        match (self.bins, self.height, self.width) {
            (None, None, None) => Ok(None),
            (Some(bins), Some(height), Some(width)) => Ok(Some(
                RawLayout::new(bins, height, width)
                    .with_channels(self.channels)
                    .with_sample_type(self.dtype.into()),
            )),
            _ => Err(CliError::Usage(
                "raw inputs need all of --bins, --height and --width".to_string(),
            )),
        }
    }
}

/// Phasor analysis for fluorescence-lifetime imaging data.
#[derive(Parser)]
#[command(name = "flimkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show shape, photon totals and phasor center of an input
    Info {
        input: PathBuf,

        /// Repetition frequency in MHz, overriding the file
        #[arg(long)]
        frequency: Option<f64>,

        #[command(flatten)]
        layout: LayoutArgs,
    },

    /// Fit calibration parameters from a reference of known lifetime
    Calibrate {
        reference: PathBuf,

        /// Reference lifetime in nanoseconds
        #[arg(long, default_value = "4.1")]
        lifetime: f64,

        /// Repetition frequency in MHz, overriding the file
        #[arg(long)]
        frequency: Option<f64>,

        #[arg(long, default_value = "1")]
        harmonic: u32,

        /// Write the calibration as JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        layout: LayoutArgs,
    },

    /// Calibrate, filter and classify one or more samples
    Analyze {
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Reference sample used for calibration
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Reference lifetime in nanoseconds
        #[arg(long, default_value = "4.1")]
        lifetime: f64,

        /// Repetition frequency in MHz, overriding the files
        #[arg(long)]
        frequency: Option<f64>,

        #[arg(long, default_value = "1")]
        harmonic: u32,

        /// Median filter kernel size (odd)
        #[arg(long, default_value = "3")]
        median_kernel: usize,

        /// Median filter passes; 0 disables filtering
        #[arg(long, default_value = "0")]
        median_repeat: usize,

        #[arg(long, default_value = "0")]
        min_photons: u64,

        #[arg(long)]
        max_photons: Option<u64>,

        /// JSON list of circular ROIs
        #[arg(long)]
        rois: Option<PathBuf>,

        /// Directory for CSV output
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Group label; give once for all inputs or once per input
        #[arg(long)]
        group: Vec<String>,

        #[command(flatten)]
        layout: LayoutArgs,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_signal(path: &Path, layout: &LayoutArgs, frequency: Option<f64>) -> Result<RawSignal> {
    let source = open_source(path, layout.layout()?)?;
    let signal = source.load(layout.channel)?;
    Ok(match frequency {
        Some(f) => signal.with_frequency(f),
        None => signal,
    })
}

fn load_rois(path: &Path) -> Result<Vec<Roi>> {
    let text = std::fs::read_to_string(path)?;
    let rois: Vec<Roi> = serde_json::from_str(&text)?;
    for roi in &rois {
        roi.validate()?;
    }
    Ok(rois)
}

/// One group label per input.
fn assign_groups(groups: &[String], inputs: usize) -> Result<Vec<String>> {
    match groups.len() {
        0 => Ok(vec!["default".to_string(); inputs]),
        1 => Ok(vec![groups[0].clone(); inputs]),
        n if n == inputs => Ok(groups.to_vec()),
        n => Err(CliError::Usage(format!(
            "{n} group labels for {inputs} inputs"
        ))),
    }
}

fn dataset_name(path: &Path, index: usize) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map_or_else(|| format!("sample{index}"), str::to_string)
}

fn calibration_config(lifetime: f64, frequency: Option<f64>, harmonic: u32) -> CalibrationConfig {
    let config = CalibrationConfig::new(lifetime).with_harmonic(harmonic);
    match frequency {
        Some(f) => config.with_frequency(f),
        None => config,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info {
            input,
            frequency,
            layout,
        } => {
            let signal = load_signal(&input, &layout, frequency)?;
            let photons = signal.photon_sum();
            let total: u64 = photons.sum();
            let (height, width) = signal.image_shape();

            println!("File: {}", input.display());
            println!("Channel: {}", signal.metadata().channel);
            println!("Time bins: {}", signal.bins());
            println!("Image: {height} x {width}");
            match signal.metadata().resolve_frequency() {
                f if f.is_fallback() => println!("Frequency: {} MHz (default)", f.mhz()),
                f => println!("Frequency: {} MHz", f.mhz()),
            }
            println!("Total photons: {total}");
            println!(
                "Mean photons/pixel: {:.1}",
                total as f64 / (height * width).max(1) as f64
            );

            let map = phasor_from_signal(&signal, 1)?;
            let finite = finite_points(map.real(), map.imag(), usize::MAX)?.len();
            println!("Pixels with a phasor: {finite}");
            match phasor_center(&map) {
                Ok((g, s)) => println!("Phasor center (H1): g={g:.4} s={s:.4}"),
                Err(e) => println!("Phasor center: unavailable ({e})"),
            }
        }

        Commands::Calibrate {
            reference,
            lifetime,
            frequency,
            harmonic,
            output,
            layout,
        } => {
            let signal = load_signal(&reference, &layout, None)?;
            let mut calibration = Calibration::new();
            let state = *calibration
                .fit_signal(&signal, &calibration_config(lifetime, frequency, harmonic))?;
            log::info!(
                "phase zero {:.4} rad, modulation zero {:.4}",
                state.phase_zero,
                state.modulation_zero
            );

            let json = serde_json::to_string_pretty(&state)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("Calibration written to {}", path.display());
                }
                None => println!("{json}"),
            }
        }

        Commands::Analyze {
            input,
            reference,
            lifetime,
            frequency,
            harmonic,
            median_kernel,
            median_repeat,
            min_photons,
            max_photons,
            rois,
            output,
            group,
            layout,
        } => {
            let start = Instant::now();
            let groups = assign_groups(&group, input.len())?;
            let rois = match rois {
                Some(path) => load_rois(&path)?,
                None => Vec::new(),
            };
            let filters = FilterConfig::new()
                .with_median(median_kernel, median_repeat)
                .with_min_photons(min_photons)
                .with_max_photons(max_photons);

            let mut session = Session::new();
            for (index, (path, group)) in input.iter().zip(groups).enumerate() {
                let signal = load_signal(path, &layout, frequency)?;
                let dataset = Dataset::load(dataset_name(path, index), Arc::new(signal), harmonic)?
                    .with_group(group);
                session.add_dataset(dataset);
            }

            if let Some(reference) = reference {
                let signal = load_signal(&reference, &layout, None)?;
                session.fit_calibration_signal(
                    &signal,
                    &calibration_config(lifetime, frequency, harmonic),
                )?;
            } else {
                log::warn!("no reference given, phasors are uncalibrated");
            }

            let results = analyze_session(&mut session, &filters, &rois)?;
            let group_summaries = summarize_groups(
                session
                    .datasets()
                    .iter()
                    .map(Dataset::group)
                    .zip(results.iter()),
            )?;

            for (dataset, result) in session.datasets().iter().zip(&results) {
                println!(
                    "{} [{} {}]: {} valid pixels, frequency {} MHz",
                    dataset.name(),
                    dataset.group(),
                    RoiColor::for_label(dataset.group()),
                    result.valid_pixels,
                    dataset.frequency().mhz()
                );
                for s in &result.summaries {
                    println!(
                        "  {:>2} {:<16} {:>8} px ({:>5.1}%)  tau_normal {:.3} ns",
                        s.index,
                        s.name,
                        s.pixel_count,
                        100.0 * s.fraction,
                        s.mean_normal_lifetime
                    );
                }
            }

            if let Some(dir) = output {
                std::fs::create_dir_all(&dir)?;
                let mut registry = LayerRegistry::new();
                for (index, (dataset, result)) in
                    session.datasets().iter().zip(&results).enumerate()
                {
                    let prefix = format!("{index:02}_{}", dataset.name());
                    registry.publish_dataset(&prefix, dataset);
                    registry.publish_labels(&prefix, result);

                    let columns: Vec<String> = [
                        "intensity",
                        "g",
                        "s",
                        "phase_lifetime",
                        "modulation_lifetime",
                        "normal_lifetime",
                        "photon_mask",
                        "roi_labels",
                    ]
                    .iter()
                    .map(|layer| format!("{prefix}/{layer}"))
                    .collect();
                    let names: Vec<&str> = columns.iter().map(String::as_str).collect();
                    CsvWriter::create(dir.join(format!("{prefix}_pixels.csv")))?
                        .write_pixel_table(&registry.select(&names)?)?;
                    CsvWriter::create(dir.join(format!("{prefix}_rois.csv")))?
                        .write_roi_summaries(dataset.name(), &result.summaries)?;
                }
                CsvWriter::create(dir.join("groups.csv"))?
                    .write_group_summaries(&group_summaries)?;
                if let Some(state) = session.calibration().state() {
                    std::fs::write(
                        dir.join("calibration.json"),
                        serde_json::to_string_pretty(state)?,
                    )?;
                }
                #[cfg(feature = "hdf5")]
                flimkit_io::write_layers_hdf5(dir.join("layers.h5"), &registry)?;
                println!("Output written to {}", dir.display());
            }

            println!(
                "Analyzed {} sample(s) in {:.2}s",
                results.len(),
                start.elapsed().as_secs_f64()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cli_parses_analyze() {
        let cli = Cli::try_parse_from([
            "flimkit", "-vv", "analyze", "a.raw", "b.raw", "--bins", "64", "--height", "8",
            "--width", "8", "--min-photons", "100", "--group", "ctrl", "--group", "drug",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Analyze {
            input,
            layout,
            group,
            min_photons,
            ..
        } = cli.command
        else {
            panic!("expected analyze");
        };
        assert_eq!(input.len(), 2);
        assert_eq!(group, vec!["ctrl", "drug"]);
        assert_eq!(min_photons, 100);
        let raw = layout.layout().unwrap().unwrap();
        assert_eq!((raw.bins, raw.height, raw.width), (64, 8, 8));
        assert_eq!(raw.sample_type, SampleType::U16);
    }

    #[test]
    fn test_partial_layout_is_rejected() {
        let cli = Cli::try_parse_from(["flimkit", "info", "a.raw", "--bins", "64"]).unwrap();
        let Commands::Info { layout, .. } = cli.command else {
            panic!("expected info");
        };
        assert!(matches!(layout.layout(), Err(CliError::Usage(_))));
    }

    #[test]
    fn test_assign_groups() {
        assert_eq!(assign_groups(&[], 2).unwrap(), vec!["default", "default"]);
        let one = vec!["a".to_string()];
        assert_eq!(assign_groups(&one, 3).unwrap().len(), 3);
        let two = vec!["a".to_string(), "b".to_string()];
        assert!(assign_groups(&two, 3).is_err());
    }

    #[test]
    fn test_load_rois() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r##"[{{"name": "free", "real": 0.8, "imag": 0.35, "radius": 0.05, "color": "#ff0000"}},
                {{"name": "bound", "real": 0.3, "imag": 0.4, "radius": 0.08}}]"##
        )
        .unwrap();
        let rois = load_rois(file.path()).unwrap();
        assert_eq!(rois.len(), 2);
        assert_eq!(rois[1].name, "bound");
        assert!(rois[1].color.is_none());

        let mut bad = NamedTempFile::new().unwrap();
        write!(bad, r#"[{{"name": "x", "real": 0.5, "imag": 0.2, "radius": -1.0}}]"#).unwrap();
        assert!(matches!(load_rois(bad.path()), Err(CliError::Core(_))));
    }
}
