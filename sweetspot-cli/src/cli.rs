// sweetspot-cli/src/cli.rs
//
// Defines the command-line argument structures using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use sweetspot_core::analysis::{AcquisitionStrategy, ComplexityMode, WindowMethod};
use sweetspot_core::external::AudioMode;

// --- CLI Argument Definition ---

#[derive(Parser, Debug)]
#[command(
    author,
    version, // Reads from Cargo.toml via "cargo" feature in clap
    about = "Sweetspot: encoder preset/quality optimizer",
    long_about = "Finds a representative sample of a video and searches encoder presets and \
                  quality values for the best VMAF/size trade-off via sweetspot-core."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file; missing fields keep their defaults
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Finds the most (or least) complex window of a video
    Analyze(AnalyzeArgs),
    /// Runs trials over presets and quality values and reports the sweet spot
    Optimize(OptimizeArgs),
    /// Lists the supported codecs with their presets and quality ranges
    Codecs,
}

#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    /// Sample length in seconds
    #[arg(long = "sample-duration", value_name = "SECONDS", default_value_t = 10.0)]
    pub duration: f64,

    #[arg(long, value_enum, default_value_t = ModeArg::MostComplex)]
    pub mode: ModeArg,

    #[arg(long, value_enum, default_value_t = MethodArg::Sliding)]
    pub method: MethodArg,

    /// How frame data is gathered
    #[arg(long, value_enum, default_value_t = StrategyArg::Parallel)]
    pub strategy: StrategyArg,

    /// ffprobe executable used for frame analysis
    #[arg(long, value_name = "PATH", env = "SWEETSPOT_FFPROBE", default_value = "ffprobe")]
    pub ffprobe: PathBuf,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Source video
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub window: WindowArgs,

    /// Also cut the selected window into this directory (stream copy)
    #[arg(long, value_name = "DIR")]
    pub extract_to: Option<PathBuf>,

    /// Print the selection as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct OptimizeArgs {
    /// Source video
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Encoder to optimize (see `sweetspot codecs`)
    #[arg(short, long, default_value = "libsvtav1")]
    pub codec: String,

    /// Presets to try, comma separated (defaults to the codec's default preset)
    #[arg(short, long, value_delimiter = ',', value_name = "PRESETS")]
    pub presets: Vec<String>,

    /// Lowest quality value (defaults to the codec minimum)
    #[arg(long, value_name = "Q")]
    pub quality_min: Option<u32>,

    /// Highest quality value (defaults to the codec maximum)
    #[arg(long, value_name = "Q")]
    pub quality_max: Option<u32>,

    /// Quality value step for range sweeps
    #[arg(long, value_name = "STEP", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub step: u32,

    /// Search each preset for this VMAF instead of sweeping the whole range
    #[arg(long, value_name = "VMAF")]
    pub target_vmaf: Option<f64>,

    /// Encoder/prober service command
    #[arg(long, value_name = "COMMAND", env = "SWEETSPOT_SERVICE")]
    pub service: PathBuf,

    /// Extra argument for the service command (repeatable)
    #[arg(long = "service-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub service_args: Vec<String>,

    /// Use an already extracted sample instead of analyzing the source
    #[arg(long, value_name = "FILE", conflicts_with = "start")]
    pub sample: Option<PathBuf>,

    /// Sample start in seconds; skips scene analysis
    #[arg(long, value_name = "SECONDS")]
    pub start: Option<f64>,

    #[command(flatten)]
    pub window: WindowArgs,

    /// Parallel trial jobs (capped by physical cores and encoder session limits)
    #[arg(short, long, value_name = "JOBS")]
    pub jobs: Option<usize>,

    #[arg(long, value_enum, default_value_t = AudioArg::Remove)]
    pub audio: AudioArg,

    /// Ask the service for PSNR
    #[arg(long)]
    pub psnr: bool,

    /// Ask the service for SSIM
    #[arg(long)]
    pub ssim: bool,

    /// Ask the service for a block-artifact score
    #[arg(long)]
    pub blockdetect: bool,

    /// Advanced encoder option as KEY=VALUE (repeatable)
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub options: Vec<(String, String)>,

    /// Custom VMAF model passed to the service
    #[arg(long, value_name = "FILE")]
    pub quality_model: Option<PathBuf>,

    /// Root for samples and per-trial work directories (default: a temporary
    /// directory removed when the run ends)
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Write the full JSON report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

/// Parses `KEY=VALUE`; the value may itself contain `=`.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

// --- Value enums mapped onto core types ---

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    MostComplex,
    LeastComplex,
}

impl From<ModeArg> for ComplexityMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::MostComplex => ComplexityMode::MostComplex,
            ModeArg::LeastComplex => ComplexityMode::LeastComplex,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodArg {
    Sliding,
    SinglePoint,
}

impl From<MethodArg> for WindowMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Sliding => WindowMethod::SlidingWindow,
            MethodArg::SinglePoint => WindowMethod::SinglePoint,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    Parallel,
    Sequential,
}

impl From<StrategyArg> for AcquisitionStrategy {
    fn from(strategy: StrategyArg) -> Self {
        match strategy {
            StrategyArg::Parallel => AcquisitionStrategy::Parallel,
            StrategyArg::Sequential => AcquisitionStrategy::Sequential,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioArg {
    Remove,
    Copy,
    Transcode,
}

impl From<AudioArg> for AudioMode {
    fn from(audio: AudioArg) -> Self {
        match audio {
            AudioArg::Remove => AudioMode::Remove,
            AudioArg::Copy => AudioMode::Copy,
            AudioArg::Transcode => AudioMode::Transcode,
        }
    }
}
