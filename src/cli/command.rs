use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use rdopt::strategy::Algorithm;

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Rate-distortion layer allocation for scalable video codestreams",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat recoverable configuration warnings as fatal errors.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Order the quality layers of a codestream by rate-distortion value.
    Optimize(OptimizeArgs),

    /// Extract a fixed number of layers per subband, without searching.
    Transcode(TranscodeArgs),
}

/// Codestream layout options shared by both operations.
#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Directory holding the codestream (one file per subband component and
    /// frame).
    #[arg(value_name = "STREAM_DIR", default_value = ".")]
    pub stream_dir: PathBuf,

    /// Number of GOPs to process.
    #[arg(long, default_value_t = 1)]
    pub gops: usize,

    /// Iterations of the temporal transform + 1.
    #[arg(long, default_value_t = 4)]
    pub trls: usize,

    /// Spatial resolution levels of the codestream.
    #[arg(long, default_value_t = 5)]
    pub srls: usize,

    /// Frames per second.
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,

    /// Discarded spatial resolution levels, one entry per subband.
    /// For TRLs=3 the five values correspond to L2, H2, H1, M2 and M1.
    #[arg(long, value_name = "LIST", default_value = "0,0,0,0,0,0,0,0,0")]
    pub discard_srls: String,

    /// Number of quality layers per texture subband.
    #[arg(long, default_value_t = 16)]
    pub layers: usize,

    /// Picture width in pixels.
    #[arg(long, default_value_t = 352)]
    pub pixels_in_x: usize,

    /// Picture height in pixels.
    #[arg(long, default_value_t = 288)]
    pub pixels_in_y: usize,

    /// Block size of the motion estimation process.
    #[arg(long, default_value_t = 32)]
    pub block_size: usize,

    /// Minimal block size allowed in the motion estimation process.
    #[arg(long, default_value_t = 32)]
    pub block_size_min: usize,

    /// Search range of the motion estimation process.
    #[arg(long, default_value_t = 4)]
    pub search_range: usize,

    /// Weight of the temporal update step.
    #[arg(long, default_value_t = 0.25)]
    pub update_factor: f64,
}

#[derive(Debug, Args)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// Sorting algorithm.
    #[arg(long, value_enum)]
    pub algorithm: AlgorithmArg,

    /// Bit-rate budget in kb/s; layers are ordered up to this rate.
    /// Unbounded when absent: the whole codestream is ordered.
    #[arg(long, value_name = "KBPS")]
    pub brc: Option<f64>,

    /// YAML file with the gain-ordered transmission schedule, for temporal
    /// depths without a built-in table.
    #[arg(long, value_name = "FILE")]
    pub gain_table: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct TranscodeArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// Layers to extract per subband, for the whole sequence.
    #[arg(long, value_name = "LIST", conflicts_with = "schedule")]
    pub combination: Option<String>,

    /// YAML file with one combination per GOP.
    #[arg(long, value_name = "FILE")]
    pub schedule: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AlgorithmArg {
    /// Independent transmission by subbands, subset-reference distortion.
    Its,
    /// Progressive transmission by subbands.
    Pts,
    /// Progressive transmission by layers.
    Ptl,
    /// Attenuation-modulated PTL, gain-table order.
    Amptl,
    /// Full-search R/D optimization (the expensive accuracy baseline).
    Fs,
    /// Subband-removal R/D optimization.
    Sr,
    /// Isolated-subband-removal R/D optimization.
    Isr,
}

impl AlgorithmArg {
    pub fn to_algorithm(self) -> Algorithm {
        match self {
            AlgorithmArg::Its => Algorithm::Its,
            AlgorithmArg::Pts => Algorithm::Pts,
            AlgorithmArg::Ptl => Algorithm::Ptl,
            AlgorithmArg::Amptl => Algorithm::AmPtl,
            AlgorithmArg::Fs => Algorithm::FullSearch,
            AlgorithmArg::Sr => Algorithm::SubbandRemoval,
            AlgorithmArg::Isr => Algorithm::IsolatedRemoval,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}
