use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "wavechunk", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze an audio file and render every chunk of its waveform
    Render(RenderArgs),

    /// Print how a timeline would be cut into chunks
    Layout(LayoutArgs),
}

/// How chunk amplitudes are obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum RenderMode {
    /// Decode the whole file once, then slice it per chunk
    #[default]
    Media,
    /// Decode each chunk's time range on demand
    TimeRange,
}

#[derive(ClapArgs, Debug)]
pub struct RenderArgs {
    /// Path to the audio file
    pub path: PathBuf,

    #[arg(long, value_enum, default_value_t = RenderMode::Media)]
    pub mode: RenderMode,

    /// Timeline width in points
    #[arg(long)]
    pub total_width: Option<f64>,

    /// Chunk width in points
    #[arg(long)]
    pub item_width: Option<f64>,

    /// Chunk height in points
    #[arg(long)]
    pub height: Option<f64>,

    /// Pixels per point
    #[arg(long)]
    pub scale: Option<f64>,

    /// Noise floor in dB; quieter samples count as silence
    #[arg(long, allow_hyphen_values = true)]
    pub noise_floor_db: Option<f32>,

    /// After the first pass, reconfigure to this timeline width and render again
    #[arg(long)]
    pub rezoom_width: Option<f64>,

    /// Print one JSON report per chunk
    #[arg(long)]
    pub json: bool,

    /// Give up if rendering takes longer than this many seconds
    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,

    /// Optional config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct LayoutArgs {
    /// Track duration in milliseconds
    #[arg(long)]
    pub duration_ms: u64,

    /// Timeline width in points
    #[arg(long)]
    pub total_width: f64,

    /// Chunk width in points
    #[arg(long, default_value_t = 256.0)]
    pub item_width: f64,

    /// Pixels per point
    #[arg(long, default_value_t = 2.0)]
    pub scale: f64,
}
