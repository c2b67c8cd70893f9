//! Configuration loading and resolution.
//!
//! An optional TOML file supplies defaults; command-line arguments win.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use wavechunk::EngineConfig;
use wavechunk_types::WaveformStyle;

use crate::cli::{RenderArgs, RenderMode};

const DEFAULT_TOTAL_WIDTH: f64 = 1024.0;

/// Config file schema.
#[derive(Debug, Default, Deserialize)]
pub struct WavechunkConfig {
    /// Timeline width in points.
    pub total_width: Option<f64>,
    /// Chunk width in points.
    pub item_width: Option<f64>,
    /// Chunk height in points.
    pub height: Option<f64>,
    /// Pixels per point.
    pub scale: Option<f64>,
    /// Noise floor in dB.
    pub noise_floor_db: Option<f32>,
    /// Presentation settings.
    pub style: Option<WaveformStyle>,
}

impl WavechunkConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<WavechunkConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Everything `run_render` needs.
#[derive(Clone, Debug)]
pub struct RenderRunConfig {
    pub path: PathBuf,
    pub mode: RenderMode,
    pub total_width: f64,
    pub rezoom_width: Option<f64>,
    pub engine: EngineConfig,
    pub json: bool,
    pub timeout: Duration,
}

impl RenderRunConfig {
    /// Merge `args` over `file` over built-in defaults.
    pub fn resolve(args: &RenderArgs, file: WavechunkConfig) -> Self {
        let mut engine = EngineConfig::default();
        if let Some(style) = file.style {
            engine.style = style;
        }
        engine.item_width = args.item_width.or(file.item_width).unwrap_or(engine.item_width);
        engine.height = args.height.or(file.height).unwrap_or(engine.height);
        engine.scale = args.scale.or(file.scale).unwrap_or(engine.scale);
        engine.dsp.noise_floor_db = args
            .noise_floor_db
            .or(file.noise_floor_db)
            .unwrap_or(engine.dsp.noise_floor_db);

        Self {
            path: args.path.clone(),
            mode: args.mode,
            total_width: args
                .total_width
                .or(file.total_width)
                .unwrap_or(DEFAULT_TOTAL_WIDTH),
            rezoom_width: args.rezoom_width,
            engine,
            json: args.json,
            timeout: Duration::from_secs(args.timeout_secs),
        }
    }

    /// Load the config file named in `args`, if any, and resolve.
    pub fn from_args(args: &RenderArgs) -> Result<Self> {
        let file = match args.config.as_ref() {
            Some(path) => WavechunkConfig::load(path)?,
            None => WavechunkConfig::default(),
        };
        Ok(Self::resolve(args, file))
    }
}
