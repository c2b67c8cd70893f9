//! Chunked waveform rendering.
//!
//! A timeline is cut into chunks ([`partition`]), one analysis per
//! configuration extracts normalized amplitudes ([`analysis`], [`dsp`]), and
//! each visible chunk is drawn by its own render task ([`render`], [`draw`]).
//! [`provider::WaveformProvider`] ties them together on a [`queue::TaskQueue`].

pub mod analysis;
pub mod config;
pub mod container;
pub mod draw;
pub mod dsp;
pub mod partition;
pub mod pcm;
pub mod provider;
pub mod queue;
pub mod read_queue;
pub mod render;
pub mod resample;
pub mod source;

pub use analysis::{AnalysisState, AnalysisSummary, Generation};
pub use config::{ChunkLayout, EngineConfig};
pub use draw::{Bitmap, RasterDrawer, WaveformDrawer};
pub use pcm::{FilePcmSource, MemoryPcmSource, PcmSource};
pub use provider::WaveformProvider;
pub use queue::TaskQueue;
pub use read_queue::ReadQueue;
pub use render::PixelSize;
pub use source::{MediaWaveform, RenderSettings, SamplesInput, SamplesWaveform, TimeRangeWaveform};
pub use wavechunk_types as types;
