//! Per-chunk render tasks.
//!
//! A [`RenderTask`] resolves the amplitudes for one chunk index, optionally
//! dampens the chunk edges, and hands the result to a [`WaveformDrawer`]. Input is
//! either already resolved when the task is created, or pending on an analysis
//! handle that is read once the analysis has left the queue.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use wavechunk_types::{Dampening, WaveformStyle};

use crate::analysis::{AnalysisHandle, Generation};
use crate::draw::{Bitmap, WaveformDrawer};
use crate::dsp::{DspConfig, Extraction, extract_amplitudes};
use crate::partition::{ChunkSpec, TimeSpan};
use crate::pcm::PcmSource;
use crate::queue::CancelToken;
use crate::read_queue::ReadQueue;
use crate::resample::resample;

/// Bitmap size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderRequest {
    pub index: usize,
    pub size: PixelSize,
}

/// Data a render task draws from.
#[derive(Clone, Debug)]
pub enum ChunkData {
    /// Normalized amplitudes ready to draw.
    Samples(Arc<[f32]>),
    /// A time range the task has to decode itself.
    Range(ChunkSpec<TimeSpan>),
}

#[derive(Clone, Debug)]
pub enum RenderInput {
    Resolved(ChunkData),
    Pending(Arc<AnalysisHandle>),
}

/// How a task turns a [`ChunkData::Range`] into amplitudes.
#[derive(Clone)]
pub enum ChunkLoader {
    /// Ranges cannot be loaded; only sample data is drawable.
    Direct,
    Media {
        source: Arc<dyn PcmSource>,
        read_queue: ReadQueue,
        dsp: DspConfig,
    },
}

impl std::fmt::Debug for ChunkLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkLoader::Direct => f.write_str("Direct"),
            ChunkLoader::Media { source, .. } => write!(f, "Media({})", source.describe()),
        }
    }
}

#[derive(Debug)]
pub enum RenderOutcome {
    Cancelled,
    Done {
        bitmap: Option<Bitmap>,
        /// Amplitudes this task decoded itself, for caching by the owner.
        loaded: Option<Arc<[f32]>>,
    },
}

impl RenderOutcome {
    fn empty() -> Self {
        RenderOutcome::Done {
            bitmap: None,
            loaded: None,
        }
    }
}

/// One chunk's render work. Cloning yields an identical, not-yet-submitted task.
#[derive(Clone)]
pub struct RenderTask {
    pub request: RenderRequest,
    pub generation: Generation,
    input: RenderInput,
    loader: ChunkLoader,
    style: WaveformStyle,
    scale: f32,
    drawer: Arc<dyn WaveformDrawer>,
}

impl std::fmt::Debug for RenderTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTask")
            .field("request", &self.request)
            .field("generation", &self.generation)
            .field("input", &self.input)
            .field("loader", &self.loader)
            .finish()
    }
}

impl RenderTask {
    pub fn new(
        request: RenderRequest,
        generation: Generation,
        input: RenderInput,
        loader: ChunkLoader,
        style: WaveformStyle,
        scale: f32,
        drawer: Arc<dyn WaveformDrawer>,
    ) -> Self {
        Self {
            request,
            generation,
            input,
            loader,
            style,
            scale,
            drawer,
        }
    }

    pub fn index(&self) -> usize {
        self.request.index
    }

    /// Analysis this task is waiting on, if any.
    pub fn dependency(&self) -> Option<&Arc<AnalysisHandle>> {
        match &self.input {
            RenderInput::Pending(handle) => Some(handle),
            RenderInput::Resolved(_) => None,
        }
    }

    pub fn depends_on(&self, handle: &Arc<AnalysisHandle>) -> bool {
        self.dependency().is_some_and(|h| Arc::ptr_eq(h, handle))
    }

    /// Resolve, dampen and draw. Checks `cancel` before and after drawing.
    pub fn run(&self, cancel: &CancelToken) -> RenderOutcome {
        let index = self.request.index;
        if cancel.is_cancelled() {
            return RenderOutcome::Cancelled;
        }

        let data = match &self.input {
            RenderInput::Resolved(data) => Some(data.clone()),
            RenderInput::Pending(handle) => handle.result().and_then(|r| r.chunk_data(index)),
        };
        let Some(data) = data else {
            tracing::debug!(index, generation = %self.generation, "no data for chunk");
            return RenderOutcome::empty();
        };

        let (samples, loaded) = match data {
            ChunkData::Samples(samples) => (samples, None),
            ChunkData::Range(spec) => match self.load_range(&spec, cancel) {
                Ok(Some(samples)) => (samples.clone(), Some(samples)),
                Ok(None) => return RenderOutcome::Cancelled,
                Err(err) => {
                    tracing::warn!(index, generation = %self.generation, "chunk read failed: {err:#}");
                    return RenderOutcome::empty();
                }
            },
        };

        if samples.is_empty() || self.request.size.width == 0 {
            return RenderOutcome::Done {
                bitmap: None,
                loaded,
            };
        }
        if cancel.is_cancelled() {
            return RenderOutcome::Cancelled;
        }

        let width = self.request.size.width as usize;
        let mut drawable = if samples.len() == width {
            samples.to_vec()
        } else {
            resample(&samples, width)
        };
        if let Some(dampening) = self.style.dampening.as_ref() {
            drawable = dampen(&drawable, dampening);
        }

        let bitmap = self
            .drawer
            .draw(&drawable, &self.style, self.request.size, self.scale);
        if cancel.is_cancelled() {
            return RenderOutcome::Cancelled;
        }
        RenderOutcome::Done { bitmap, loaded }
    }

    /// `Ok(None)` when cancelled mid-read.
    fn load_range(
        &self,
        spec: &ChunkSpec<TimeSpan>,
        cancel: &CancelToken,
    ) -> Result<Option<Arc<[f32]>>> {
        let ChunkLoader::Media {
            source,
            read_queue,
            dsp,
        } = &self.loader
        else {
            return Err(anyhow!("no media to read chunk {} from", spec.index));
        };
        if spec.target_samples == 0 {
            return Ok(Some(Arc::from(Vec::new())));
        }
        let opener = source.clone();
        let span = spec.extent;
        let mut reader = read_queue
            .run_sync(move || opener.open(Some(span)))
            .ok_or_else(|| anyhow!("read queue closed"))??;
        match extract_amplitudes(reader.as_mut(), spec.target_samples, dsp, cancel)? {
            Extraction::Complete(values) => Ok(Some(Arc::from(values))),
            Extraction::Cancelled => Ok(None),
        }
    }
}

/// Ease amplitudes towards silence near the chunk edges.
///
/// Each value becomes `1 - (1 - v) * factor`, where `factor` ramps from 0 to 1
/// across the first (and/or last) `percentage` of the chunk.
pub fn dampen(samples: &[f32], dampening: &Dampening) -> Vec<f32> {
    if dampening.percentage <= 0.0 || samples.is_empty() {
        return samples.to_vec();
    }
    let count = samples.len() as f32;
    samples
        .iter()
        .enumerate()
        .map(|(x, value)| 1.0 - (1.0 - value) * damp_factor(x as f32, count, dampening))
        .collect()
}

fn damp_factor(x: f32, count: f32, dampening: &Dampening) -> f32 {
    let edge = count * dampening.percentage;
    let right_start = count - edge;
    if dampening.sides.includes_left() && x < edge {
        dampening.easing.apply(x / edge)
    } else if dampening.sides.includes_right() && x > right_start {
        dampening.easing.apply(1.0 - (x - right_start) / edge)
    } else {
        1.0
    }
}
