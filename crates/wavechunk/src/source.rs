//! Waveform variants plugged into the provider.
//!
//! A [`WaveformSource`] decides what the analysis computes, how render tasks are
//! built, and what it caches between requests. The provider drives it from the
//! completion context only, so implementations need no locking.

use std::sync::Arc;
use std::time::Duration;

use wavechunk_types::WaveformStyle;

use crate::analysis::{AnalysisInput, AnalysisOutput, AnalysisResult, Generation};
use crate::config::ChunkLayout;
use crate::container::SamplesContainer;
use crate::draw::{RasterDrawer, WaveformDrawer};
use crate::dsp::DspConfig;
use crate::partition::{TimeSpan, partition};
use crate::pcm::PcmSource;
use crate::read_queue::ReadQueue;
use crate::render::{ChunkData, ChunkLoader, RenderInput, RenderRequest, RenderTask};

/// Strategy interface between the provider and one waveform variant.
pub trait WaveformSource {
    /// What the caller hands to `configure`.
    type Input;

    /// Build the analysis for a new configuration. Called before the cache is invalidated.
    fn prepare_analysis(&mut self, input: Self::Input, layout: &ChunkLayout) -> AnalysisInput;

    /// Forget everything derived from the previous analysis.
    fn invalidate_cache(&mut self);

    /// Drop all cached data, including anything kept for reuse by the next configuration.
    fn clear(&mut self) {
        self.invalidate_cache();
    }

    /// Render data already held for `index`.
    fn lookup_cached(&self, index: usize) -> Option<ChunkData>;

    /// Render data for `index` from an analysis that has finished but not yet been reported.
    fn lookup_from_finished_analysis(&self, result: &AnalysisResult, index: usize) -> Option<ChunkData> {
        result.chunk_data(index)
    }

    /// `None` when this variant cannot render the request.
    fn create_render_task(
        &self,
        request: RenderRequest,
        input: RenderInput,
        generation: Generation,
    ) -> Option<RenderTask>;

    /// The current generation's analysis finished successfully.
    fn analysis_finished(&mut self, result: &Arc<AnalysisResult>);

    /// A render of the current generation decoded `samples` for `index` itself.
    fn render_finished(&mut self, _index: usize, _samples: &Arc<[f32]>) {}
}

/// Presentation shared by every render task of a source.
#[derive(Clone)]
pub struct RenderSettings {
    pub style: WaveformStyle,
    pub drawer: Arc<dyn WaveformDrawer>,
}

impl RenderSettings {
    pub fn new(style: WaveformStyle) -> Self {
        Self {
            style,
            drawer: Arc::new(RasterDrawer),
        }
    }

    pub fn with_drawer(mut self, drawer: Arc<dyn WaveformDrawer>) -> Self {
        self.drawer = drawer;
        self
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::new(WaveformStyle::default())
    }
}

fn build_task(
    settings: &RenderSettings,
    scale: f64,
    request: RenderRequest,
    input: RenderInput,
    generation: Generation,
    loader: ChunkLoader,
) -> RenderTask {
    RenderTask::new(
        request,
        generation,
        input,
        loader,
        settings.style,
        scale as f32,
        settings.drawer.clone(),
    )
}

/// Whole-file decode: one DSP pass produces every chunk's amplitudes.
pub struct MediaWaveform {
    settings: RenderSettings,
    dsp: DspConfig,
    read_queue: ReadQueue,
    scale: f64,
    analyzed: Option<Arc<AnalysisResult>>,
}

impl MediaWaveform {
    pub fn new(settings: RenderSettings, dsp: DspConfig, read_queue: ReadQueue) -> Self {
        Self {
            settings,
            dsp,
            read_queue,
            scale: 1.0,
            analyzed: None,
        }
    }
}

impl WaveformSource for MediaWaveform {
    type Input = Arc<dyn PcmSource>;

    fn prepare_analysis(&mut self, input: Self::Input, layout: &ChunkLayout) -> AnalysisInput {
        self.scale = layout.scale;
        AnalysisInput::Media {
            source: input,
            span: None,
            chunk_counts: layout.chunk_counts(),
            dsp: self.dsp,
            read_queue: self.read_queue.clone(),
        }
    }

    fn invalidate_cache(&mut self) {
        self.analyzed = None;
    }

    fn lookup_cached(&self, index: usize) -> Option<ChunkData> {
        self.analyzed.as_ref()?.chunk_data(index)
    }

    fn create_render_task(
        &self,
        request: RenderRequest,
        input: RenderInput,
        generation: Generation,
    ) -> Option<RenderTask> {
        Some(build_task(
            &self.settings,
            self.scale,
            request,
            input,
            generation,
            ChunkLoader::Direct,
        ))
    }

    fn analysis_finished(&mut self, result: &Arc<AnalysisResult>) {
        self.analyzed = Some(result.clone());
    }
}

/// Samples supplied by the caller, e.g. a recorder that keeps appending.
#[derive(Clone, Debug)]
pub struct SamplesInput {
    /// Normalized amplitudes, `0` loud and `1` silent.
    pub samples: Arc<[f32]>,
    /// How many trailing samples are new since the previous configuration.
    pub new_samples_count: usize,
}

pub struct SamplesWaveform {
    settings: RenderSettings,
    scale: f64,
    analyzed: Option<Arc<AnalysisResult>>,
}

impl SamplesWaveform {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            scale: 1.0,
            analyzed: None,
        }
    }
}

impl WaveformSource for SamplesWaveform {
    type Input = SamplesInput;

    fn prepare_analysis(&mut self, input: Self::Input, layout: &ChunkLayout) -> AnalysisInput {
        self.scale = layout.scale;
        AnalysisInput::Samples {
            samples: input.samples,
            new_samples_count: input.new_samples_count,
            chunk_counts: layout.chunk_counts(),
        }
    }

    fn invalidate_cache(&mut self) {
        self.analyzed = None;
    }

    fn lookup_cached(&self, index: usize) -> Option<ChunkData> {
        self.analyzed.as_ref()?.chunk_data(index)
    }

    fn create_render_task(
        &self,
        request: RenderRequest,
        input: RenderInput,
        generation: Generation,
    ) -> Option<RenderTask> {
        Some(build_task(
            &self.settings,
            self.scale,
            request,
            input,
            generation,
            ChunkLoader::Direct,
        ))
    }

    fn analysis_finished(&mut self, result: &Arc<AnalysisResult>) {
        self.analyzed = Some(result.clone());
    }
}

/// Lazy per-chunk decode: the analysis only partitions the timeline and every
/// render task reads its own time range.
///
/// Decoded chunks are collected in a [`SamplesContainer`]. Once it is complete, a
/// reconfiguration against the same media redistributes the stored amplitudes
/// over the new layout instead of decoding again.
pub struct TimeRangeWaveform {
    settings: RenderSettings,
    dsp: DspConfig,
    read_queue: ReadQueue,
    scale: f64,
    media: Option<Arc<dyn PcmSource>>,
    span: TimeSpan,
    analyzed: Option<Arc<AnalysisResult>>,
    container: Option<SamplesContainer<TimeSpan>>,
    reused: bool,
}

impl TimeRangeWaveform {
    pub fn new(settings: RenderSettings, dsp: DspConfig, read_queue: ReadQueue) -> Self {
        Self {
            settings,
            dsp,
            read_queue,
            scale: 1.0,
            media: None,
            span: TimeSpan::from_start(Duration::ZERO),
            analyzed: None,
            container: None,
            reused: false,
        }
    }

    /// Container of decoded chunks for the current layout, if any.
    pub fn container(&self) -> Option<&SamplesContainer<TimeSpan>> {
        self.container.as_ref()
    }

    /// Whether the current analysis reuses previously decoded amplitudes.
    pub fn is_reusing(&self) -> bool {
        self.reused
    }

    fn reusable_samples(&self, input: &Arc<dyn PcmSource>, layout: &ChunkLayout) -> Option<Arc<[f32]>> {
        let media = self.media.as_ref()?;
        if !Arc::ptr_eq(media, input) {
            return None;
        }
        let total = layout.chunk_counts().iter().sum();
        self.container
            .as_ref()?
            .redensified(total)
            .map(Arc::from)
    }
}

impl WaveformSource for TimeRangeWaveform {
    type Input = Arc<dyn PcmSource>;

    fn prepare_analysis(&mut self, input: Self::Input, layout: &ChunkLayout) -> AnalysisInput {
        self.scale = layout.scale;
        self.span = TimeSpan::from_start(input.duration().unwrap_or_default());
        let reusable = self.reusable_samples(&input, layout);
        self.media = Some(input);
        self.reused = reusable.is_some();

        match reusable {
            Some(samples) => {
                tracing::debug!(
                    samples = samples.len(),
                    chunks = layout.len(),
                    "redistributing decoded amplitudes over new layout"
                );
                // The new container is filled from the amplitude table once analysis finishes.
                self.container = partition(self.span, &layout.weights, layout.scale)
                    .map(SamplesContainer::new);
                AnalysisInput::Samples {
                    samples,
                    new_samples_count: 0,
                    chunk_counts: layout.chunk_counts(),
                }
            }
            None => {
                self.container = None;
                AnalysisInput::TimeRanges {
                    span: self.span,
                    weights: layout.weights.clone(),
                    scale: layout.scale,
                }
            }
        }
    }

    fn invalidate_cache(&mut self) {
        self.analyzed = None;
    }

    fn clear(&mut self) {
        self.analyzed = None;
        self.container = None;
        self.reused = false;
    }

    fn lookup_cached(&self, index: usize) -> Option<ChunkData> {
        let complete = self.container.as_ref().filter(|c| c.is_complete());
        if let Some(samples) = complete.and_then(|c| c.samples(index)) {
            return Some(ChunkData::Samples(samples));
        }
        self.analyzed.as_ref()?.chunk_data(index)
    }

    fn create_render_task(
        &self,
        request: RenderRequest,
        input: RenderInput,
        generation: Generation,
    ) -> Option<RenderTask> {
        let media = self.media.clone()?;
        Some(build_task(
            &self.settings,
            self.scale,
            request,
            input,
            generation,
            ChunkLoader::Media {
                source: media,
                read_queue: self.read_queue.clone(),
                dsp: self.dsp,
            },
        ))
    }

    fn analysis_finished(&mut self, result: &Arc<AnalysisResult>) {
        self.analyzed = Some(result.clone());
        match &result.output {
            AnalysisOutput::ChunkRanges(ranges) => {
                self.container = Some(SamplesContainer::new(ranges.clone()));
            }
            AnalysisOutput::ChunkAmplitudes(chunks) => {
                if let Some(container) = self.container.as_mut() {
                    for (index, samples) in chunks.iter().enumerate() {
                        container.setup_samples(index, samples.clone());
                    }
                }
            }
        }
    }

    fn render_finished(&mut self, index: usize, samples: &Arc<[f32]>) {
        if let Some(container) = self.container.as_mut() {
            container.setup_samples(index, samples.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcm::MemoryPcmSource;
    use crate::render::PixelSize;

    fn layout(weights: Vec<f64>) -> ChunkLayout {
        ChunkLayout::new(weights, 8.0, 1.0)
    }

    fn request(index: usize) -> RenderRequest {
        RenderRequest {
            index,
            size: PixelSize::new(4, 8),
        }
    }

    #[test]
    fn samples_source_prepares_samples_analysis() {
        let mut source = SamplesWaveform::new(RenderSettings::default());
        let input = source.prepare_analysis(
            SamplesInput {
                samples: Arc::from(vec![0.5; 8]),
                new_samples_count: 2,
            },
            &layout(vec![4.0, 4.0]),
        );
        match input {
            AnalysisInput::Samples {
                chunk_counts,
                new_samples_count,
                ..
            } => {
                assert_eq!(chunk_counts, vec![4, 4]);
                assert_eq!(new_samples_count, 2);
            }
            other => panic!("unexpected input {other:?}"),
        }
        assert!(source.lookup_cached(0).is_none());
        assert!(
            source
                .create_render_task(request(0), RenderInput::Resolved(ChunkData::Samples(Arc::from(vec![0.0; 4]))), Generation(1))
                .is_some()
        );
    }

    #[test]
    fn time_range_source_needs_media_for_tasks() {
        let reads = ReadQueue::new().unwrap();
        let source = TimeRangeWaveform::new(RenderSettings::default(), DspConfig::default(), reads);
        let input = RenderInput::Resolved(ChunkData::Samples(Arc::from(vec![0.0; 4])));
        assert!(source.create_render_task(request(0), input, Generation(1)).is_none());
    }

    #[test]
    fn time_range_source_reuses_complete_container_for_same_media() {
        let reads = ReadQueue::new().unwrap();
        let media: Arc<dyn PcmSource> = Arc::new(MemoryPcmSource::new(10, 1, vec![0i16; 80]));
        let mut source = TimeRangeWaveform::new(RenderSettings::default(), DspConfig::default(), reads);

        let first = source.prepare_analysis(media.clone(), &layout(vec![4.0, 4.0]));
        assert!(matches!(first, AnalysisInput::TimeRanges { .. }));
        assert!(!source.is_reusing());

        let ranges = partition(TimeSpan::from_start(Duration::from_secs(8)), &[4.0, 4.0], 1.0).unwrap();
        source.analysis_finished(&Arc::new(AnalysisResult {
            generation: Generation(1),
            output: AnalysisOutput::ChunkRanges(ranges),
            updated_indexes: None,
        }));
        assert!(matches!(source.lookup_cached(1), Some(ChunkData::Range(_))));

        source.render_finished(0, &Arc::from(vec![1.0; 4]));
        // A partly filled container is not served from.
        assert!(matches!(source.lookup_cached(0), Some(ChunkData::Range(_))));
        source.render_finished(1, &Arc::from(vec![1.0; 3]));
        assert!(!source.container().unwrap().is_complete());
        source.render_finished(1, &Arc::from(vec![1.0; 4]));
        assert!(source.container().unwrap().is_complete());
        assert!(matches!(source.lookup_cached(1), Some(ChunkData::Samples(_))));

        let second = source.prepare_analysis(media.clone(), &layout(vec![2.0, 2.0, 2.0, 2.0]));
        match second {
            AnalysisInput::Samples {
                samples,
                chunk_counts,
                ..
            } => {
                assert_eq!(samples.len(), 8);
                assert_eq!(chunk_counts, vec![2, 2, 2, 2]);
            }
            other => panic!("expected reuse, got {other:?}"),
        }
        assert!(source.is_reusing());

        let other: Arc<dyn PcmSource> = Arc::new(MemoryPcmSource::new(10, 1, vec![0i16; 80]));
        let third = source.prepare_analysis(other, &layout(vec![4.0, 4.0]));
        assert!(matches!(third, AnalysisInput::TimeRanges { .. }));
    }

    #[test]
    fn clear_drops_container_and_reuse() {
        let reads = ReadQueue::new().unwrap();
        let media: Arc<dyn PcmSource> = Arc::new(MemoryPcmSource::new(10, 1, vec![0i16; 80]));
        let mut source = TimeRangeWaveform::new(RenderSettings::default(), DspConfig::default(), reads);
        source.prepare_analysis(media.clone(), &layout(vec![4.0, 4.0]));
        let ranges = partition(TimeSpan::from_start(Duration::from_secs(8)), &[4.0, 4.0], 1.0).unwrap();
        source.analysis_finished(&Arc::new(AnalysisResult {
            generation: Generation(1),
            output: AnalysisOutput::ChunkRanges(ranges),
            updated_indexes: None,
        }));
        source.render_finished(0, &Arc::from(vec![1.0; 4]));
        source.render_finished(1, &Arc::from(vec![1.0; 4]));
        assert!(source.lookup_cached(1).is_some());

        source.clear();
        assert!(source.lookup_cached(1).is_none());
        assert!(source.container().is_none());
        let next = source.prepare_analysis(media, &layout(vec![2.0, 2.0, 2.0, 2.0]));
        assert!(matches!(next, AnalysisInput::TimeRanges { .. }));
    }
}
