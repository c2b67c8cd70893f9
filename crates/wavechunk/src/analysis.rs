//! The one long-running computation per generation.
//!
//! An [`AnalysisTask`] turns its input into per-chunk render data: either a full
//! amplitude table (media decode or a supplied sample array) or a list of per-chunk
//! time ranges that render tasks resolve themselves. The outcome is published on a
//! shared [`AnalysisHandle`] that render tasks read once the analysis has left the
//! queue.

use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};

use crate::dsp::{DspConfig, Extraction, extract_amplitudes};
use crate::partition::{ChunkSpec, TimeSpan, partition};
use crate::pcm::PcmSource;
use crate::queue::CancelToken;
use crate::read_queue::ReadQueue;
use crate::render::ChunkData;
use crate::resample::{chunked, pad_or_truncate, updated_chunk_indexes};

/// Version tag of "the current analysis" and everything derived from it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an analysis run works from.
#[derive(Clone)]
pub enum AnalysisInput {
    /// Pre-computed normalized amplitudes; the trailing `new_samples_count` changed
    /// since the previous run.
    Samples {
        samples: Arc<[f32]>,
        new_samples_count: usize,
        chunk_counts: Vec<usize>,
    },
    /// Decode `span` of `source` and reduce it to `sum(chunk_counts)` amplitudes.
    Media {
        source: Arc<dyn PcmSource>,
        span: Option<TimeSpan>,
        chunk_counts: Vec<usize>,
        dsp: DspConfig,
        read_queue: ReadQueue,
    },
    /// Split `span` into per-chunk time ranges.
    TimeRanges {
        span: TimeSpan,
        weights: Vec<f64>,
        scale: f64,
    },
}

impl fmt::Debug for AnalysisInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisInput::Samples {
                samples,
                new_samples_count,
                chunk_counts,
            } => f
                .debug_struct("Samples")
                .field("samples", &samples.len())
                .field("new_samples_count", new_samples_count)
                .field("chunks", &chunk_counts.len())
                .finish(),
            AnalysisInput::Media {
                source,
                span,
                chunk_counts,
                ..
            } => f
                .debug_struct("Media")
                .field("source", &source.describe())
                .field("span", span)
                .field("chunks", &chunk_counts.len())
                .finish(),
            AnalysisInput::TimeRanges { span, weights, .. } => f
                .debug_struct("TimeRanges")
                .field("span", span)
                .field("chunks", &weights.len())
                .finish(),
        }
    }
}

/// Per-chunk data produced by a finished analysis.
#[derive(Clone, Debug)]
pub enum AnalysisOutput {
    ChunkAmplitudes(Vec<Arc<[f32]>>),
    ChunkRanges(Vec<ChunkSpec<TimeSpan>>),
}

#[derive(Clone, Debug)]
pub struct AnalysisResult {
    pub generation: Generation,
    pub output: AnalysisOutput,
    /// Chunks that changed since the previous run, newest first (samples input only).
    pub updated_indexes: Option<Vec<usize>>,
}

impl AnalysisResult {
    /// Render data for chunk `index`, if the analysis produced any.
    pub fn chunk_data(&self, index: usize) -> Option<ChunkData> {
        match &self.output {
            AnalysisOutput::ChunkAmplitudes(chunks) => {
                chunks.get(index).cloned().map(ChunkData::Samples)
            }
            AnalysisOutput::ChunkRanges(ranges) => ranges.get(index).copied().map(ChunkData::Range),
        }
    }

    pub fn chunk_count(&self) -> usize {
        match &self.output {
            AnalysisOutput::ChunkAmplitudes(chunks) => chunks.len(),
            AnalysisOutput::ChunkRanges(ranges) => ranges.len(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum AnalysisState {
    Pending,
    Running,
    Finished(Arc<AnalysisResult>),
    Cancelled,
    Failed(String),
}

impl AnalysisState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisState::Finished(_) | AnalysisState::Cancelled | AnalysisState::Failed(_)
        )
    }
}

/// Reported to the caller of `configure` once an analysis leaves the queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub generation: Generation,
    pub finished: bool,
    pub chunk_count: usize,
    pub updated_indexes: Option<Vec<usize>>,
}

/// Shared view of one analysis run's state.
#[derive(Debug)]
pub struct AnalysisHandle {
    generation: Generation,
    state: Mutex<AnalysisState>,
}

impl AnalysisHandle {
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            state: Mutex::new(AnalysisState::Pending),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn state(&self) -> AnalysisState {
        self.state.lock().unwrap().clone()
    }

    pub fn result(&self) -> Option<Arc<AnalysisResult>> {
        match &*self.state.lock().unwrap() {
            AnalysisState::Finished(result) => Some(result.clone()),
            _ => None,
        }
    }

    /// Mark a run that will never start (or was abandoned) as cancelled.
    pub fn mark_cancelled(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.is_terminal() {
            *state = AnalysisState::Cancelled;
        }
    }

    fn set(&self, next: AnalysisState) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, AnalysisState::Cancelled) {
            return;
        }
        *state = next;
    }

    pub fn summary(&self) -> AnalysisSummary {
        match self.state() {
            AnalysisState::Finished(result) => AnalysisSummary {
                generation: self.generation,
                finished: true,
                chunk_count: result.chunk_count(),
                updated_indexes: result.updated_indexes.clone(),
            },
            _ => AnalysisSummary {
                generation: self.generation,
                finished: false,
                chunk_count: 0,
                updated_indexes: None,
            },
        }
    }
}

pub struct AnalysisTask {
    handle: Arc<AnalysisHandle>,
    input: AnalysisInput,
}

impl AnalysisTask {
    pub fn new(handle: Arc<AnalysisHandle>, input: AnalysisInput) -> Self {
        Self { handle, input }
    }

    /// Run to completion (or cancellation) and publish the outcome on the handle.
    pub fn run(self, cancel: &CancelToken) -> AnalysisState {
        let generation = self.handle.generation;
        if cancel.is_cancelled() {
            self.handle.mark_cancelled();
            return self.handle.state();
        }
        self.handle.set(AnalysisState::Running);
        tracing::debug!(%generation, input = ?self.input, "analysis started");

        let state = match analyze(self.input, generation, cancel) {
            Ok(Some(result)) => AnalysisState::Finished(Arc::new(result)),
            Ok(None) => AnalysisState::Cancelled,
            Err(err) => {
                tracing::warn!(%generation, "analysis failed: {err:#}");
                AnalysisState::Failed(format!("{err:#}"))
            }
        };
        if cancel.is_cancelled() {
            self.handle.mark_cancelled();
        } else {
            self.handle.set(state);
        }
        let state = self.handle.state();
        tracing::debug!(
            %generation,
            finished = matches!(state, AnalysisState::Finished(_)),
            "analysis done"
        );
        state
    }
}

/// `Ok(None)` means the run was cancelled.
fn analyze(
    input: AnalysisInput,
    generation: Generation,
    cancel: &CancelToken,
) -> Result<Option<AnalysisResult>> {
    match input {
        AnalysisInput::Samples {
            samples,
            new_samples_count,
            chunk_counts,
        } => {
            if samples.is_empty() {
                return Err(anyhow!("no samples to analyze"));
            }
            let total: usize = chunk_counts.iter().sum();
            let linear = pad_or_truncate(&samples, total);
            let chunks: Vec<Arc<[f32]>> = chunked(&linear, &chunk_counts)
                .into_iter()
                .map(Arc::from)
                .collect();
            Ok(Some(AnalysisResult {
                generation,
                output: AnalysisOutput::ChunkAmplitudes(chunks),
                updated_indexes: updated_chunk_indexes(&chunk_counts, new_samples_count),
            }))
        }
        AnalysisInput::Media {
            source,
            span,
            chunk_counts,
            dsp,
            read_queue,
        } => {
            let total: usize = chunk_counts.iter().sum();
            let opener = source.clone();
            let mut reader = read_queue
                .run_sync(move || opener.open(span))
                .ok_or_else(|| anyhow!("read queue closed"))??;
            let amplitudes = match extract_amplitudes(reader.as_mut(), total, &dsp, cancel)? {
                Extraction::Complete(values) => values,
                Extraction::Cancelled => return Ok(None),
            };
            let chunks: Vec<Arc<[f32]>> = chunked(&amplitudes, &chunk_counts)
                .into_iter()
                .map(Arc::from)
                .collect();
            Ok(Some(AnalysisResult {
                generation,
                output: AnalysisOutput::ChunkAmplitudes(chunks),
                updated_indexes: None,
            }))
        }
        AnalysisInput::TimeRanges {
            span,
            weights,
            scale,
        } => {
            let ranges = partition(span, &weights, scale)
                .ok_or_else(|| anyhow!("cannot partition {span:?} into {} chunks", weights.len()))?;
            Ok(Some(AnalysisResult {
                generation,
                output: AnalysisOutput::ChunkRanges(ranges),
                updated_indexes: None,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcm::{MemoryPcmSource, PcmBlockReader};
    use std::time::Duration;

    struct BrokenSource;

    impl PcmSource for BrokenSource {
        fn describe(&self) -> String {
            "broken".to_string()
        }

        fn duration(&self) -> Option<Duration> {
            None
        }

        fn open(&self, _span: Option<TimeSpan>) -> Result<Box<dyn PcmBlockReader>> {
            Err(anyhow!("no audio track"))
        }
    }

    fn run(input: AnalysisInput) -> (Arc<AnalysisHandle>, AnalysisState) {
        let handle = Arc::new(AnalysisHandle::new(Generation(1)));
        let state = AnalysisTask::new(handle.clone(), input).run(&CancelToken::new());
        (handle, state)
    }

    #[test]
    fn samples_input_pads_and_splits() {
        let samples: Vec<f32> = (0..37).map(|i| i as f32 / 37.0).collect();
        let (handle, state) = run(AnalysisInput::Samples {
            samples: Arc::from(samples),
            new_samples_count: 12,
            chunk_counts: vec![10, 10, 10, 10],
        });
        assert!(matches!(state, AnalysisState::Finished(_)));
        let result = handle.result().unwrap();
        assert_eq!(result.chunk_count(), 4);
        for index in 0..4 {
            match result.chunk_data(index) {
                Some(ChunkData::Samples(chunk)) => assert_eq!(chunk.len(), 10),
                other => panic!("unexpected chunk data {other:?}"),
            }
        }
        assert_eq!(result.updated_indexes, Some(vec![3, 2]));
        assert!(result.chunk_data(4).is_none());
    }

    #[test]
    fn media_input_reads_silence_as_ones() {
        let reads = ReadQueue::new().unwrap();
        let source = MemoryPcmSource::new(1000, 1, vec![0i16; 4000]);
        let (handle, _) = run(AnalysisInput::Media {
            source: Arc::new(source),
            span: None,
            chunk_counts: vec![10, 10, 10, 10],
            dsp: DspConfig::default(),
            read_queue: reads,
        });
        let result = handle.result().unwrap();
        let AnalysisOutput::ChunkAmplitudes(chunks) = &result.output else {
            panic!("expected amplitudes");
        };
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() == 10 && c.iter().all(|v| *v == 1.0)));
    }

    #[test]
    fn time_range_input_partitions_span() {
        let (handle, _) = run(AnalysisInput::TimeRanges {
            span: TimeSpan::from_start(Duration::from_secs(100)),
            weights: vec![1.0; 4],
            scale: 10.0,
        });
        let result = handle.result().unwrap();
        let Some(ChunkData::Range(spec)) = result.chunk_data(1) else {
            panic!("expected a range");
        };
        assert_eq!(spec.extent.start, Duration::from_secs(25));
        assert_eq!(spec.extent.duration, Duration::from_secs(25));
        assert_eq!(spec.target_samples, 10);
    }

    #[test]
    fn decode_failure_ends_failed_without_result() {
        let reads = ReadQueue::new().unwrap();
        let (handle, state) = run(AnalysisInput::Media {
            source: Arc::new(BrokenSource),
            span: None,
            chunk_counts: vec![4],
            dsp: DspConfig::default(),
            read_queue: reads,
        });
        assert!(matches!(state, AnalysisState::Failed(ref msg) if msg.contains("no audio track")));
        assert!(handle.result().is_none());
        assert!(!handle.summary().finished);
    }

    #[test]
    fn cancelled_before_start_never_runs() {
        let handle = Arc::new(AnalysisHandle::new(Generation(3)));
        let cancel = CancelToken::new();
        cancel.cancel();
        let state = AnalysisTask::new(
            handle.clone(),
            AnalysisInput::TimeRanges {
                span: TimeSpan::from_start(Duration::from_secs(1)),
                weights: vec![1.0],
                scale: 1.0,
            },
        )
        .run(&cancel);
        assert!(matches!(state, AnalysisState::Cancelled));
        assert!(handle.state().is_terminal());
    }

    #[test]
    fn mark_cancelled_sticks() {
        let handle = AnalysisHandle::new(Generation(1));
        handle.mark_cancelled();
        handle.set(AnalysisState::Running);
        assert!(matches!(handle.state(), AnalysisState::Cancelled));
    }
}
