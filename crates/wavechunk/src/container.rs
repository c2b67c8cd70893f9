//! Per-generation store of completed chunk samples.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::partition::{ChunkSpec, Extent};
use crate::resample::resample;

/// Collects the amplitude arrays of finished chunks for one partition.
///
/// Chunks are accepted only when the index is in range and the array length equals
/// the chunk's target; anything else is dropped silently.
#[derive(Clone, Debug)]
pub struct SamplesContainer<E> {
    chunk_specs: Vec<ChunkSpec<E>>,
    chunk_samples: BTreeMap<usize, Arc<[f32]>>,
}

impl<E: Extent> SamplesContainer<E> {
    pub fn new(chunk_specs: Vec<ChunkSpec<E>>) -> Self {
        Self {
            chunk_specs,
            chunk_samples: BTreeMap::new(),
        }
    }

    pub fn chunk_specs(&self) -> &[ChunkSpec<E>] {
        &self.chunk_specs
    }

    /// Store `samples` for chunk `index`. Returns whether they were accepted.
    pub fn setup_samples(&mut self, index: usize, samples: Arc<[f32]>) -> bool {
        let Some(spec) = self.chunk_specs.get(index) else {
            tracing::trace!(index, "chunk index out of range; samples dropped");
            return false;
        };
        if spec.target_samples != samples.len() {
            tracing::trace!(
                index,
                expected = spec.target_samples,
                actual = samples.len(),
                "chunk sample count mismatch; samples dropped"
            );
            return false;
        }
        self.chunk_samples.insert(index, samples);
        true
    }

    pub fn samples(&self, index: usize) -> Option<Arc<[f32]>> {
        self.chunk_samples.get(&index).cloned()
    }

    pub fn filled(&self) -> usize {
        self.chunk_samples.len()
    }

    pub fn is_complete(&self) -> bool {
        !self.chunk_specs.is_empty() && self.chunk_samples.len() == self.chunk_specs.len()
    }

    /// All stored samples concatenated in index order.
    ///
    /// Only meaningful once [`is_complete`](Self::is_complete); before that the
    /// result simply has gaps where chunks are missing.
    pub fn linear_samples(&self) -> Vec<f32> {
        let total = self.chunk_samples.values().map(|s| s.len()).sum();
        let mut out = Vec::with_capacity(total);
        for samples in self.chunk_samples.values() {
            out.extend_from_slice(samples);
        }
        out
    }

    /// Linear samples resized to `to_size` values, or `None` while incomplete.
    pub fn redensified(&self, to_size: usize) -> Option<Vec<f32>> {
        if !self.is_complete() {
            return None;
        }
        Some(resample(&self.linear_samples(), to_size))
    }
}
