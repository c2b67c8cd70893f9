//! Proportional partitioning of a timeline extent into chunks.
//!
//! An extent is split by pixel-width weights: every chunk but the last gets
//! `round(total * weight / sum(weights))` units, the running cursor absorbs the
//! rounding, and the last chunk takes whatever remains. Sub-extents are therefore
//! contiguous and always add up to the input exactly.

use std::time::Duration;

/// A total length that can be split into contiguous sub-extents.
pub trait Extent: Copy + std::fmt::Debug + Send + Sync + 'static {
    /// Length in the extent's smallest integral unit.
    fn units(&self) -> u64;

    /// Sub-extent that starts `offset` units into `self` and is `len` units long.
    fn slice(&self, offset: u64, len: u64) -> Self;
}

/// Time interval on the media timeline (nanosecond resolution).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeSpan {
    pub start: Duration,
    pub duration: Duration,
}

impl TimeSpan {
    pub fn new(start: Duration, duration: Duration) -> Self {
        Self { start, duration }
    }

    /// Interval starting at zero.
    pub fn from_start(duration: Duration) -> Self {
        Self::new(Duration::ZERO, duration)
    }

    pub fn end(&self) -> Duration {
        self.start.saturating_add(self.duration)
    }
}

impl Extent for TimeSpan {
    fn units(&self) -> u64 {
        u64::try_from(self.duration.as_nanos()).unwrap_or(u64::MAX)
    }

    fn slice(&self, offset: u64, len: u64) -> Self {
        TimeSpan {
            start: self.start.saturating_add(Duration::from_nanos(offset)),
            duration: Duration::from_nanos(len),
        }
    }
}

/// Linear range of sample positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SampleSpan {
    pub start: usize,
    pub len: usize,
}

impl SampleSpan {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

impl Extent for SampleSpan {
    fn units(&self) -> u64 {
        self.len as u64
    }

    fn slice(&self, offset: u64, len: u64) -> Self {
        SampleSpan {
            start: self.start + offset as usize,
            len: len as usize,
        }
    }
}

/// One chunk of a partitioned extent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkSpec<E> {
    /// Position in timeline order, `0..N`.
    pub index: usize,
    /// Weight (pixel width) the chunk was sized from.
    pub weight: f64,
    /// Sub-extent covered by this chunk.
    pub extent: E,
    /// Number of amplitude values the chunk is drawn from: `round(weight * scale)`.
    pub target_samples: usize,
}

/// Split `extent` into `weights.len()` chunks proportional to `weights`.
///
/// Returns `None` if there are no weights, the extent is empty, or the weights are
/// not finite non-negative numbers with a positive sum. A zero weight yields a
/// zero-length chunk with a zero target.
pub fn partition<E: Extent>(extent: E, weights: &[f64], scale: f64) -> Option<Vec<ChunkSpec<E>>> {
    let total = extent.units();
    if weights.is_empty() || total == 0 {
        return None;
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return None;
    }
    let weight_sum: f64 = weights.iter().sum();
    if weight_sum <= 0.0 {
        return None;
    }

    let last = weights.len() - 1;
    let mut cursor = 0u64;
    let specs = weights
        .iter()
        .enumerate()
        .map(|(index, &weight)| {
            let remaining = total - cursor;
            let len = if index == last {
                remaining
            } else {
                let share = (total as f64 * weight / weight_sum).round() as u64;
                share.min(remaining)
            };
            let spec = ChunkSpec {
                index,
                weight,
                extent: extent.slice(cursor, len),
                target_samples: target_sample_count(weight, scale),
            };
            cursor += len;
            spec
        })
        .collect();
    Some(specs)
}

/// Sample-count target for a chunk of `weight` points at `scale` pixels per point.
pub fn target_sample_count(weight: f64, scale: f64) -> usize {
    let value = (weight * scale).round();
    if value.is_finite() && value > 0.0 {
        value as usize
    } else {
        0
    }
}

/// Divide a segment into items of `item_width`; a shorter remainder item goes last.
///
/// Returns an empty list for non-positive inputs and a single item when the
/// segment is not wider than one item.
pub fn divide_segment(segment_width: f64, item_width: f64) -> Vec<f64> {
    if segment_width.is_nan() || item_width.is_nan() || segment_width <= 0.0 || item_width <= 0.0 {
        return Vec::new();
    }
    if item_width >= segment_width {
        return vec![segment_width];
    }

    let count = (segment_width / item_width).floor() as usize;
    let mut widths = vec![item_width; count];
    let remainder = segment_width % item_width;
    if remainder > f64::EPSILON * segment_width {
        widths.push(remainder);
    }
    widths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_contiguous<E: Extent>(extent: E, specs: &[ChunkSpec<E>], offset_of: impl Fn(&E) -> u64) {
        let mut cursor = offset_of(&extent);
        for (i, spec) in specs.iter().enumerate() {
            assert_eq!(spec.index, i);
            assert_eq!(offset_of(&spec.extent), cursor, "chunk {i} not contiguous");
            cursor += spec.extent.units();
        }
        let total: u64 = specs.iter().map(|s| s.extent.units()).sum();
        assert_eq!(total, extent.units());
    }

    #[test]
    fn partition_equal_weights_splits_evenly() {
        let extent = TimeSpan::from_start(Duration::from_secs(100));
        let specs = partition(extent, &[1.0, 1.0, 1.0, 1.0], 10.0).unwrap();
        assert_eq!(specs.len(), 4);
        for (i, spec) in specs.iter().enumerate() {
            assert_eq!(spec.extent.duration, Duration::from_secs(25));
            assert_eq!(spec.extent.start, Duration::from_secs(25 * i as u64));
            assert_eq!(spec.target_samples, 10);
        }
        let targets: usize = specs.iter().map(|s| s.target_samples).sum();
        assert_eq!(targets, 40);
    }

    #[test]
    fn partition_sums_exactly_for_awkward_weights() {
        let cases: &[(usize, &[f64])] = &[
            (10, &[1.0, 1.0, 1.0]),
            (7, &[3.0, 0.5, 2.25, 1.0]),
            (1, &[5.0, 5.0]),
            (1_000_003, &[256.0, 256.0, 256.0, 17.5]),
            (99, &[0.1]),
        ];
        for (len, weights) in cases {
            let extent = SampleSpan::new(5, *len);
            let specs = partition(extent, weights, 2.0).unwrap();
            assert_eq!(specs.len(), weights.len());
            assert_contiguous(extent, &specs, |e| e.start as u64);
        }
    }

    #[test]
    fn partition_rounding_drift_lands_in_last_chunk() {
        let specs = partition(SampleSpan::new(0, 10), &[1.0, 1.0, 1.0], 1.0).unwrap();
        let lens: Vec<usize> = specs.iter().map(|s| s.extent.len).collect();
        assert_eq!(lens, vec![3, 3, 4]);
    }

    #[test]
    fn partition_time_spans_are_contiguous() {
        let extent = TimeSpan::new(Duration::from_millis(250), Duration::from_millis(12_345));
        let specs = partition(extent, &[256.0, 256.0, 100.0], 2.0).unwrap();
        assert_contiguous(extent, &specs, |e| e.start.as_nanos() as u64);
        assert_eq!(specs.last().unwrap().extent.end(), extent.end());
        assert_eq!(specs[2].target_samples, 200);
    }

    #[test]
    fn partition_zero_weight_gives_empty_chunk() {
        let specs = partition(SampleSpan::new(0, 100), &[1.0, 0.0, 1.0], 4.0).unwrap();
        assert_eq!(specs[1].extent.len, 0);
        assert_eq!(specs[1].target_samples, 0);
        assert_eq!(specs[0].extent.len + specs[2].extent.len, 100);
    }

    #[test]
    fn partition_rejects_degenerate_input() {
        assert!(partition(SampleSpan::new(0, 100), &[], 1.0).is_none());
        assert!(partition(SampleSpan::new(0, 0), &[1.0], 1.0).is_none());
        assert!(partition(SampleSpan::new(0, 10), &[0.0, 0.0], 1.0).is_none());
        assert!(partition(SampleSpan::new(0, 10), &[1.0, -1.0], 1.0).is_none());
        assert!(partition(TimeSpan::from_start(Duration::ZERO), &[1.0], 1.0).is_none());
    }

    #[test]
    fn target_sample_count_rounds_and_floors_at_zero() {
        assert_eq!(target_sample_count(10.4, 2.0), 21);
        assert_eq!(target_sample_count(0.0, 2.0), 0);
        assert_eq!(target_sample_count(f64::NAN, 2.0), 0);
    }

    #[test]
    fn divide_segment_appends_remainder() {
        assert_eq!(divide_segment(1000.0, 256.0), vec![256.0, 256.0, 256.0, 232.0]);
        assert_eq!(divide_segment(512.0, 256.0), vec![256.0, 256.0]);
        assert_eq!(divide_segment(100.0, 256.0), vec![100.0]);
        assert!(divide_segment(0.0, 256.0).is_empty());
        assert!(divide_segment(100.0, -1.0).is_empty());
    }
}
