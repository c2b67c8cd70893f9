//! Nearest-index resizing and chunk slicing of sample sequences.

/// Resize `source` to `to_size` elements with `result[i] = source[i * len / to_size]`.
///
/// Not interpolated: every output element is copied from `source`. Returns an empty
/// vector when either side is empty.
pub fn resample<T: Clone>(source: &[T], to_size: usize) -> Vec<T> {
    if source.is_empty() || to_size == 0 {
        return Vec::new();
    }
    let len = source.len();
    (0..to_size)
        .map(|i| source[i * len / to_size].clone())
        .collect()
}

/// Force `samples` to exactly `count` elements.
///
/// Shorter input is left-padded by repeating the first sample so the end of the
/// track stays aligned with the right edge; longer input keeps its first `count`
/// samples and drops the tail.
pub fn pad_or_truncate<T: Clone>(samples: &[T], count: usize) -> Vec<T> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    if count == 0 {
        return Vec::new();
    }
    if samples.len() < count {
        tracing::debug!(
            have = samples.len(),
            want = count,
            "left-padding samples with first value"
        );
        let mut out = Vec::with_capacity(count);
        out.resize(count - samples.len(), first.clone());
        out.extend_from_slice(samples);
        out
    } else if samples.len() > count {
        tracing::debug!(
            have = samples.len(),
            want = count,
            "truncating samples to chunk total"
        );
        samples[..count].to_vec()
    } else {
        samples.to_vec()
    }
}

/// Split `source` into consecutive slices of `element_counts[i]` elements.
///
/// When the counts do not add up to `source.len()` the mismatch is logged and the
/// tail is clipped: slicing stops once `source` is exhausted.
pub fn chunked<T: Clone>(source: &[T], element_counts: &[usize]) -> Vec<Vec<T>> {
    let expected: usize = element_counts.iter().sum();
    if expected != source.len() {
        tracing::warn!(
            expected,
            actual = source.len(),
            "chunk counts do not match sample count"
        );
    }

    let mut out = Vec::with_capacity(element_counts.len());
    let mut start = 0usize;
    for &count in element_counts {
        if start >= source.len() {
            break;
        }
        let end = (start + count).min(source.len());
        out.push(source[start..end].to_vec());
        start = end;
    }
    out
}

/// Chunk indexes touched by the trailing `new_samples` samples, newest chunk first.
///
/// Walks chunk boundaries from the end until the new-sample budget is spent.
/// Returns `None` when nothing changed.
pub fn updated_chunk_indexes(chunk_counts: &[usize], new_samples: usize) -> Option<Vec<usize>> {
    if new_samples == 0 {
        return None;
    }
    let mut budget = new_samples as i64;
    let mut indexes = Vec::new();
    for (index, &count) in chunk_counts.iter().enumerate().rev() {
        if budget <= 0 {
            break;
        }
        indexes.push(index);
        budget -= count as i64;
    }
    Some(indexes)
}
