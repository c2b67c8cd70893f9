//! Amplitude extraction from 16-bit PCM.
//!
//! Every sample is converted to decibels relative to `i16::MAX`, clipped to
//! `[noise_floor_db, 0]`, and box-averaged over `samples_per_pixel` samples.
//! Output values are normalized by dividing by the noise floor, so `0.0` is full
//! scale and `1.0` is silence.

use anyhow::Result;

use crate::pcm::PcmBlockReader;
use crate::queue::CancelToken;

/// Tuning for amplitude extraction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DspConfig {
    /// Everything below this level is clipped and treated as silence.
    pub noise_floor_db: f32,
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            noise_floor_db: -50.0,
        }
    }
}

/// Result of an extraction run.
#[derive(Clone, Debug, PartialEq)]
pub enum Extraction {
    Complete(Vec<f32>),
    Cancelled,
}

/// Read `reader` to the end and reduce it to `target` normalized amplitudes.
///
/// Cancellation is checked between blocks. When the stream is shorter than
/// `target * samples_per_pixel` the tail is padded with silence, so a successful
/// run always yields exactly `target` values.
///
/// A reader that cannot tell its length up front is read completely first and
/// the window size is taken from the number of samples it actually produced.
pub fn extract_amplitudes(
    reader: &mut dyn PcmBlockReader,
    target: usize,
    cfg: &DspConfig,
    cancel: &CancelToken,
) -> Result<Extraction> {
    if target == 0 {
        return Ok(Extraction::Complete(Vec::new()));
    }

    let floor = cfg.noise_floor_db;
    let expected = reader.expected_samples();
    let mut output = Vec::with_capacity(target);

    let mut downsampler = if expected > 0 {
        let mut downsampler = Downsampler::new((expected / target).max(1), floor, target);
        loop {
            if cancel.is_cancelled() {
                return Ok(Extraction::Cancelled);
            }
            let Some(block) = reader.next_block()? else {
                break;
            };
            downsampler.push(block.iter().map(|&s| sample_to_db(s, floor)), &mut output);
            if output.len() >= target {
                break;
            }
        }
        downsampler
    } else {
        let mut levels = Vec::new();
        loop {
            if cancel.is_cancelled() {
                return Ok(Extraction::Cancelled);
            }
            let Some(block) = reader.next_block()? else {
                break;
            };
            levels.extend(block.iter().map(|&s| sample_to_db(s, floor)));
        }
        tracing::debug!(samples = levels.len(), target, "stream length unknown until end of stream");
        let mut downsampler = Downsampler::new((levels.len() / target).max(1), floor, target);
        downsampler.push(levels, &mut output);
        downsampler
    };

    if output.len() < target {
        let missing = (target - output.len()) * downsampler.samples_per_pixel;
        let padding = missing.saturating_sub(downsampler.buffered());
        downsampler.pad_silence(padding, &mut output);
    }

    for value in output.iter_mut() {
        *value /= floor;
    }
    Ok(Extraction::Complete(output))
}

/// Convert one sample to decibels clipped to `[floor, 0]`.
pub fn sample_to_db(sample: i16, floor: f32) -> f32 {
    let magnitude = (sample as f32).abs() / i16::MAX as f32;
    let db = 20.0 * magnitude.log10();
    if db.is_nan() {
        floor
    } else {
        db.clamp(floor, 0.0)
    }
}

/// Streaming box filter over decibel values that stops at `limit` outputs.
struct Downsampler {
    samples_per_pixel: usize,
    floor: f32,
    limit: usize,
    pending: Vec<f32>,
}

impl Downsampler {
    fn new(samples_per_pixel: usize, floor: f32, limit: usize) -> Self {
        Self {
            samples_per_pixel,
            floor,
            limit,
            pending: Vec::with_capacity(samples_per_pixel * 2),
        }
    }

    fn buffered(&self) -> usize {
        self.pending.len()
    }

    fn push(&mut self, levels: impl IntoIterator<Item = f32>, output: &mut Vec<f32>) {
        if output.len() >= self.limit {
            return;
        }
        self.pending.extend(levels);
        self.drain(output);
    }

    fn pad_silence(&mut self, count: usize, output: &mut Vec<f32>) {
        self.pending
            .extend(std::iter::repeat_n(self.floor, count));
        self.drain(output);
    }

    fn drain(&mut self, output: &mut Vec<f32>) {
        let spp = self.samples_per_pixel;
        let room = self.limit.saturating_sub(output.len());
        let windows = (self.pending.len() / spp).min(room);
        if windows == 0 {
            if room == 0 {
                self.pending.clear();
            }
            return;
        }
        output.extend(
            self.pending[..windows * spp]
                .chunks_exact(spp)
                .map(|window| window.iter().sum::<f32>() / spp as f32),
        );
        self.pending.drain(..windows * spp);
    }
}
