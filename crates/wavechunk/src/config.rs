use wavechunk_types::WaveformStyle;

use crate::dsp::DspConfig;
use crate::partition::{divide_segment, target_sample_count};
use crate::render::PixelSize;

/// Chunk widths (in points) and the pixel density they are drawn at.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkLayout {
    /// One weight per chunk, usually the chunk width in points.
    pub weights: Vec<f64>,
    /// Chunk height in points.
    pub height: f64,
    /// Pixels per point.
    pub scale: f64,
}

impl ChunkLayout {
    pub fn new(weights: Vec<f64>, height: f64, scale: f64) -> Self {
        Self {
            weights,
            height,
            scale,
        }
    }

    /// Layout of `total_width` points cut into items of `item_width` (remainder last).
    pub fn from_widths(total_width: f64, item_width: f64, height: f64, scale: f64) -> Self {
        Self::new(divide_segment(total_width, item_width), height, scale)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Amplitude count per chunk: `round(weight * scale)`.
    pub fn chunk_counts(&self) -> Vec<usize> {
        self.weights
            .iter()
            .map(|w| target_sample_count(*w, self.scale))
            .collect()
    }

    /// Bitmap size for chunk `index`; its width equals the chunk's amplitude count.
    pub fn pixel_size(&self, index: usize) -> Option<PixelSize> {
        let weight = *self.weights.get(index)?;
        let width = target_sample_count(weight, self.scale);
        let height = target_sample_count(self.height, self.scale);
        Some(PixelSize::new(
            u32::try_from(width).ok()?,
            u32::try_from(height).ok()?,
        ))
    }
}

/// Engine-wide defaults.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub dsp: DspConfig,
    pub style: WaveformStyle,
    /// Width of one chunk in points.
    pub item_width: f64,
    /// Chunk height in points.
    pub height: f64,
    /// Pixels per point.
    pub scale: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dsp: DspConfig::default(),
            style: WaveformStyle::default(),
            item_width: 256.0,
            height: 64.0,
            scale: 2.0,
        }
    }
}

impl EngineConfig {
    /// Layout for a timeline `total_width` points wide.
    pub fn layout(&self, total_width: f64) -> ChunkLayout {
        ChunkLayout::from_widths(total_width, self.item_width, self.height, self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_from_widths_counts_pixels() {
        let layout = ChunkLayout::from_widths(600.0, 256.0, 32.0, 2.0);
        assert_eq!(layout.weights, vec![256.0, 256.0, 88.0]);
        assert_eq!(layout.chunk_counts(), vec![512, 512, 176]);
        assert_eq!(layout.pixel_size(2), Some(PixelSize::new(176, 64)));
        assert_eq!(layout.pixel_size(3), None);
    }

    #[test]
    fn engine_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.dsp.noise_floor_db, -50.0);
        let layout = cfg.layout(512.0);
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.scale, 2.0);
    }
}
