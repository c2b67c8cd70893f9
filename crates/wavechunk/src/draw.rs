//! Bitmap drawing of one chunk's amplitudes.
//!
//! Drawing is a pure function of the samples, the style and the pixel size. The
//! render pipeline only depends on [`WaveformDrawer`]; [`RasterDrawer`] is the
//! built-in RGBA implementation.

use wavechunk_types::{Fill, Rgba, WaveformStyle};

use crate::render::PixelSize;

/// Straight RGBA8 bitmap, rows top to bottom.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl Bitmap {
    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        let len = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(len * 4);
        for _ in 0..len {
            pixels.extend_from_slice(&[color.r, color.g, color.b, color.a]);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y as usize * self.width as usize + x as usize) * 4;
        let p = &self.pixels[at..at + 4];
        Some(Rgba::new(p[0], p[1], p[2], p[3]))
    }

    fn set(&mut self, x: u32, y: u32, color: Rgba) {
        if x >= self.width || y >= self.height {
            return;
        }
        let at = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[at..at + 4].copy_from_slice(&[color.r, color.g, color.b, color.a]);
    }

    /// Share of pixels that differ from `background`.
    pub fn coverage(&self, background: Rgba) -> f32 {
        let total = self.width as usize * self.height as usize;
        if total == 0 {
            return 0.0;
        }
        let bg = [background.r, background.g, background.b, background.a];
        let painted = self.pixels.chunks_exact(4).filter(|p| *p != bg).count();
        painted as f32 / total as f32
    }
}

/// Turns normalized amplitudes (`0` loud, `1` silent) into a bitmap.
pub trait WaveformDrawer: Send + Sync {
    /// `samples.len()` must equal `size.width`; anything else yields `None`.
    fn draw(&self, samples: &[f32], style: &WaveformStyle, size: PixelSize, scale: f32) -> Option<Bitmap>;
}

/// Draws one vertical line per amplitude around the configured center line.
#[derive(Clone, Copy, Debug, Default)]
pub struct RasterDrawer;

impl RasterDrawer {
    /// Pixel distance between stripe starts, `None` for solid fills.
    fn stripe_bucket(fill: &Fill, scale: f32) -> Option<u32> {
        match fill {
            Fill::Filled { .. } => None,
            Fill::Striped { width, spacing, .. } => {
                let points = (width + spacing).max(1.0);
                let px = if scale >= 1.0 { points * scale } else { points };
                Some(px.round().max(1.0) as u32)
            }
        }
    }
}

impl WaveformDrawer for RasterDrawer {
    fn draw(&self, samples: &[f32], style: &WaveformStyle, size: PixelSize, scale: f32) -> Option<Bitmap> {
        if samples.is_empty() || samples.len() != size.width as usize || size.height == 0 {
            tracing::debug!(
                samples = samples.len(),
                width = size.width,
                height = size.height,
                "sample count does not match bitmap width"
            );
            return None;
        }

        let mut bitmap = Bitmap::filled(size.width, size.height, style.background);
        let height = size.height as f32;
        let center = style.position.fraction() * height;
        let mapping = height * style.vertical_scaling;
        let (color, line_px) = match style.fill {
            Fill::Filled { color } => (color, 1u32),
            Fill::Striped { color, width, .. } => (color, (width * scale.max(1.0)).round().max(1.0) as u32),
        };
        let bucket = Self::stripe_bucket(&style.fill, scale);

        for (x, sample) in samples.iter().enumerate() {
            let x = x as u32;
            if bucket.is_some_and(|b| x % b != 0) {
                continue;
            }
            let inverted = 1.0 - sample.clamp(0.0, 1.0);
            let amplitude = (inverted * mapping).max(1.0);
            let top = (center - amplitude).floor().max(0.0) as u32;
            let bottom = ((center + amplitude).ceil() as u32).min(size.height);
            for column in x..(x + line_px).min(size.width) {
                for y in top..bottom {
                    bitmap.set(column, y, color);
                }
            }
        }
        Some(bitmap)
    }
}
