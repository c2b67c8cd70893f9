use serde::{Deserialize, Serialize};

/// 8-bit RGBA color.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);
}

/// How the amplitude columns of a chunk are painted.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fill {
    /// One solid column per pixel.
    Filled { color: Rgba },
    /// Columns of `width` points separated by `spacing` points.
    Striped {
        color: Rgba,
        width: f32,
        spacing: f32,
    },
}

impl Default for Fill {
    fn default() -> Self {
        Fill::Filled { color: Rgba::BLACK }
    }
}

/// Vertical anchor of the graph center inside the chunk bitmap.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum VerticalPosition {
    Top,
    #[default]
    Middle,
    Bottom,
    /// Fraction of the height, `0.0` = top edge.
    Custom(f32),
}

impl VerticalPosition {
    /// Center of the graph as a fraction of the bitmap height.
    pub fn fraction(self) -> f32 {
        match self {
            VerticalPosition::Top => 0.0,
            VerticalPosition::Middle => 0.5,
            VerticalPosition::Bottom => 1.0,
            VerticalPosition::Custom(value) => value.clamp(0.0, 1.0),
        }
    }
}

/// Which edges of a chunk are eased towards silence.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DampeningSides {
    Left,
    Right,
    #[default]
    Both,
}

impl DampeningSides {
    pub fn includes_left(self) -> bool {
        matches!(self, DampeningSides::Left | DampeningSides::Both)
    }

    pub fn includes_right(self) -> bool {
        matches!(self, DampeningSides::Right | DampeningSides::Both)
    }
}

/// Easing curve applied inside the dampened edge region.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    Quadratic,
}

impl Easing {
    /// Map `x` in `[0, 1]` to a gain in `[0, 1]`.
    pub fn apply(self, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);
        match self {
            Easing::Linear => x,
            Easing::Quadratic => x * x,
        }
    }
}

/// Edge easing applied to amplitudes near the start/end of a chunk.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Dampening {
    /// Fraction of the chunk width eased on each selected side.
    pub percentage: f32,
    #[serde(default)]
    pub sides: DampeningSides,
    #[serde(default)]
    pub easing: Easing,
}

impl Default for Dampening {
    fn default() -> Self {
        Self {
            percentage: 0.125,
            sides: DampeningSides::Both,
            easing: Easing::Linear,
        }
    }
}

/// Presentation settings handed to the draw routine alongside the samples.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WaveformStyle {
    pub background: Rgba,
    pub fill: Fill,
    pub position: VerticalPosition,
    /// Peak half-height as a fraction of the bitmap height.
    pub vertical_scaling: f32,
    pub dampening: Option<Dampening>,
}

impl Default for WaveformStyle {
    fn default() -> Self {
        Self {
            background: Rgba::TRANSPARENT,
            fill: Fill::default(),
            position: VerticalPosition::Middle,
            vertical_scaling: 0.5,
            dampening: None,
        }
    }
}

/// Per-chunk render report used by front ends.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkReport {
    /// Chunk index in timeline order.
    pub index: usize,
    /// Analysis generation the bitmap was produced for.
    pub generation: u64,
    /// Bitmap width in pixels, `None` when no image was produced.
    pub width_px: Option<u32>,
    /// Bitmap height in pixels, `None` when no image was produced.
    pub height_px: Option<u32>,
    /// Share of painted (non-background) pixels.
    pub coverage: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertical_position_fraction_clamps_custom() {
        assert_eq!(VerticalPosition::Middle.fraction(), 0.5);
        assert_eq!(VerticalPosition::Custom(1.5).fraction(), 1.0);
        assert_eq!(VerticalPosition::Custom(-0.2).fraction(), 0.0);
    }

    #[test]
    fn easing_apply_is_bounded() {
        assert_eq!(Easing::Linear.apply(0.25), 0.25);
        assert_eq!(Easing::Quadratic.apply(0.5), 0.25);
        assert_eq!(Easing::Quadratic.apply(2.0), 1.0);
    }

    #[test]
    fn style_deserializes_from_partial_toml() {
        let raw = r#"
            vertical_scaling = 0.4

            [fill]
            kind = "striped"
            color = { r = 10, g = 20, b = 30, a = 255 }
            width = 2.0
            spacing = 1.0

            [dampening]
            percentage = 0.2
            sides = "left"
        "#;
        let style: WaveformStyle = toml::from_str(raw).unwrap();
        assert_eq!(style.vertical_scaling, 0.4);
        assert_eq!(style.position, VerticalPosition::Middle);
        assert!(matches!(style.fill, Fill::Striped { width, .. } if width == 2.0));
        let dampening = style.dampening.unwrap();
        assert_eq!(dampening.sides, DampeningSides::Left);
        assert_eq!(dampening.easing, Easing::Linear);
    }

    #[test]
    fn chunk_report_round_trips_json() {
        let report = ChunkReport {
            index: 3,
            generation: 2,
            width_px: Some(64),
            height_px: Some(32),
            coverage: Some(0.5),
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: ChunkReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
