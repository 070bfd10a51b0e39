//! Colors and the fill/stroke paint of a shape.

use serde::{Deserialize, Serialize};

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub fn black() -> Self {
        Self::rgb(0, 0, 0)
    }

    pub fn white() -> Self {
        Self::rgb(255, 255, 255)
    }

    /// Pack as `0xAARRGGBB`.
    pub fn to_argb(self) -> u32 {
        u32::from_be_bytes([self.a, self.r, self.g, self.b])
    }

    /// Unpack from `0xAARRGGBB`.
    pub fn from_argb(argb: u32) -> Self {
        let [a, r, g, b] = argb.to_be_bytes();
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::black()
    }
}

/// How a shape is painted.
///
/// A shape is either filled or stroked, never both and never neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Paint {
    /// Solid interior in the given color.
    Fill(Color),
    /// Outline only, in the given color.
    Stroke(Color),
}

impl Paint {
    /// Fill color, if the shape is filled.
    pub fn fill_color(&self) -> Option<Color> {
        match self {
            Paint::Fill(c) => Some(*c),
            Paint::Stroke(_) => None,
        }
    }

    /// Stroke color, if the shape is outlined.
    pub fn stroke_color(&self) -> Option<Color> {
        match self {
            Paint::Stroke(c) => Some(*c),
            Paint::Fill(_) => None,
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, Paint::Fill(_))
    }

    /// The color regardless of channel.
    pub fn color(&self) -> Color {
        match self {
            Paint::Fill(c) | Paint::Stroke(c) => *c,
        }
    }

    /// Same channel, new color.
    pub fn with_color(self, color: Color) -> Self {
        match self {
            Paint::Fill(_) => Paint::Fill(color),
            Paint::Stroke(_) => Paint::Stroke(color),
        }
    }
}

impl Default for Paint {
    fn default() -> Self {
        Paint::Stroke(Color::black())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argb_packing() {
        let c = Color::new(0x12, 0x34, 0x56, 0x78);
        assert_eq!(c.to_argb(), 0x7812_3456);
        assert_eq!(Color::from_argb(0x7812_3456), c);
    }

    #[test]
    fn test_paint_channels_are_exclusive() {
        let fill = Paint::Fill(Color::white());
        assert_eq!(fill.fill_color(), Some(Color::white()));
        assert_eq!(fill.stroke_color(), None);

        let stroke = Paint::Stroke(Color::black());
        assert_eq!(stroke.fill_color(), None);
        assert_eq!(stroke.stroke_color(), Some(Color::black()));
    }

    #[test]
    fn test_with_color_keeps_channel() {
        let red = Color::rgb(255, 0, 0);
        assert_eq!(Paint::Fill(Color::black()).with_color(red), Paint::Fill(red));
        assert_eq!(Paint::Stroke(Color::black()).with_color(red), Paint::Stroke(red));
    }
}
