//! RGBA color type shared by canvases, atlases, and materials

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing color strings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorError {
    /// The string is not `#rgb`, `#rrggbb`, or `#rrggbbaa`
    #[error("Invalid color string: {0}")]
    InvalidFormat(String),
}

/// 8-bit straight-alpha RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
    /// Alpha channel
    pub a: u8,
}

impl Rgba {
    /// Opaque white
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    /// Opaque black
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    /// Fully transparent black
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    /// Neutral gray used for placeholders
    pub const PLACEHOLDER_GRAY: Self = Self::new(160, 160, 160, 255);

    /// Create a color from channels
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional)
    pub fn from_hex(hex: &str) -> Result<Self, ColorError> {
        let digits = hex.trim().trim_start_matches('#');
        let err = || ColorError::InvalidFormat(hex.to_string());
        let byte = |s: &str| u8::from_str_radix(s, 16).map_err(|_| err());

        match digits.len() {
            3 => {
                let expand = |c: &str| byte(&c.repeat(2));
                Ok(Self::rgb(expand(&digits[0..1])?, expand(&digits[1..2])?, expand(&digits[2..3])?))
            }
            6 => Ok(Self::rgb(byte(&digits[0..2])?, byte(&digits[2..4])?, byte(&digits[4..6])?)),
            8 => Ok(Self::new(
                byte(&digits[0..2])?,
                byte(&digits[2..4])?,
                byte(&digits[4..6])?,
                byte(&digits[6..8])?,
            )),
            _ => Err(err()),
        }
    }

    /// Format as `#rrggbb` (or `#rrggbbaa` when not opaque)
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Channels as an array
    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Channels as normalized floats
    pub fn to_f32(self) -> [f32; 4] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
            f32::from(self.a) / 255.0,
        ]
    }

    /// Convert to an `image` pixel
    pub const fn to_pixel(self) -> image::Rgba<u8> {
        image::Rgba(self.to_array())
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::BLACK
    }
}

impl From<image::Rgba<u8>> for Rgba {
    fn from(p: image::Rgba<u8>) -> Self {
        Self::new(p.0[0], p.0[1], p.0[2], p.0[3])
    }
}

/// Source-over blend of straight-alpha `src` onto `dst`
///
/// `coverage` scales the source alpha (used for anti-aliased glyph edges
/// and bilinear-sampled canvas edges).
pub fn blend_over(dst: [u8; 4], src: [u8; 4], coverage: f32) -> [u8; 4] {
    let sa = f32::from(src[3]) / 255.0 * coverage.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return dst;
    }
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= f32::EPSILON {
        return [0, 0, 0, 0];
    }
    let mut out = [0u8; 4];
    for i in 0..3 {
        let s = f32::from(src[i]) / 255.0;
        let d = f32::from(dst[i]) / 255.0;
        let c = (s * sa + d * da * (1.0 - sa)) / out_a;
        out[i] = (c * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}
