//! # Asset Canvas Generator
//!
//! Rasterizes a decal's content (a line of text or a logo) onto a square,
//! transparent canvas. Both decal strategies consume the canvas: geometric
//! decals use it as their texture, uv-paint decals stamp it into an atlas.
//!
//! Rendering is pure: identical inputs produce identical pixels.

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::assets::{FontLibrary, LogoImage};
use crate::config::CanvasSettings;
use crate::foundation::color::{blend_over, Rgba};

/// Width of a fallback glyph block relative to the font size
const BLOCK_ADVANCE: f32 = 0.6;

/// What to draw on a canvas
#[derive(Debug, Clone, Copy)]
pub enum CanvasContent<'a> {
    /// A single line of text
    Text {
        /// The characters to draw
        text: &'a str,
        /// Requested font family
        font_family: &'a str,
        /// Fill color
        color: Rgba,
        /// Explicit font size in pixels; adaptive when `None`
        font_px: Option<f32>,
    },
    /// A logo image
    Logo {
        /// Load state of the image
        image: &'a LogoImage,
        /// Optional multiplicative tint
        tint: Option<Rgba>,
    },
}

/// Render `content` onto a fresh `resolution x resolution` transparent canvas
pub fn render_canvas(content: &CanvasContent<'_>, fonts: &FontLibrary, settings: &CanvasSettings) -> RgbaImage {
    let res = settings.resolution.max(1);
    let mut canvas = RgbaImage::from_pixel(res, res, Rgba::TRANSPARENT.to_pixel());

    match *content {
        CanvasContent::Text { text, font_family, color, font_px } => {
            draw_text(&mut canvas, text, font_family, color, font_px, fonts, settings);
        }
        CanvasContent::Logo { image, tint } => draw_logo(&mut canvas, image, tint, settings),
    }

    canvas
}

/// Downscaled preview of a canvas for UI lists
pub fn thumbnail(canvas: &RgbaImage, size: u32) -> RgbaImage {
    let size = size.max(1);
    imageops::resize(canvas, size, size, FilterType::Triangle)
}

/// Adaptive font size for a line of `char_count` characters
pub fn adaptive_font_size(char_count: usize, settings: &CanvasSettings) -> f32 {
    let res = settings.resolution as f32;
    let count = char_count.max(1) as f32;
    (res * settings.adaptive_font_scale / count).clamp(res * settings.min_font_ratio, res * settings.max_font_ratio)
}

fn draw_text(
    canvas: &mut RgbaImage,
    text: &str,
    font_family: &str,
    color: Rgba,
    font_px: Option<f32>,
    fonts: &FontLibrary,
    settings: &CanvasSettings,
) {
    let text = text.trim_end_matches(['\n', '\r']);
    if text.trim().is_empty() {
        return;
    }

    let res = canvas.width() as f32;
    let max_width = res * settings.max_text_width_ratio;
    let char_count = text.chars().count();
    let mut px = font_px.unwrap_or_else(|| adaptive_font_size(char_count, settings)).max(1.0);

    let Some(font) = fonts.resolve(font_family) else {
        log::debug!("No fonts registered, drawing '{}' as glyph blocks", text);
        let width = char_count as f32 * px * BLOCK_ADVANCE;
        if width > max_width {
            px *= max_width / width;
        }
        draw_blocks(canvas, text, color, px);
        return;
    };

    // Shrink until the measured line fits
    let mut width = measure(font, text, px);
    while width > max_width && px > 1.0 {
        px = (px * (max_width / width).min(0.95)).max(1.0);
        width = measure(font, text, px);
    }

    let (ascent, descent) = font
        .horizontal_line_metrics(px)
        .map_or((px * 0.8, -px * 0.2), |m| (m.ascent, m.descent));
    let baseline = (res - (ascent - descent)) * 0.5 + ascent;
    let mut pen_x = (res - width) * 0.5;
    let mut previous = None;

    for ch in text.chars() {
        if let Some(prev) = previous {
            pen_x += font.horizontal_kern(prev, ch, px).unwrap_or(0.0);
        }
        let (metrics, bitmap) = font.rasterize(ch, px);
        let left = (pen_x + metrics.xmin as f32).round() as i64;
        let top = (baseline - (metrics.height as i32 + metrics.ymin) as f32).round() as i64;

        for gy in 0..metrics.height {
            for gx in 0..metrics.width {
                let coverage = bitmap[gy * metrics.width + gx];
                if coverage > 0 {
                    blend_pixel(canvas, left + gx as i64, top + gy as i64, color, f32::from(coverage) / 255.0);
                }
            }
        }

        pen_x += metrics.advance_width;
        previous = Some(ch);
    }
}

/// Width of a line of text at `px`, including kerning
fn measure(font: &fontdue::Font, text: &str, px: f32) -> f32 {
    let mut width = 0.0;
    let mut previous = None;
    for ch in text.chars() {
        if let Some(prev) = previous {
            width += font.horizontal_kern(prev, ch, px).unwrap_or(0.0);
        }
        width += font.metrics(ch, px).advance_width;
        previous = Some(ch);
    }
    width
}

/// Degraded text rendering: one solid block per visible character
fn draw_blocks(canvas: &mut RgbaImage, text: &str, color: Rgba, px: f32) {
    let res = canvas.width() as f32;
    let advance = px * BLOCK_ADVANCE;
    let block_w = px * 0.5;
    let block_h = px * 0.7;
    let total = text.chars().count() as f32 * advance;
    let left = (res - total) * 0.5 + (advance - block_w) * 0.5;
    let top = (res - block_h) * 0.5;

    for (i, ch) in text.chars().enumerate() {
        if ch.is_whitespace() {
            continue;
        }
        let x0 = left + i as f32 * advance;
        fill_rect(canvas, x0, top, block_w, block_h, color);
    }
}

fn draw_logo(canvas: &mut RgbaImage, image: &LogoImage, tint: Option<Rgba>, settings: &CanvasSettings) {
    let res = canvas.width() as f32;
    let fit = res * settings.logo_fill;

    let LogoImage::Ready(source) = image else {
        // Pending or failed logos show a neutral placeholder
        let offset = (res - fit) * 0.5;
        fill_rect(canvas, offset, offset, fit, fit, Rgba::PLACEHOLDER_GRAY);
        return;
    };

    let (w, h) = source.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let scale = (fit / w as f32).min(fit / h as f32);
    let dw = ((w as f32 * scale).round() as u32).max(1);
    let dh = ((h as f32 * scale).round() as u32).max(1);
    let mut scaled = imageops::resize(source, dw, dh, FilterType::Triangle);

    if let Some(tint) = tint {
        let t = tint.to_f32();
        for pixel in scaled.pixels_mut() {
            for c in 0..4 {
                pixel.0[c] = (f32::from(pixel.0[c]) * t[c]).round() as u8;
            }
        }
    }

    let x0 = i64::from((canvas.width() - dw) / 2);
    let y0 = i64::from((canvas.height() - dh) / 2);
    for (x, y, pixel) in scaled.enumerate_pixels() {
        blend_pixel(canvas, x0 + i64::from(x), y0 + i64::from(y), Rgba::from(*pixel), 1.0);
    }
}

fn fill_rect(canvas: &mut RgbaImage, x: f32, y: f32, w: f32, h: f32, color: Rgba) {
    let x0 = x.round().max(0.0) as u32;
    let y0 = y.round().max(0.0) as u32;
    let x1 = ((x + w).round().max(0.0) as u32).min(canvas.width());
    let y1 = ((y + h).round().max(0.0) as u32).min(canvas.height());
    for py in y0..y1 {
        for px in x0..x1 {
            blend_pixel(canvas, i64::from(px), i64::from(py), color, 1.0);
        }
    }
}

fn blend_pixel(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba, coverage: f32) {
    if x < 0 || y < 0 || x >= i64::from(canvas.width()) || y >= i64::from(canvas.height()) {
        return;
    }
    let pixel = canvas.get_pixel_mut(x as u32, y as u32);
    pixel.0 = blend_over(pixel.0, color.to_array(), coverage);
}
