//! # UV-Atlas Painter
//!
//! Paints decals directly into per-material texture canvases. Each atlas
//! keeps its pristine base image; every change recomposites the whole atlas
//! from the base plus all of its decals in placement order, so deleting or
//! editing a decal can never leave stale pixels behind.
//!
//! Atlas pixel for a texture coordinate: `(u * W, (1 - v) * H)`.

use std::collections::HashMap;

use image::RgbaImage;

use crate::assets::image_loader;
use crate::config::AtlasSettings;
use crate::foundation::collections::MaterialId;
use crate::foundation::color::blend_over;
use crate::foundation::math::{utils, Vec2};
use crate::scene::{Model, TextureSource};

/// Texture binding of an atlas; the version changes whenever pixels change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    /// Material the texture belongs to
    pub material: MaterialId,
    /// Monotonic content version
    pub version: u64,
}

/// One stamp to composite into an atlas
#[derive(Debug, Clone, Copy)]
pub struct Stamp<'a> {
    /// Rendered decal canvas
    pub canvas: &'a RgbaImage,
    /// Center in atlas pixels
    pub pixel: Vec2,
    /// Length of the canvas' longer side, in atlas pixels
    pub size: f32,
    /// Counter-clockwise rotation in degrees
    pub rotation_deg: f32,
}

/// Paintable texture of one material
#[derive(Debug, Clone)]
pub struct MaterialAtlas {
    material: MaterialId,
    base: RgbaImage,
    canvas: RgbaImage,
    version: u64,
    dirty: bool,
}

impl MaterialAtlas {
    /// Create an atlas seeded with `base`
    pub fn new(material: MaterialId, base: RgbaImage) -> Self {
        Self { material, canvas: base.clone(), base, version: 0, dirty: true }
    }

    /// Current composited pixels
    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Pristine base image
    pub fn base(&self) -> &RgbaImage {
        &self.base
    }

    /// Atlas dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    /// Texture binding for renderers
    pub fn handle(&self) -> TextureHandle {
        TextureHandle { material: self.material, version: self.version }
    }

    /// Whether the pixels changed since the last upload
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Map a texture coordinate to atlas pixels
    pub fn uv_to_pixel(&self, uv: &Vec2) -> Vec2 {
        let (w, h) = self.canvas.dimensions();
        Vec2::new(uv.x * w as f32, (1.0 - uv.y) * h as f32)
    }

    /// Rebuild the canvas from the base image plus `stamps` in order
    pub fn recomposite<'a>(&mut self, stamps: impl IntoIterator<Item = Stamp<'a>>) {
        self.canvas = self.base.clone();
        let mut count = 0;
        for stamp in stamps {
            composite(&mut self.canvas, &stamp);
            count += 1;
        }
        self.version += 1;
        self.dirty = true;
        log::debug!("Recomposited atlas {:?} with {} decals (v{})", self.material, count, self.version);
    }
}

/// All atlases of the loaded model, one per material
#[derive(Debug, Default)]
pub struct AtlasStore {
    atlases: HashMap<MaterialId, MaterialAtlas>,
    order: Vec<MaterialId>,
}

impl AtlasStore {
    /// Create one atlas per material referenced by the model
    ///
    /// Materials without a usable texture get a blank atlas.
    pub fn from_model(model: &Model, settings: &AtlasSettings) -> Self {
        let mut store = Self::default();
        for material_id in model.used_materials() {
            let Some(material) = model.material(material_id) else {
                continue;
            };
            let base = match &material.texture {
                TextureSource::Decoded(image) => image.clone(),
                TextureSource::None => blank(settings),
                TextureSource::Unavailable(reason) => {
                    log::warn!("Material '{}' texture unavailable ({}), using blank atlas", material.name, reason);
                    blank(settings)
                }
            };
            store.order.push(material_id);
            store.atlases.insert(material_id, MaterialAtlas::new(material_id, base));
        }
        log::info!("Created {} material atlases", store.atlases.len());
        store
    }

    /// Atlas for a material
    pub fn get(&self, material: MaterialId) -> Option<&MaterialAtlas> {
        self.atlases.get(&material)
    }

    /// Mutable atlas for a material
    pub fn get_mut(&mut self, material: MaterialId) -> Option<&mut MaterialAtlas> {
        self.atlases.get_mut(&material)
    }

    /// Atlases in model material order
    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &MaterialAtlas)> + '_ {
        self.order.iter().filter_map(|id| self.atlases.get(id).map(|a| (*id, a)))
    }

    /// Number of atlases
    pub fn len(&self) -> usize {
        self.atlases.len()
    }

    /// True when there are no atlases
    pub fn is_empty(&self) -> bool {
        self.atlases.is_empty()
    }

    /// Reset every atlas to its base image
    pub fn reset_all(&mut self) {
        for atlas in self.atlases.values_mut() {
            atlas.recomposite(std::iter::empty());
        }
    }

    /// Materials whose atlases changed, clearing their dirty flags
    pub fn take_dirty(&mut self) -> Vec<TextureHandle> {
        let mut dirty = Vec::new();
        for id in &self.order {
            if let Some(atlas) = self.atlases.get_mut(id) {
                if atlas.dirty {
                    atlas.dirty = false;
                    dirty.push(atlas.handle());
                }
            }
        }
        dirty
    }
}

fn blank(settings: &AtlasSettings) -> RgbaImage {
    image_loader::solid_color(settings.blank_size, settings.blank_size, settings.blank_color)
}

/// Source-over blend a scaled, rotated canvas onto `target`
///
/// The canvas is sampled bilinearly at each destination pixel center.
pub fn composite(target: &mut RgbaImage, stamp: &Stamp<'_>) {
    let (cw, ch) = stamp.canvas.dimensions();
    if cw == 0 || ch == 0 || stamp.size <= 0.0 {
        return;
    }
    let scale = stamp.size / cw.max(ch) as f32;
    let (sin, cos) = utils::deg_to_rad(stamp.rotation_deg).sin_cos();

    // Bounding box of the rotated rectangle
    let half_w = cw as f32 * scale * 0.5;
    let half_h = ch as f32 * scale * 0.5;
    let extent_x = half_w * cos.abs() + half_h * sin.abs();
    let extent_y = half_w * sin.abs() + half_h * cos.abs();

    let (tw, th) = target.dimensions();
    let x0 = (stamp.pixel.x - extent_x).floor().max(0.0) as u32;
    let y0 = (stamp.pixel.y - extent_y).floor().max(0.0) as u32;
    let x1 = ((stamp.pixel.x + extent_x).ceil().max(0.0) as u32).min(tw);
    let y1 = ((stamp.pixel.y + extent_y).ceil().max(0.0) as u32).min(th);

    for y in y0..y1 {
        for x in x0..x1 {
            // Image space has y down; rotation is counter-clockwise on screen
            let dx = x as f32 + 0.5 - stamp.pixel.x;
            let dy = y as f32 + 0.5 - stamp.pixel.y;
            let lx = dx * cos - dy * sin;
            let ly = dx * sin + dy * cos;
            let sx = lx / scale + cw as f32 * 0.5;
            let sy = ly / scale + ch as f32 * 0.5;

            if let Some(src) = sample_bilinear(stamp.canvas, sx, sy) {
                let pixel = target.get_pixel_mut(x, y);
                pixel.0 = blend_over(pixel.0, src, 1.0);
            }
        }
    }
}

/// Bilinear sample at continuous pixel coordinates (pixel centers at `i + 0.5`)
///
/// Interpolates premultiplied color so transparent neighbors do not darken
/// edges. Returns `None` outside the image.
pub fn sample_bilinear(image: &RgbaImage, x: f32, y: f32) -> Option<[u8; 4]> {
    let (w, h) = image.dimensions();
    if x < 0.0 || y < 0.0 || x > w as f32 || y > h as f32 {
        return None;
    }
    let fx = (x - 0.5).clamp(0.0, (w - 1) as f32);
    let fy = (y - 0.5).clamp(0.0, (h - 1) as f32);
    let x0 = fx.floor() as u32;
    let y0 = fy.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let tx = fx - x0 as f32;
    let ty = fy - y0 as f32;

    let mut acc = [0.0_f32; 4];
    for (px, py, weight) in [
        (x0, y0, (1.0 - tx) * (1.0 - ty)),
        (x1, y0, tx * (1.0 - ty)),
        (x0, y1, (1.0 - tx) * ty),
        (x1, y1, tx * ty),
    ] {
        let p = image.get_pixel(px, py).0;
        let a = f32::from(p[3]) / 255.0;
        for c in 0..3 {
            acc[c] += f32::from(p[c]) * a * weight;
        }
        acc[3] += a * weight;
    }

    if acc[3] <= 0.0 {
        return Some([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        out[c] = (acc[c] / acc[3]).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (acc[3] * 255.0).round().clamp(0.0, 255.0) as u8;
    Some(out)
}
