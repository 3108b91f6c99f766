//! Software renderer
//!
//! A CPU rasterizer that draws the model and its geometric decal patches
//! into an RGBA framebuffer with a depth buffer. It exists so snapshots can
//! be produced without a GPU, and draws exactly what a GPU renderer would:
//! the model with its atlas (uv-paint) or base texture, then every decal
//! patch blended on top without depth writes.

use image::RgbaImage;

use crate::decal::Strategy;
use crate::foundation::color::{blend_over, Rgba};
use crate::foundation::math::{self, Vec2, Vec3};
use crate::scene::{Camera, Model, SceneController, TextureSource};
use super::RenderError;

/// Ambient term of the headlight shading
const AMBIENT: f32 = 0.35;

/// Depth bias that lets coplanar decal patches pass the depth test
const DECAL_DEPTH_BIAS: f32 = 1e-3;

/// Output surface settings saved and restored around snapshots
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererState {
    /// Logical width
    pub width: u32,
    /// Logical height
    pub height: u32,
    /// Device pixel ratio
    pub pixel_ratio: f32,
    /// Clear color; `None` clears to transparent
    pub background: Option<Rgba>,
}

impl RendererState {
    /// Framebuffer size in device pixels
    pub fn device_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 * self.pixel_ratio).round() as u32).max(1);
        (scale(self.width), scale(self.height))
    }
}

impl Default for RendererState {
    fn default() -> Self {
        Self { width: 1280, height: 720, pixel_ratio: 1.0, background: Some(Rgba::rgb(24, 24, 28)) }
    }
}

/// Something that can draw the scene and hand back pixels
pub trait Renderer {
    /// Current output settings
    fn state(&self) -> RendererState;

    /// Replace output settings
    fn set_state(&mut self, state: RendererState);

    /// Draw one frame of the scene
    fn render(&mut self, scene: &SceneController) -> Result<(), RenderError>;

    /// Read back the last frame
    fn read_pixels(&self) -> Result<RgbaImage, RenderError>;
}

/// Color and depth targets
#[derive(Debug, Clone)]
pub struct Framebuffer {
    /// Color target
    pub pixels: RgbaImage,
    /// Depth per pixel (view distance)
    pub zbuffer: Vec<f32>,
}

impl Framebuffer {
    /// Allocate a framebuffer
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            zbuffer: vec![f32::MAX; (width * height) as usize],
        }
    }

    /// Clear color and depth
    pub fn clear(&mut self, color: Rgba) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = color.to_pixel();
        }
        self.zbuffer.fill(f32::MAX);
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// How a triangle's texels are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Opaque surface, writes depth
    Opaque,
    /// Alpha blended overlay, tests but never writes depth
    Overlay,
}

/// Triangle projected to screen space
#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    depth: f32,
    uv: Vec2,
}

/// What a triangle samples
#[derive(Clone, Copy)]
enum Surface<'a> {
    Textured(&'a RgbaImage),
    Flat(Rgba),
}

impl Surface<'_> {
    fn sample(&self, uv: &Vec2) -> [u8; 4] {
        match self {
            Self::Flat(color) => color.to_array(),
            Self::Textured(texture) => {
                let (w, h) = texture.dimensions();
                let u = uv.x.rem_euclid(1.0);
                let v = uv.y.rem_euclid(1.0);
                let x = ((u * w as f32) as u32).min(w.saturating_sub(1));
                let y = (((1.0 - v) * h as f32) as u32).min(h.saturating_sub(1));
                texture.get_pixel(x, y).0
            }
        }
    }
}

/// CPU rasterizer
#[derive(Debug, Clone)]
pub struct SoftwareRenderer {
    state: RendererState,
    framebuffer: Option<Framebuffer>,
}

impl SoftwareRenderer {
    /// Create a renderer for a logical surface size
    pub fn new(width: u32, height: u32) -> Self {
        Self { state: RendererState { width, height, ..RendererState::default() }, framebuffer: None }
    }

    fn draw_model(&self, fb: &mut Framebuffer, scene: &SceneController, model: &Model, camera: &Camera) {
        let paint_atlases = scene.strategy() == Some(Strategy::UvPaint);
        let light = -camera.forward();

        for (mesh_id, node) in model.meshes() {
            let Some(to_world) = model.mesh_to_world(mesh_id) else {
                continue;
            };
            let material = model.material(node.material);
            let base_color = material.map_or(Rgba::WHITE, |m| m.base_color);
            let atlas = scene.atlases().get(node.material).filter(|_| paint_atlases);
            let surface = match (atlas, material.map(|m| &m.texture), &node.geometry.uvs) {
                (Some(atlas), _, Some(_)) => Surface::Textured(atlas.canvas()),
                (None, Some(TextureSource::Decoded(texture)), Some(_)) => Surface::Textured(texture),
                _ => Surface::Flat(base_color),
            };

            let geometry = &node.geometry;
            let world: Vec<Vec3> = geometry.positions.iter().map(|p| math::transform_point(&to_world, p)).collect();
            for [a, b, c] in geometry.triangles() {
                let normal = (world[b] - world[a]).cross(&(world[c] - world[a]));
                if normal.norm_squared() <= f32::EPSILON * f32::EPSILON {
                    continue;
                }
                let shade = AMBIENT + (1.0 - AMBIENT) * normal.normalize().dot(&light).abs();
                let uv = |i: usize| geometry.uvs.as_ref().map_or_else(Vec2::zeros, |uvs| uvs[i]);
                let corners = [(world[a], uv(a)), (world[b], uv(b)), (world[c], uv(c))];
                self.draw_triangle(fb, camera, &corners, surface, shade, Pass::Opaque);
            }
        }
    }

    fn draw_decals(&self, fb: &mut Framebuffer, scene: &SceneController, model: &Model, camera: &Camera) {
        let container = model.container();
        // Patches draw in placement order on top of the model
        for decal in scene.decals().iter() {
            let Some(visual) = decal.visual().and_then(|id| scene.visuals().get(id)) else {
                continue;
            };
            let surface = Surface::Textured(&visual.material.texture);
            let mesh = &visual.mesh;
            for tri in mesh.indices.chunks_exact(3) {
                let corner = |i: u32| {
                    let v = &mesh.vertices[i as usize];
                    (container.transform_point(&v.position), v.uv)
                };
                let corners = [corner(tri[0]), corner(tri[1]), corner(tri[2])];
                self.draw_triangle(fb, camera, &corners, surface, 1.0, Pass::Overlay);
            }
        }
    }

    fn project(&self, fb: &Framebuffer, camera: &Camera, point: &Vec3, uv: Vec2) -> Option<ScreenVertex> {
        let (ndc_x, ndc_y, depth) = camera.project(point)?;
        if depth > camera.far {
            return None;
        }
        Some(ScreenVertex {
            x: (ndc_x + 1.0) * 0.5 * fb.width() as f32,
            y: (1.0 - ndc_y) * 0.5 * fb.height() as f32,
            depth,
            uv,
        })
    }

    /// Edge-function rasterization with perspective-correct UVs
    fn draw_triangle(
        &self,
        fb: &mut Framebuffer,
        camera: &Camera,
        corners: &[(Vec3, Vec2); 3],
        surface: Surface<'_>,
        shade: f32,
        pass: Pass,
    ) {
        let mut projected = [None; 3];
        for (slot, (point, uv)) in projected.iter_mut().zip(corners) {
            *slot = self.project(fb, camera, point, *uv);
        }
        // Triangles crossing the near plane are dropped
        let [Some(v1), Some(v2), Some(v3)] = projected else {
            return;
        };

        let area = (v2.y - v3.y) * (v1.x - v3.x) + (v3.x - v2.x) * (v1.y - v3.y);
        if area.abs() < 1e-5 {
            return;
        }
        let inv_area = 1.0 / area;

        let (w, h) = (fb.width(), fb.height());
        let min_x = v1.x.min(v2.x).min(v3.x).floor().max(0.0) as u32;
        let max_x = (v1.x.max(v2.x).max(v3.x).ceil().max(0.0) as u32).min(w);
        let min_y = v1.y.min(v2.y).min(v3.y).floor().max(0.0) as u32;
        let max_y = (v1.y.max(v2.y).max(v3.y).ceil().max(0.0) as u32).min(h);

        let (inv_z1, inv_z2, inv_z3) = (1.0 / v1.depth, 1.0 / v2.depth, 1.0 / v3.depth);
        const ERR: f32 = -1e-4;

        for y in min_y..max_y {
            for x in min_x..max_x {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;
                let b1 = ((v2.y - v3.y) * (px - v3.x) + (v3.x - v2.x) * (py - v3.y)) * inv_area;
                let b2 = ((v3.y - v1.y) * (px - v3.x) + (v1.x - v3.x) * (py - v3.y)) * inv_area;
                let b3 = 1.0 - b1 - b2;
                if b1 < ERR || b2 < ERR || b3 < ERR {
                    continue;
                }

                let inv_z = b1 * inv_z1 + b2 * inv_z2 + b3 * inv_z3;
                let z = 1.0 / inv_z;
                let idx = (y * w + x) as usize;
                let visible = match pass {
                    Pass::Opaque => z < fb.zbuffer[idx],
                    Pass::Overlay => z <= fb.zbuffer[idx] + DECAL_DEPTH_BIAS,
                };
                if !visible {
                    continue;
                }

                let uv = (v1.uv * (b1 * inv_z1) + v2.uv * (b2 * inv_z2) + v3.uv * (b3 * inv_z3)) / inv_z;
                let texel = surface.sample(&uv);
                let shaded = [
                    (f32::from(texel[0]) * shade).round().min(255.0) as u8,
                    (f32::from(texel[1]) * shade).round().min(255.0) as u8,
                    (f32::from(texel[2]) * shade).round().min(255.0) as u8,
                    texel[3],
                ];

                let pixel = fb.pixels.get_pixel_mut(x, y);
                match pass {
                    Pass::Opaque => {
                        fb.zbuffer[idx] = z;
                        pixel.0 = [shaded[0], shaded[1], shaded[2], 255];
                    }
                    Pass::Overlay => pixel.0 = blend_over(pixel.0, shaded, 1.0),
                }
            }
        }
    }
}

impl Renderer for SoftwareRenderer {
    fn state(&self) -> RendererState {
        self.state
    }

    fn set_state(&mut self, state: RendererState) {
        if state.device_size() != self.state.device_size() {
            self.framebuffer = None;
        }
        self.state = state;
    }

    fn render(&mut self, scene: &SceneController) -> Result<(), RenderError> {
        let (width, height) = self.state.device_size();
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }
        let mut fb = match self.framebuffer.take() {
            Some(fb) if fb.width() == width && fb.height() == height => fb,
            _ => Framebuffer::new(width, height),
        };
        fb.clear(self.state.background.unwrap_or(Rgba::TRANSPARENT));

        let mut camera = scene.camera().clone();
        camera.set_aspect_ratio(width as f32 / height as f32);

        if let Some(model) = scene.model() {
            self.draw_model(&mut fb, scene, model, &camera);
            self.draw_decals(&mut fb, scene, model, &camera);
        }
        log::trace!("Rendered {}x{} frame", width, height);
        self.framebuffer = Some(fb);
        Ok(())
    }

    fn read_pixels(&self) -> Result<RgbaImage, RenderError> {
        self.framebuffer.as_ref().map(|fb| fb.pixels.clone()).ok_or(RenderError::NoFrame)
    }
}
