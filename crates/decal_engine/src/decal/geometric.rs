//! # Geometric Decal Builder
//!
//! Projects a canvas onto the model by cutting a patch out of the hit mesh
//! with an oriented projector box. The patch is a separate mesh drawn after
//! the model with its own transparent material, so the model's textures are
//! never modified.
//!
//! ## Algorithm
//!
//! 1. Place the projector box at the hit point (nudged along the normal),
//!    oriented by the rotated surface frame
//! 2. Keep the triangles of the hit mesh that face the projector normal
//! 3. Clip each against the six box planes (Sutherland-Hodgman)
//! 4. Emit the clipped polygons with projector-plane UVs
//!
//! All positions are in container space.

use image::RgbaImage;

use crate::config::GeometricSettings;
use crate::foundation::collections::{MeshId, SlotMap, VisualId};
use crate::foundation::math::{Vec2, Vec3};
use crate::scene::Model;
use super::orientation::SurfaceFrame;
use super::DecalError;

/// One vertex of a decal patch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecalVertex {
    /// Container-space position
    pub position: Vec3,
    /// Interpolated surface normal
    pub normal: Vec3,
    /// Projector-plane texture coordinate
    pub uv: Vec2,
}

/// Triangle mesh of a decal patch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecalMesh {
    /// Vertices
    pub vertices: Vec<DecalVertex>,
    /// Triangle list indices
    pub indices: Vec<u32>,
}

impl DecalMesh {
    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// True when the patch has no triangles
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Material of a decal patch
#[derive(Debug, Clone)]
pub struct DecalMaterial {
    /// Canvas texture
    pub texture: RgbaImage,
    /// Alpha blended
    pub transparent: bool,
    /// Whether the patch writes depth
    pub depth_write: bool,
    /// Draw order relative to the model (model is 0)
    pub render_order: i32,
}

impl DecalMaterial {
    /// Standard decal material for a canvas
    pub fn new(texture: RgbaImage, settings: &GeometricSettings) -> Self {
        Self {
            texture,
            transparent: true,
            depth_write: false,
            render_order: settings.render_order,
        }
    }
}

/// A drawable decal patch
#[derive(Debug, Clone)]
pub struct DecalVisual {
    /// Patch geometry
    pub mesh: DecalMesh,
    /// Patch material
    pub material: DecalMaterial,
}

/// Arena of decal visuals, kept apart from the model so picking never sees them
#[derive(Debug, Default)]
pub struct VisualArena {
    visuals: SlotMap<VisualId, DecalVisual>,
}

impl VisualArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a visual
    pub fn insert(&mut self, visual: DecalVisual) -> VisualId {
        self.visuals.insert(visual)
    }

    /// Swap in a new visual under an existing id; returns the old one
    pub fn replace(&mut self, id: VisualId, visual: DecalVisual) -> Option<DecalVisual> {
        self.visuals.get_mut(id).map(|slot| std::mem::replace(slot, visual))
    }

    /// Release a visual
    pub fn remove(&mut self, id: VisualId) -> Option<DecalVisual> {
        self.visuals.remove(id)
    }

    /// Look up a visual
    pub fn get(&self, id: VisualId) -> Option<&DecalVisual> {
        self.visuals.get(id)
    }

    /// Number of live visuals
    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    /// True when there are no visuals
    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }

    /// Release every visual
    pub fn clear(&mut self) {
        self.visuals.clear();
    }
}

/// Oriented projector box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectorBox {
    /// Box center in container space
    pub center: Vec3,
    /// Rotated orientation frame
    pub frame: SurfaceFrame,
    /// Full extents along tangent, bitangent, and normal
    pub extents: Vec3,
}

impl ProjectorBox {
    /// Projector for a decal of `size` world units at `point`
    pub fn new(point: &Vec3, frame: &SurfaceFrame, size: f32, settings: &GeometricSettings) -> Self {
        let lateral = size * settings.lateral_padding;
        Self {
            center: point + frame.normal * settings.surface_offset,
            frame: *frame,
            extents: Vec3::new(lateral, lateral, size * settings.depth_ratio),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    local: Vec3,
    normal: Vec3,
}

impl ClipVertex {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            local: self.local + (other.local - self.local) * t,
            normal: self.normal + (other.normal - self.normal) * t,
        }
    }
}

/// Clip a convex polygon against `sign * local[axis] <= limit`
fn clip_polygon(polygon: &[ClipVertex], axis: usize, sign: f32, limit: f32) -> Vec<ClipVertex> {
    let mut out = Vec::with_capacity(polygon.len() + 2);
    let Some(last) = polygon.last() else {
        return out;
    };

    let distance = |v: &ClipVertex| limit - sign * v.local[axis];
    let mut previous = *last;
    let mut previous_inside = distance(&previous) >= 0.0;

    for current in polygon {
        let current_inside = distance(current) >= 0.0;
        if current_inside != previous_inside {
            let dp = distance(&previous);
            let dc = distance(current);
            let t = dp / (dp - dc);
            out.push(previous.lerp(current, t));
        }
        if current_inside {
            out.push(*current);
        }
        previous = *current;
        previous_inside = current_inside;
    }

    out
}

/// Cut the decal patch for `projector` out of mesh `mesh_id`
pub fn build_decal_mesh(
    model: &Model,
    mesh_id: MeshId,
    projector: &ProjectorBox,
    settings: &GeometricSettings,
) -> Result<DecalMesh, DecalError> {
    if model.mesh(mesh_id).is_none() {
        return Err(DecalError::UnknownMesh);
    }
    let vertex_normals = model.container_normals(mesh_id);
    let frame = &projector.frame;
    let half = projector.extents * 0.5;
    let mut mesh = DecalMesh::default();

    for ([a, b, c], triangle) in model.container_triangles(mesh_id) {
        let Some(face_normal) = triangle.normal() else {
            continue;
        };
        // Only surfaces facing the projector receive the decal
        if face_normal.dot(&frame.normal) <= 0.0 {
            continue;
        }

        let normal_of = |i: usize| vertex_normals.as_ref().map_or(face_normal, |n| n[i]);
        let mut polygon = vec![
            ClipVertex { local: frame.to_local(&projector.center, &triangle.v0), normal: normal_of(a) },
            ClipVertex { local: frame.to_local(&projector.center, &triangle.v1), normal: normal_of(b) },
            ClipVertex { local: frame.to_local(&projector.center, &triangle.v2), normal: normal_of(c) },
        ];

        for axis in 0..3 {
            polygon = clip_polygon(&polygon, axis, 1.0, half[axis]);
            polygon = clip_polygon(&polygon, axis, -1.0, half[axis]);
            if polygon.len() < 3 {
                break;
            }
        }
        if polygon.len() < 3 {
            continue;
        }

        let base = mesh.vertices.len() as u32;
        for v in &polygon {
            let position = projector.center
                + frame.tangent * v.local.x
                + frame.bitangent * v.local.y
                + frame.normal * v.local.z;
            let normal = if v.normal.norm_squared() > 0.0 { v.normal.normalize() } else { face_normal };
            mesh.vertices.push(DecalVertex {
                position: position + normal * settings.surface_offset,
                normal,
                uv: Vec2::new(
                    v.local.x / projector.extents.x + 0.5,
                    v.local.y / projector.extents.y + 0.5,
                ),
            });
        }
        for i in 1..polygon.len() as u32 - 1 {
            mesh.indices.extend([base, base + i, base + i + 1]);
        }
    }

    if mesh.is_empty() {
        return Err(DecalError::EmptyPatch);
    }
    log::trace!("Decal patch: {} vertices, {} triangles", mesh.vertices.len(), mesh.triangle_count());
    Ok(mesh)
}

/// Build a complete visual for a geometric decal record
///
/// `point` and `frame` are the container-space placement; `frame` must not
/// be rotated yet, `rotation_deg` is applied here.
pub fn build_visual(
    model: &Model,
    mesh_id: MeshId,
    point: &Vec3,
    frame: &SurfaceFrame,
    size: f32,
    rotation_deg: f32,
    canvas: RgbaImage,
    settings: &GeometricSettings,
) -> Result<DecalVisual, DecalError> {
    let projector = ProjectorBox::new(point, &frame.rotated(rotation_deg), size, settings);
    let mesh = build_decal_mesh(model, mesh_id, &projector, settings)?;
    Ok(DecalVisual { mesh, material: DecalMaterial::new(canvas, settings) })
}
