//! # Surface Hit Resolver
//!
//! Casts the pointer ray into the model and reports the nearest surface hit.
//! Only model meshes are tested; decal visuals live in their own arena and
//! can never be picked.

use crate::foundation::collections::{MaterialId, MeshId};
use crate::foundation::math::{self, Vec2, Vec3};
use crate::scene::{ray_hits_sphere, Camera, Model, Ray, Triangle, Viewport};

/// Nearest intersection of the pointer ray with the model
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceHit {
    /// Hit position in world space
    pub point: Vec3,
    /// Unit face normal in world space, facing the camera
    pub normal: Vec3,
    /// Distance from the camera along the ray
    pub distance: f32,
    /// Mesh that was hit
    pub mesh: MeshId,
    /// Material of that mesh
    pub material: MaterialId,
    /// Triangle index within the mesh
    pub triangle: usize,
    /// Interpolated texture coordinate, when the mesh has UVs
    pub uv: Option<Vec2>,
}

/// Resolve the surface under a pointer position
///
/// # Arguments
/// * `pointer` - Pointer position in logical pixels, origin top-left
/// * `viewport` - Drawing surface dimensions
/// * `camera` - Active camera
/// * `model` - Model to test against
///
/// Returns `None` when the ray misses every triangle.
pub fn resolve_hit(pointer: Vec2, viewport: &Viewport, camera: &Camera, model: &Model) -> Option<SurfaceHit> {
    let (ndc_x, ndc_y) = viewport.to_ndc(pointer.x, pointer.y);
    let ray = camera.ray_through_ndc(ndc_x, ndc_y);
    let mut hit = raycast_model(&ray, model)?;

    // Ensure the normal faces the viewer
    if hit.normal.dot(&camera.forward()) > 0.0 {
        hit.normal = -hit.normal;
    }

    log::trace!("Surface hit on mesh {:?} at {:?}", hit.mesh, hit.point);
    Some(hit)
}

/// Nearest hit of a world-space ray against every mesh of the model
///
/// Normals are the geometric face normals and are not flipped here.
pub fn raycast_model(ray: &Ray, model: &Model) -> Option<SurfaceHit> {
    let container = model.container();
    let mut nearest: Option<SurfaceHit> = None;

    for (mesh_id, node) in model.meshes() {
        // Bounding sphere early-out
        let bounds = &node.container_bounds;
        if !bounds.is_valid() {
            continue;
        }
        let center = container.transform_point(&bounds.center());
        let radius = bounds.size().norm() * 0.5 * container.scale.abs();
        if !ray_hits_sphere(ray, &center, radius) {
            continue;
        }

        let Some(to_world) = model.mesh_to_world(mesh_id) else {
            continue;
        };
        let geometry = &node.geometry;
        let world: Vec<Vec3> = geometry
            .positions
            .iter()
            .map(|p| math::transform_point(&to_world, p))
            .collect();

        for (index, [a, b, c]) in geometry.triangles().enumerate() {
            let triangle = Triangle::new(world[a], world[b], world[c]);
            let Some(tri_hit) = triangle.intersect_ray(ray) else {
                continue;
            };
            if nearest.as_ref().is_some_and(|n| n.distance <= tri_hit.t) {
                continue;
            }
            let Some(normal) = triangle.normal() else {
                continue;
            };

            let uv = geometry.uvs.as_ref().map(|uvs| {
                let [w0, w1, w2] = tri_hit.weights();
                uvs[a] * w0 + uvs[b] * w1 + uvs[c] * w2
            });

            nearest = Some(SurfaceHit {
                point: ray.point_at(tri_hit.t),
                normal,
                distance: tri_hit.t,
                mesh: mesh_id,
                material: node.material,
                triangle: index,
                uv,
            });
        }
    }

    nearest
}
