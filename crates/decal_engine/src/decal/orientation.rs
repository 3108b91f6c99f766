//! # Orientation Basis Builder
//!
//! Builds the tangent frame a decal is projected along. The frame is derived
//! from the camera, not the mesh, so a decal always appears upright on screen
//! at placement time however the model has been spun.

use crate::foundation::math::{utils, Mat4, Vec3};
use crate::scene::Camera;

/// Below this `|normal x up|` the camera up is too close to the normal to
/// define a tangent, and the camera forward is used instead.
pub const GIMBAL_THRESHOLD: f32 = 1e-3;

/// Orthonormal right-handed surface frame
///
/// `tangent` maps to canvas +x, `bitangent` to canvas +y (up), and `normal`
/// points out of the surface towards the viewer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceFrame {
    /// Canvas +x direction
    pub tangent: Vec3,
    /// Canvas +y direction
    pub bitangent: Vec3,
    /// Surface normal
    pub normal: Vec3,
}

impl SurfaceFrame {
    /// Build a camera-aligned frame for a surface normal
    ///
    /// The tangent is `up x normal` (screen right when the surface faces the
    /// camera) and the bitangent is `normal x tangent`.
    pub fn build(normal: &Vec3, camera: &Camera) -> Self {
        let normal = normal.normalize();
        let mut tangent = camera.screen_up().cross(&normal);
        if tangent.norm() < GIMBAL_THRESHOLD {
            log::trace!("Gimbal case for normal {:?}, using camera forward", normal);
            tangent = camera.forward().cross(&normal);
        }
        if tangent.norm() < GIMBAL_THRESHOLD {
            // Degenerate camera; any perpendicular keeps the frame valid
            let helper = if normal.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
            tangent = helper.cross(&normal);
        }
        let tangent = tangent.normalize();
        let bitangent = normal.cross(&tangent).normalize();

        Self { tangent, bitangent, normal }
    }

    /// Rotate tangent and bitangent about the normal by `degrees` (counter-clockwise)
    #[must_use]
    pub fn rotated(&self, degrees: f32) -> Self {
        let (sin, cos) = utils::deg_to_rad(degrees).sin_cos();
        let tangent = (self.tangent * cos + self.bitangent * sin).normalize();
        let bitangent = self.normal.cross(&tangent).normalize();
        Self { tangent, bitangent, normal: self.normal }
    }

    /// Apply a rotation (or any orthonormal map) to every axis
    #[must_use]
    pub fn map_axes(&self, f: impl Fn(&Vec3) -> Vec3) -> Self {
        Self {
            tangent: f(&self.tangent).normalize(),
            bitangent: f(&self.bitangent).normalize(),
            normal: f(&self.normal).normalize(),
        }
    }

    /// Projector matrix: unit cube local space to the oriented, scaled box at `origin`
    pub fn to_matrix(&self, origin: &Vec3, scale: &Vec3) -> Mat4 {
        let x = self.tangent * scale.x;
        let y = self.bitangent * scale.y;
        let z = self.normal * scale.z;

        // Columns are [tangent | bitangent | normal | origin]
        Mat4::new(
            x.x, y.x, z.x, origin.x,
            x.y, y.y, z.y, origin.y,
            x.z, y.z, z.z, origin.z,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    /// Coordinates of `point` in this frame relative to `origin` (unscaled)
    pub fn to_local(&self, origin: &Vec3, point: &Vec3) -> Vec3 {
        let d = point - origin;
        Vec3::new(d.dot(&self.tangent), d.dot(&self.bitangent), d.dot(&self.normal))
    }

    /// Whether the axes are unit length and mutually perpendicular within `eps`
    pub fn is_orthonormal(&self, eps: f32) -> bool {
        let unit = |v: &Vec3| (v.norm() - 1.0).abs() <= eps;
        unit(&self.tangent)
            && unit(&self.bitangent)
            && unit(&self.normal)
            && self.tangent.dot(&self.bitangent).abs() <= eps
            && self.tangent.dot(&self.normal).abs() <= eps
            && self.bitangent.dot(&self.normal).abs() <= eps
    }
}
