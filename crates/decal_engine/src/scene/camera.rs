//! # 3D Camera and Viewport
//!
//! Camera abstraction used for pointer ray casting, orientation frames, and
//! the software snapshot renderer.
//!
//! ## Design Principles
//! - **Library-agnostic**: No backend dependencies in camera math
//! - **Immutable operation**: Query methods never modify camera state
//! - **One convention**: Ray generation and projection share the same basis,
//!   so a pixel projected by the renderer casts back onto the same surface

use crate::foundation::math::{Vec3, utils};
use super::ray::Ray;

/// 3D perspective camera
///
/// # Coordinate System
/// Right-handed, Y-up world space. The camera looks from `position` towards
/// `target`; `up` is a hint that gets orthonormalized against the view
/// direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector hint (typically [0, 1, 0])
    pub up: Vec3,

    /// Vertical field of view in radians
    pub fov: f32,

    /// Aspect ratio (width / height)
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,
}

impl Camera {
    /// Create a new perspective camera with standard Y-up orientation
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Aspect ratio (width / height) of the viewport
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    ///
    /// # Example
    /// ```rust
    /// use decal_engine::foundation::math::Vec3;
    /// use decal_engine::scene::Camera;
    ///
    /// let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 50.0, 16.0 / 9.0, 0.1, 100.0);
    /// assert!((camera.forward().z + 1.0).abs() < 1e-6);
    /// ```
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
        }
    }

    /// Update camera position in world space
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        log::trace!("Camera position updated to: {:?}", position);
    }

    /// Configure camera to look at a specific point with custom up vector
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
        log::trace!("Camera look_at updated - target: {:?}, up: {:?}", target, up);
    }

    /// Update camera aspect ratio for viewport changes
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if (self.aspect - aspect).abs() > 0.01 {
            log::debug!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect, aspect);
        }
        self.aspect = aspect;
    }

    /// Unit view direction
    pub fn forward(&self) -> Vec3 {
        let dir = self.target - self.position;
        if dir.norm_squared() <= f32::EPSILON {
            return Vec3::new(0.0, 0.0, -1.0);
        }
        dir.normalize()
    }

    /// Unit screen-right direction in world space
    pub fn right(&self) -> Vec3 {
        let forward = self.forward();
        let right = forward.cross(&self.up);
        if right.norm_squared() <= 1e-12 {
            // Up hint parallel to the view direction; pick any perpendicular
            let fallback = if forward.x.abs() < 0.9 { Vec3::x() } else { Vec3::z() };
            return fallback.cross(&forward).normalize();
        }
        right.normalize()
    }

    /// Unit screen-up direction in world space
    ///
    /// This is the camera's world up vector after orthonormalization; it is
    /// what decal orientation frames align against.
    pub fn screen_up(&self) -> Vec3 {
        self.right().cross(&self.forward()).normalize()
    }

    /// Tangent of half the vertical field of view
    pub fn half_fov_tan(&self) -> f32 {
        (self.fov * 0.5).tan()
    }

    /// Convert normalized device coordinates to a world-space ray
    ///
    /// # Arguments
    /// * `ndc_x` - -1 (left) to 1 (right)
    /// * `ndc_y` - -1 (bottom) to 1 (top)
    ///
    /// # Mathematical Process
    /// The ray passes through the point on the image plane at unit distance
    /// in front of the camera: `forward + right * x * tan * aspect + up * y * tan`.
    pub fn ray_through_ndc(&self, ndc_x: f32, ndc_y: f32) -> Ray {
        let tan = self.half_fov_tan();
        let direction = self.forward()
            + self.right() * (ndc_x * tan * self.aspect)
            + self.screen_up() * (ndc_y * tan);
        Ray::new(self.position, direction)
    }

    /// Project a world point to NDC plus view depth
    ///
    /// Returns `None` for points behind the near plane.
    pub fn project(&self, point: &Vec3) -> Option<(f32, f32, f32)> {
        let rel = point - self.position;
        let depth = rel.dot(&self.forward());
        if depth < self.near {
            return None;
        }
        let tan = self.half_fov_tan();
        let x = rel.dot(&self.right()) / (depth * tan * self.aspect);
        let y = rel.dot(&self.screen_up()) / (depth * tan);
        Some((x, y, depth))
    }
}

impl Default for Camera {
    /// Camera on the +Z axis looking at the origin, framing a model
    /// normalized to a 2-unit bounding size.
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 4.0),
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: utils::deg_to_rad(45.0),
            aspect: 16.0 / 9.0,
            near: 0.01,
            far: 100.0,
        }
    }
}

/// Drawing surface dimensions in CSS (logical) pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Width in logical pixels
    pub width: u32,
    /// Height in logical pixels
    pub height: u32,
    /// Device pixel ratio
    pub pixel_ratio: f32,
}

impl Viewport {
    /// Create a viewport with a pixel ratio of 1
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, pixel_ratio: 1.0 }
    }

    /// Width / height
    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }

    /// Convert a pointer position (logical pixels, origin top-left) to NDC
    ///
    /// NDC range: [-1, 1] where X: -1 = left, Y: -1 = bottom.
    pub fn to_ndc(&self, x: f32, y: f32) -> (f32, f32) {
        let ndc_x = x / self.width.max(1) as f32 * 2.0 - 1.0;
        let ndc_y = 1.0 - y / self.height.max(1) as f32 * 2.0;
        (ndc_x, ndc_y)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}
