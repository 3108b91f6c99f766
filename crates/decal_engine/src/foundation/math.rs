//! Math utilities and types
//!
//! Provides the fundamental nalgebra-backed math types used for hit testing,
//! decal projection, and export.

pub use nalgebra::{
    Vector2, Vector3,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and uniform scale
///
/// Used for the model container, which the user can spin and zoom
/// independently of the normalization applied at import.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Uniform scale factor
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: 1.0,
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with position, rotation and scale
    pub fn new(position: Vec3, rotation: Quat, scale: f32) -> Self {
        Self { position, rotation, scale }
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_scaling(self.scale)
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: &Vec3) -> Vec3 {
        self.position + self.rotation * (point * self.scale)
    }

    /// Apply the inverse of this transform to a point
    pub fn inverse_transform_point(&self, point: &Vec3) -> Vec3 {
        let inv_scale = if self.scale.abs() > f32::EPSILON { 1.0 / self.scale } else { 1.0 };
        (self.rotation.inverse() * (point - self.position)) * inv_scale
    }

    /// Rotate a direction into world space (scale does not affect directions)
    pub fn transform_direction(&self, direction: &Vec3) -> Vec3 {
        self.rotation * direction
    }

    /// Rotate a world direction back into local space
    pub fn inverse_transform_direction(&self, direction: &Vec3) -> Vec3 {
        self.rotation.inverse() * direction
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box that any point will expand
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::MAX),
            max: Vec3::repeat(f32::MIN),
        }
    }

    /// Build the tightest box around a set of points
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.expand(p);
        }
        aabb
    }

    /// Grow the box to include `point`
    pub fn expand(&mut self, point: &Vec3) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Merge another box into this one
    pub fn merge(&mut self, other: &Aabb) {
        if other.is_valid() {
            self.expand(&other.min);
            self.expand(&other.max);
        }
    }

    /// Whether at least one point has been added
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Box center
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Box extent along each axis
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Largest extent along any axis
    pub fn max_dimension(&self) -> f32 {
        let s = self.size();
        s.x.max(s.y).max(s.z)
    }
}

/// Transform a point by an affine matrix
pub fn transform_point(matrix: &Mat4, point: &Vec3) -> Vec3 {
    matrix.transform_point(&nalgebra::Point3::from(*point)).coords
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }
}
