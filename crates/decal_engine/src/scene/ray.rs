//! Rays and triangle intersection
//!
//! Provides the pointer ray and the Möller-Trumbore ray-triangle test used
//! for surface picking and for sampling the model under the cursor.

use crate::foundation::math::Vec3;

/// A ray for ray casting and picking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// The origin point of the ray
    pub origin: Vec3,
    /// The direction of the ray (normalized on construction)
    pub direction: Vec3,
}

impl Ray {
    /// Creates a new ray with the given origin and direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        let direction = if direction.norm_squared() > 0.0 {
            direction.normalize()
        } else {
            Vec3::new(0.0, 0.0, -1.0)
        };
        Self { origin, direction }
    }

    /// Get a point along the ray at distance t
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Barycentric intersection of a ray with one triangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    /// Distance along the ray
    pub t: f32,
    /// Weight of the second vertex
    pub u: f32,
    /// Weight of the third vertex
    pub v: f32,
}

impl TriangleHit {
    /// Barycentric weights for (v0, v1, v2)
    pub fn weights(&self) -> [f32; 3] {
        [1.0 - self.u - self.v, self.u, self.v]
    }
}

/// A triangle in an arbitrary but consistent space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// First vertex
    pub v0: Vec3,
    /// Second vertex
    pub v1: Vec3,
    /// Third vertex
    pub v2: Vec3,
}

impl Triangle {
    /// Creates a new triangle
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    /// Unnormalized face normal (right-hand rule); its length is twice the area
    pub fn scaled_normal(&self) -> Vec3 {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0))
    }

    /// Unit face normal, or `None` for degenerate triangles
    pub fn normal(&self) -> Option<Vec3> {
        let n = self.scaled_normal();
        let len = n.norm();
        (len > 1e-12).then(|| n / len)
    }

    /// Surface area
    pub fn area(&self) -> f32 {
        self.scaled_normal().norm() * 0.5
    }

    /// Calculates the centroid (center point) of the triangle
    pub fn centroid(&self) -> Vec3 {
        (self.v0 + self.v1 + self.v2) / 3.0
    }

    /// Möller-Trumbore ray-triangle intersection
    ///
    /// Double sided: hits are reported regardless of winding. Returns `None`
    /// when the ray is parallel, misses, or the hit lies behind the origin.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<TriangleHit> {
        const EPSILON: f32 = 1e-7;

        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;

        let h = ray.direction.cross(&edge2);
        let a = edge1.dot(&h);

        // Ray parallel to triangle
        if a.abs() < EPSILON {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * s.dot(&h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(&edge1);
        let v = f * ray.direction.dot(&q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(&q);
        (t > EPSILON).then_some(TriangleHit { t, u, v })
    }
}

/// Ray-sphere early-out test used before walking a mesh's triangles
pub fn ray_hits_sphere(ray: &Ray, center: &Vec3, radius: f32) -> bool {
    let oc = ray.origin - center;
    let b = oc.dot(&ray.direction);
    let c = oc.dot(&oc) - radius * radius;
    // Origin inside the sphere always hits
    if c <= 0.0 {
        return true;
    }
    b <= 0.0 && b * b - c >= 0.0
}
