//! # Model
//!
//! The imported model: an arena of mesh nodes, an arena of materials, a
//! normalization transform and the user-controlled container transform.
//!
//! ## Spaces
//!
//! ```text
//! mesh local --(local_transform)--> model --(normalization)--> container --(container)--> world
//! ```
//!
//! "Container space" is world space with the container transform removed.
//! Decal records store geometry in container space so that rotating or
//! zooming the model never invalidates them.

use image::RgbaImage;

use crate::assets::ImportError;
use crate::foundation::collections::{MaterialId, MeshId, OrderedSlotMap};
use crate::foundation::color::Rgba;
use crate::foundation::math::{self, Aabb, Mat3, Mat4, Transform, Vec2, Vec3};
use super::ray::Triangle;

/// Vertex data of one mesh node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshGeometry {
    /// Vertex positions in mesh-local space
    pub positions: Vec<Vec3>,
    /// Optional per-vertex normals
    pub normals: Option<Vec<Vec3>>,
    /// Optional per-vertex texture coordinates
    pub uvs: Option<Vec<Vec2>>,
    /// Triangle list indices; `None` means consecutive vertex triples
    pub indices: Option<Vec<u32>>,
}

impl MeshGeometry {
    /// Create indexed geometry without normals or UVs
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self { positions, normals: None, uvs: None, indices: Some(indices) }
    }

    /// Attach texture coordinates
    #[must_use]
    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    /// Attach vertex normals
    #[must_use]
    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = Some(normals);
        self
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        match &self.indices {
            Some(indices) => indices.len() / 3,
            None => self.positions.len() / 3,
        }
    }

    /// Vertex indices of triangle `i`
    pub fn triangle(&self, i: usize) -> Option<[usize; 3]> {
        if i >= self.triangle_count() {
            return None;
        }
        Some(match &self.indices {
            Some(indices) => [
                indices[i * 3] as usize,
                indices[i * 3 + 1] as usize,
                indices[i * 3 + 2] as usize,
            ],
            None => [i * 3, i * 3 + 1, i * 3 + 2],
        })
    }

    /// Iterate all triangles as vertex index triples
    pub fn triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        (0..self.triangle_count()).filter_map(move |i| self.triangle(i))
    }

    /// Check that every attribute and index refers to existing vertices
    pub fn validate(&self) -> Result<(), ImportError> {
        let count = self.positions.len();
        if let Some(uvs) = &self.uvs {
            if uvs.len() != count {
                return Err(ImportError::InvalidGeometry(format!(
                    "{} uvs for {} positions", uvs.len(), count
                )));
            }
        }
        if let Some(normals) = &self.normals {
            if normals.len() != count {
                return Err(ImportError::InvalidGeometry(format!(
                    "{} normals for {} positions", normals.len(), count
                )));
            }
        }
        if let Some(indices) = &self.indices {
            if indices.len() % 3 != 0 {
                return Err(ImportError::InvalidGeometry("index count is not a multiple of 3".to_string()));
            }
            if let Some(bad) = indices.iter().find(|&&i| i as usize >= count) {
                return Err(ImportError::InvalidGeometry(format!("index {bad} out of range")));
            }
        }
        Ok(())
    }
}

/// One drawable node of the model
#[derive(Debug, Clone)]
pub struct MeshNode {
    /// Node name from the source file
    pub name: String,
    /// Vertex data
    pub geometry: MeshGeometry,
    /// Material used by every triangle of this node
    pub material: MaterialId,
    /// Node transform relative to the model root
    pub local_transform: Mat4,
    /// Bounds in container space, filled in when the model is built
    pub container_bounds: Aabb,
}

/// Base color texture of a material
#[derive(Debug, Clone, Default)]
pub enum TextureSource {
    /// The material has no texture
    #[default]
    None,
    /// Decoded texture pixels
    Decoded(RgbaImage),
    /// The material names a texture that could not be read or decoded
    Unavailable(String),
}

/// Surface material
#[derive(Debug, Clone)]
pub struct Material {
    /// Material name
    pub name: String,
    /// Base color factor
    pub base_color: Rgba,
    /// Base color texture
    pub texture: TextureSource,
}

impl Material {
    /// Untextured material with the given base color
    pub fn new(name: impl Into<String>, base_color: Rgba) -> Self {
        Self { name: name.into(), base_color, texture: TextureSource::None }
    }

    /// Attach a decoded texture
    #[must_use]
    pub fn with_texture(mut self, texture: RgbaImage) -> Self {
        self.texture = TextureSource::Decoded(texture);
        self
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new("default", Rgba::WHITE)
    }
}

/// Incrementally assembles a [`Model`]
#[derive(Debug, Default)]
pub struct ModelBuilder {
    name: String,
    meshes: OrderedSlotMap<MeshId, MeshNode>,
    materials: OrderedSlotMap<MaterialId, Material>,
}

impl ModelBuilder {
    /// Start a new model
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Add a material and return its id
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.insert(material)
    }

    /// Add a mesh node with an identity local transform
    pub fn add_mesh(&mut self, name: impl Into<String>, geometry: MeshGeometry, material: MaterialId) -> MeshId {
        self.add_mesh_with_transform(name, geometry, material, Mat4::identity())
    }

    /// Add a mesh node with an explicit local transform
    pub fn add_mesh_with_transform(
        &mut self,
        name: impl Into<String>,
        geometry: MeshGeometry,
        material: MaterialId,
        local_transform: Mat4,
    ) -> MeshId {
        self.meshes.insert(MeshNode {
            name: name.into(),
            geometry,
            material,
            local_transform,
            container_bounds: Aabb::empty(),
        })
    }

    /// Number of meshes added so far
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Validate, normalize, and produce the model
    ///
    /// The normalization uniformly scales the model so its largest bounding
    /// dimension equals `target_size` and recenters it on the origin.
    pub fn build(mut self, target_size: f32) -> Result<Model, ImportError> {
        let mut raw_bounds = Aabb::empty();
        let mut triangle_total = 0;

        for (_, node) in self.meshes.iter() {
            node.geometry.validate()?;
            if !self.materials.contains_key(node.material) {
                return Err(ImportError::InvalidGeometry(format!(
                    "mesh '{}' references an unknown material", node.name
                )));
            }
            triangle_total += node.geometry.triangle_count();
            for p in &node.geometry.positions {
                raw_bounds.expand(&math::transform_point(&node.local_transform, p));
            }
        }

        if triangle_total == 0 || !raw_bounds.is_valid() {
            return Err(ImportError::EmptyModel);
        }

        let max_dim = raw_bounds.max_dimension();
        let scale = if max_dim > f32::EPSILON { target_size / max_dim } else { 1.0 };
        let normalization = Mat4::new_scaling(scale) * Mat4::new_translation(&(-raw_bounds.center()));

        let keys: Vec<MeshId> = self.meshes.keys().collect();
        let mut bounds = Aabb::empty();
        for key in keys {
            if let Some(node) = self.meshes.get_mut(key) {
                let to_container = normalization * node.local_transform;
                node.container_bounds = Aabb::from_points(
                    node.geometry
                        .positions
                        .iter()
                        .map(|p| math::transform_point(&to_container, p))
                        .collect::<Vec<_>>()
                        .iter(),
                );
                bounds.merge(&node.container_bounds);
            }
        }

        log::info!(
            "Built model '{}': {} meshes, {} materials, {} triangles, scale {:.4}",
            self.name,
            self.meshes.len(),
            self.materials.len(),
            triangle_total,
            scale
        );

        Ok(Model {
            name: self.name,
            meshes: self.meshes,
            materials: self.materials,
            normalization,
            bounds,
            container: Transform::identity(),
        })
    }
}

/// The loaded model
#[derive(Debug)]
pub struct Model {
    name: String,
    meshes: OrderedSlotMap<MeshId, MeshNode>,
    materials: OrderedSlotMap<MaterialId, Material>,
    normalization: Mat4,
    bounds: Aabb,
    container: Transform,
}

impl Model {
    /// Start building a model
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder::new(name)
    }

    /// Model name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mesh nodes in import order
    pub fn meshes(&self) -> impl Iterator<Item = (MeshId, &MeshNode)> + '_ {
        self.meshes.iter()
    }

    /// Look up a mesh node
    pub fn mesh(&self, id: MeshId) -> Option<&MeshNode> {
        self.meshes.get(id)
    }

    /// Number of mesh nodes
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Materials in import order
    pub fn materials(&self) -> impl Iterator<Item = (MaterialId, &Material)> + '_ {
        self.materials.iter()
    }

    /// Look up a material
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    /// Materials actually referenced by at least one mesh, deduplicated
    pub fn used_materials(&self) -> Vec<MaterialId> {
        let mut used = Vec::new();
        for (_, node) in self.meshes.iter() {
            if !used.contains(&node.material) {
                used.push(node.material);
            }
        }
        used
    }

    /// Normalized bounds in container space
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Model-root to container matrix
    pub fn normalization(&self) -> &Mat4 {
        &self.normalization
    }

    /// Current container transform
    pub fn container(&self) -> &Transform {
        &self.container
    }

    /// Replace the container transform (user rotate/zoom)
    pub fn set_container(&mut self, container: Transform) {
        log::debug!("Container transform set: {:?}", container);
        self.container = container;
    }

    /// Mesh-local to container matrix
    pub fn mesh_to_container(&self, id: MeshId) -> Option<Mat4> {
        self.meshes.get(id).map(|node| self.normalization * node.local_transform)
    }

    /// Mesh-local to world matrix
    pub fn mesh_to_world(&self, id: MeshId) -> Option<Mat4> {
        self.mesh_to_container(id).map(|m| self.container.to_matrix() * m)
    }

    /// Container to world for a point
    pub fn container_to_world_point(&self, point: &Vec3) -> Vec3 {
        self.container.transform_point(point)
    }

    /// World to container for a point
    pub fn world_to_container_point(&self, point: &Vec3) -> Vec3 {
        self.container.inverse_transform_point(point)
    }

    /// Container to world for a unit direction (result renormalized)
    pub fn container_to_world_direction(&self, direction: &Vec3) -> Vec3 {
        self.container.transform_direction(direction).normalize()
    }

    /// World to container for a unit direction (result renormalized)
    pub fn world_to_container_direction(&self, direction: &Vec3) -> Vec3 {
        self.container.inverse_transform_direction(direction).normalize()
    }

    /// Triangle `index` of mesh `id` in container space
    pub fn container_triangle(&self, id: MeshId, index: usize) -> Option<Triangle> {
        let node = self.meshes.get(id)?;
        let m = self.normalization * node.local_transform;
        let [a, b, c] = node.geometry.triangle(index)?;
        let p = &node.geometry.positions;
        Some(Triangle::new(
            math::transform_point(&m, &p[a]),
            math::transform_point(&m, &p[b]),
            math::transform_point(&m, &p[c]),
        ))
    }

    /// Every triangle of mesh `id` in container space, paired with its vertex indices
    pub fn container_triangles(&self, id: MeshId) -> Vec<([usize; 3], Triangle)> {
        let Some(node) = self.meshes.get(id) else {
            return Vec::new();
        };
        let m = self.normalization * node.local_transform;
        let transformed: Vec<Vec3> = node
            .geometry
            .positions
            .iter()
            .map(|p| math::transform_point(&m, p))
            .collect();
        node.geometry
            .triangles()
            .map(|[a, b, c]| ([a, b, c], Triangle::new(transformed[a], transformed[b], transformed[c])))
            .collect()
    }

    /// Vertex normals of mesh `id` in container space, if present
    pub fn container_normals(&self, id: MeshId) -> Option<Vec<Vec3>> {
        let node = self.meshes.get(id)?;
        let normals = node.geometry.normals.as_ref()?;
        let m = self.normalization * node.local_transform;
        let linear: Mat3 = m.fixed_view::<3, 3>(0, 0).into_owned();
        let normal_matrix = linear.try_inverse().map_or(linear, |inv| inv.transpose());
        Some(
            normals
                .iter()
                .map(|n| {
                    let t = normal_matrix * n;
                    if t.norm_squared() > 0.0 { t.normalize() } else { t }
                })
                .collect(),
        )
    }
}
