//! # UV Quality Analyzer
//!
//! Decides whether a model's UV layout is good enough to paint decals
//! straight into its textures. Computed once per loaded model.
//!
//! Per mesh the analyzer sums UV-space area (shoelace) and world-space area
//! over every triangle, then derives the texel density
//! `sqrt(world_area / uv_area)`. Meshes without a UV attribute skip the area
//! pass and are flagged `NO_UVS`.

use bitflags::bitflags;
use serde::Serialize;

use crate::config::UvThresholds;
use crate::foundation::collections::MeshId;
use crate::foundation::math::{self, Vec2, Vec3};
use crate::scene::Model;

bitflags! {
    /// Problems found in a mesh's UV mapping
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct UvProblems: u8 {
        /// The mesh has no UV attribute
        const NO_UVS = 1 << 0;
        /// Some coordinate lies outside `[0, 1]`
        const UV_OUT_OF_BOUNDS = 1 << 1;
        /// Total UV area is (nearly) zero
        const UV_DEGENERATE = 1 << 2;
        /// Texel density is outside the acceptable band
        const UNIFORMITY_ISSUE = 1 << 3;
    }
}

/// UV metrics of one mesh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshUvReport {
    /// Mesh this report describes
    #[serde(skip)]
    pub mesh: Option<MeshId>,
    /// Mesh name
    pub name: String,
    /// Whether the mesh has a UV attribute
    pub has_uvs: bool,
    /// Smallest UV coordinate seen
    pub uv_min: [f32; 2],
    /// Largest UV coordinate seen
    pub uv_max: [f32; 2],
    /// Whether any coordinate left `[0, 1]`
    pub out_of_bounds: bool,
    /// Summed UV-space triangle area
    pub uv_area: f32,
    /// Summed world-space triangle area
    pub world_area: f32,
    /// `sqrt(world_area / uv_area)`; infinite for zero UV area
    pub texel_density: f32,
    /// Number of triangles analyzed
    pub triangle_count: usize,
    /// Detected problems
    pub problems: UvProblems,
}

/// Aggregate UV report for a model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UvReport {
    /// Per-mesh reports in model order
    pub meshes: Vec<MeshUvReport>,
    /// Union of every mesh's problems
    pub summary_problems: UvProblems,
    /// True when there is at least one mesh and none has a problem
    pub ok: bool,
}

impl UvReport {
    /// Report for a specific mesh
    pub fn mesh(&self, id: MeshId) -> Option<&MeshUvReport> {
        self.meshes.iter().find(|m| m.mesh == Some(id))
    }
}

/// Analyze one mesh
///
/// `positions` are expected in normalized model space so that densities are
/// comparable across models. `indices` of `None` means consecutive triples.
pub fn analyze_mesh(
    name: &str,
    positions: &[Vec3],
    uvs: Option<&[Vec2]>,
    indices: Option<&[u32]>,
    thresholds: &UvThresholds,
) -> MeshUvReport {
    let triangles: Vec<[usize; 3]> = match indices {
        Some(indices) => indices
            .chunks_exact(3)
            .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
            .collect(),
        None => (0..positions.len() / 3).map(|i| [i * 3, i * 3 + 1, i * 3 + 2]).collect(),
    };

    let mut report = MeshUvReport {
        mesh: None,
        name: name.to_string(),
        has_uvs: uvs.is_some(),
        uv_min: [0.0, 0.0],
        uv_max: [0.0, 0.0],
        out_of_bounds: false,
        uv_area: 0.0,
        world_area: 0.0,
        texel_density: 0.0,
        triangle_count: triangles.len(),
        problems: UvProblems::empty(),
    };

    let Some(uvs) = uvs else {
        report.problems |= UvProblems::NO_UVS;
        return report;
    };

    let mut min = Vec2::new(f32::INFINITY, f32::INFINITY);
    let mut max = Vec2::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
    for uv in uvs {
        min = min.inf(uv);
        max = max.sup(uv);
    }
    if uvs.is_empty() {
        min = Vec2::zeros();
        max = Vec2::zeros();
    }

    for &[a, b, c] in &triangles {
        let (Some(pa), Some(pb), Some(pc)) = (positions.get(a), positions.get(b), positions.get(c)) else {
            continue;
        };
        let (Some(ta), Some(tb), Some(tc)) = (uvs.get(a), uvs.get(b), uvs.get(c)) else {
            continue;
        };
        report.world_area += (pb - pa).cross(&(pc - pa)).norm() * 0.5;
        report.uv_area += ((tb.x - ta.x) * (tc.y - ta.y) - (tc.x - ta.x) * (tb.y - ta.y)).abs() * 0.5;
    }

    let tol = thresholds.bounds_tolerance;
    report.uv_min = [min.x, min.y];
    report.uv_max = [max.x, max.y];
    report.out_of_bounds = min.x < -tol || min.y < -tol || max.x > 1.0 + tol || max.y > 1.0 + tol;
    report.texel_density = if report.uv_area > 0.0 {
        (report.world_area / report.uv_area).sqrt()
    } else {
        f32::INFINITY
    };

    if report.out_of_bounds {
        report.problems |= UvProblems::UV_OUT_OF_BOUNDS;
    }
    if report.uv_area < thresholds.degenerate_epsilon {
        report.problems |= UvProblems::UV_DEGENERATE;
    }
    if !(thresholds.density_min..=thresholds.density_max).contains(&report.texel_density) {
        report.problems |= UvProblems::UNIFORMITY_ISSUE;
    }

    report
}

/// Analyze every mesh of a model in normalized space
pub fn analyze_model(model: &Model, thresholds: &UvThresholds) -> UvReport {
    let mut meshes = Vec::with_capacity(model.mesh_count());

    for (id, node) in model.meshes() {
        let to_model = model.mesh_to_container(id).unwrap_or_else(math::Mat4::identity);
        let positions: Vec<Vec3> = node
            .geometry
            .positions
            .iter()
            .map(|p| math::transform_point(&to_model, p))
            .collect();

        let mut report = analyze_mesh(
            &node.name,
            &positions,
            node.geometry.uvs.as_deref(),
            node.geometry.indices.as_deref(),
            thresholds,
        );
        report.mesh = Some(id);

        log::debug!(
            "UV analysis '{}': density {:.3}, problems {:?}",
            report.name,
            report.texel_density,
            report.problems
        );
        meshes.push(report);
    }

    let summary_problems = meshes.iter().fold(UvProblems::empty(), |acc, m| acc | m.problems);
    let ok = !meshes.is_empty() && summary_problems.is_empty();
    log::info!("UV report for '{}': ok = {}, problems = {:?}", model.name(), ok, summary_problems);

    UvReport { meshes, summary_problems, ok }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Material, MeshGeometry};
    use approx::assert_relative_eq;

    fn quad_positions(size: f32) -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(size, 0.0, 0.0),
            Vec3::new(size, size, 0.0),
            Vec3::new(0.0, size, 0.0),
        ]
    }

    fn full_uvs() -> Vec<Vec2> {
        vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)]
    }

    const QUAD: [u32; 6] = [0, 1, 2, 0, 2, 3];

    #[test]
    fn test_clean_quad_passes() {
        let report = analyze_mesh("quad", &quad_positions(2.0), Some(&full_uvs()), Some(&QUAD), &UvThresholds::default());
        assert!(report.problems.is_empty());
        assert_relative_eq!(report.uv_area, 1.0, epsilon = 1e-6);
        assert_relative_eq!(report.world_area, 4.0, epsilon = 1e-6);
        assert_relative_eq!(report.texel_density, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_missing_uvs_flagged() {
        let report = analyze_mesh("bare", &quad_positions(1.0), None, Some(&QUAD), &UvThresholds::default());
        assert_eq!(report.problems, UvProblems::NO_UVS);
        assert_relative_eq!(report.uv_area, 0.0);
    }

    #[test]
    fn test_out_of_bounds_flagged_with_tolerance() {
        let thresholds = UvThresholds::default();
        let mut uvs = full_uvs();
        uvs[2] = Vec2::new(1.00005, 1.0);
        let report = analyze_mesh("edge", &quad_positions(1.0), Some(&uvs), Some(&QUAD), &thresholds);
        assert!(!report.problems.contains(UvProblems::UV_OUT_OF_BOUNDS));

        uvs[2] = Vec2::new(1.5, 1.0);
        let report = analyze_mesh("tiled", &quad_positions(1.0), Some(&uvs), Some(&QUAD), &thresholds);
        assert!(report.problems.contains(UvProblems::UV_OUT_OF_BOUNDS));
    }

    #[test]
    fn test_collapsed_uvs_are_degenerate() {
        let uvs = vec![Vec2::new(0.5, 0.5); 4];
        let report = analyze_mesh("collapsed", &quad_positions(1.0), Some(&uvs), Some(&QUAD), &UvThresholds::default());
        assert!(report.problems.contains(UvProblems::UV_DEGENERATE));
        assert!(report.problems.contains(UvProblems::UNIFORMITY_ISSUE));
    }

    #[test]
    fn test_density_band() {
        // Tiny UV island over a large surface: density too high
        let uvs: Vec<Vec2> = full_uvs().into_iter().map(|uv| uv * 0.01).collect();
        let report = analyze_mesh("stretched", &quad_positions(2.0), Some(&uvs), Some(&QUAD), &UvThresholds::default());
        assert!(report.problems.contains(UvProblems::UNIFORMITY_ISSUE));
        assert!(!report.problems.contains(UvProblems::UV_DEGENERATE));
    }

    #[test]
    fn test_model_report_is_deterministic() {
        let mut builder = Model::builder("pair");
        let material = builder.add_material(Material::default());
        builder.add_mesh("good", MeshGeometry::new(quad_positions(1.0), QUAD.to_vec()).with_uvs(full_uvs()), material);
        builder.add_mesh("bare", MeshGeometry::new(quad_positions(1.0), QUAD.to_vec()), material);
        let model = builder.build(2.0).unwrap();

        let thresholds = UvThresholds::default();
        let first = analyze_model(&model, &thresholds);
        let second = analyze_model(&model, &thresholds);
        assert_eq!(first, second);
        assert!(!first.ok);
        assert_eq!(first.summary_problems, UvProblems::NO_UVS);
        assert_eq!(first.meshes.len(), 2);
        assert!(first.meshes[0].problems.is_empty());
    }
}
