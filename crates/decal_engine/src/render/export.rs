//! # Export Service
//!
//! Snapshot and asset export.
//!
//! `export_image` temporarily switches the renderer to the export pixel
//! ratio and a transparent background. The previous state is restored by a
//! guard when it goes out of scope, so a failed render never leaves the live
//! view in export mode.
//!
//! `export_asset` writes a binary glTF 2.0 container: the model meshes with
//! world transforms baked in, their materials (atlas composite or base
//! texture embedded as PNG), and every geometric decal patch as its own
//! blended, double-sided primitive.

use std::collections::HashMap;

use image::RgbaImage;
use serde_json::{json, Value};
use thiserror::Error;

use crate::assets::{image_loader, AssetError};
use crate::config::ExportSettings;
use crate::decal::Strategy;
use crate::foundation::collections::MaterialId;
use crate::foundation::color::Rgba;
use crate::foundation::math::{self, Mat3, Vec2, Vec3};
use crate::scene::{SceneController, TextureSource};
use super::{RenderError, Renderer, RendererState};

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const COMPONENT_FLOAT: u32 = 5126;
const COMPONENT_UINT: u32 = 5125;
const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;

/// Errors raised by the export service
#[derive(Error, Debug)]
pub enum ExportError {
    /// Rendering the snapshot failed
    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    /// Encoding an image failed
    #[error("Image encoding failed: {0}")]
    Encode(#[from] AssetError),

    /// Serializing the glTF document failed
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Nothing to export
    #[error("No model loaded")]
    NoModel,
}

/// Restores a renderer's saved state when dropped
struct RestoreOnDrop<'a, R: Renderer + ?Sized> {
    renderer: &'a mut R,
    saved: RendererState,
}

impl<R: Renderer + ?Sized> Drop for RestoreOnDrop<'_, R> {
    fn drop(&mut self) {
        self.renderer.set_state(self.saved);
        log::debug!("Restored renderer state {:?}", self.saved);
    }
}

/// Render a transparent snapshot of the scene at the export pixel ratio
pub fn export_image<R: Renderer + ?Sized>(
    renderer: &mut R,
    scene: &SceneController,
    settings: &ExportSettings,
) -> Result<RgbaImage, ExportError> {
    let saved = renderer.state();
    let guard = RestoreOnDrop { renderer, saved };

    let longest = saved.width.max(saved.height).max(1) as f32;
    let pixel_ratio = settings.pixel_ratio.min(settings.max_dimension as f32 / longest);
    guard.renderer.set_state(RendererState { pixel_ratio, background: None, ..saved });

    guard.renderer.render(scene)?;
    let image = guard.renderer.read_pixels()?;
    log::info!("Exported {}x{} snapshot", image.width(), image.height());
    Ok(image)
}

/// [`export_image`] encoded as PNG bytes
pub fn export_png<R: Renderer + ?Sized>(
    renderer: &mut R,
    scene: &SceneController,
    settings: &ExportSettings,
) -> Result<Vec<u8>, ExportError> {
    let image = export_image(renderer, scene, settings)?;
    Ok(image_loader::encode_png(&image)?)
}

/// Accumulates glTF JSON arrays and the shared binary buffer
#[derive(Default)]
struct GlbBuilder {
    bin: Vec<u8>,
    buffer_views: Vec<Value>,
    accessors: Vec<Value>,
    images: Vec<Value>,
    textures: Vec<Value>,
    materials: Vec<Value>,
    meshes: Vec<Value>,
    nodes: Vec<Value>,
}

impl GlbBuilder {
    fn push_view(&mut self, bytes: &[u8], target: Option<u32>) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let mut view = json!({
            "buffer": 0,
            "byteOffset": self.bin.len(),
            "byteLength": bytes.len(),
        });
        if let Some(target) = target {
            view["target"] = json!(target);
        }
        self.bin.extend_from_slice(bytes);
        self.buffer_views.push(view);
        self.buffer_views.len() - 1
    }

    fn push_vec3(&mut self, data: &[[f32; 3]], with_bounds: bool) -> usize {
        let view = self.push_view(bytemuck::cast_slice(data), Some(TARGET_ARRAY_BUFFER));
        let mut accessor = json!({
            "bufferView": view,
            "componentType": COMPONENT_FLOAT,
            "count": data.len(),
            "type": "VEC3",
        });
        if with_bounds {
            let mut min = [f32::MAX; 3];
            let mut max = [f32::MIN; 3];
            for p in data {
                for i in 0..3 {
                    min[i] = min[i].min(p[i]);
                    max[i] = max[i].max(p[i]);
                }
            }
            accessor["min"] = json!(min);
            accessor["max"] = json!(max);
        }
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    fn push_vec2(&mut self, data: &[[f32; 2]]) -> usize {
        let view = self.push_view(bytemuck::cast_slice(data), Some(TARGET_ARRAY_BUFFER));
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": COMPONENT_FLOAT,
            "count": data.len(),
            "type": "VEC2",
        }));
        self.accessors.len() - 1
    }

    fn push_indices(&mut self, indices: &[u32]) -> usize {
        let view = self.push_view(bytemuck::cast_slice(indices), Some(TARGET_ELEMENT_ARRAY_BUFFER));
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": COMPONENT_UINT,
            "count": indices.len(),
            "type": "SCALAR",
        }));
        self.accessors.len() - 1
    }

    /// Embed an image as PNG and return its texture index
    fn push_texture(&mut self, image: &RgbaImage) -> Result<usize, ExportError> {
        let png = image_loader::encode_png(image)?;
        let view = self.push_view(&png, None);
        self.images.push(json!({ "bufferView": view, "mimeType": "image/png" }));
        self.textures.push(json!({ "sampler": 0, "source": self.images.len() - 1 }));
        Ok(self.textures.len() - 1)
    }

    fn push_material(&mut self, material: Value) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    /// Add a mesh with one primitive and a node that instances it
    fn push_mesh(
        &mut self,
        name: &str,
        positions: &[[f32; 3]],
        normals: Option<&[[f32; 3]]>,
        uvs: Option<&[[f32; 2]]>,
        indices: &[u32],
        material: usize,
    ) {
        let mut attributes = json!({ "POSITION": self.push_vec3(positions, true) });
        if let Some(normals) = normals {
            attributes["NORMAL"] = json!(self.push_vec3(normals, false));
        }
        if let Some(uvs) = uvs {
            attributes["TEXCOORD_0"] = json!(self.push_vec2(uvs));
        }
        let indices = self.push_indices(indices);
        self.meshes.push(json!({
            "name": name,
            "primitives": [{ "attributes": attributes, "indices": indices, "material": material }],
        }));
        self.nodes.push(json!({ "name": name, "mesh": self.meshes.len() - 1 }));
    }

    fn finish(mut self) -> Result<Vec<u8>, ExportError> {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let node_indices: Vec<usize> = (0..self.nodes.len()).collect();
        let mut document = json!({
            "asset": { "version": "2.0", "generator": "decal_engine" },
            "scene": 0,
            "scenes": [{ "nodes": node_indices }],
            "nodes": self.nodes,
            "meshes": self.meshes,
            "materials": self.materials,
            "accessors": self.accessors,
            "bufferViews": self.buffer_views,
            "buffers": [{ "byteLength": self.bin.len() }],
        });
        if !self.textures.is_empty() {
            document["images"] = json!(self.images);
            document["textures"] = json!(self.textures);
            document["samplers"] = json!([{ "magFilter": 9729, "minFilter": 9729 }]);
        }

        let mut json_bytes = serde_json::to_vec(&document)?;
        while json_bytes.len() % 4 != 0 {
            json_bytes.push(b' ');
        }

        let total = 12 + 8 + json_bytes.len() + 8 + self.bin.len();
        let mut out = Vec::with_capacity(total);
        for word in [GLB_MAGIC, GLB_VERSION, total as u32, json_bytes.len() as u32, CHUNK_JSON] {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out.extend_from_slice(&json_bytes);
        out.extend_from_slice(&(self.bin.len() as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        out.extend_from_slice(&self.bin);
        Ok(out)
    }
}

/// glTF texture coordinates have their origin at the top-left
fn gltf_uv(uv: &Vec2) -> [f32; 2] {
    [uv.x, 1.0 - uv.y]
}

fn to_array(v: &Vec3) -> [f32; 3] {
    [v.x, v.y, v.z]
}

/// Export the model and its decals as a binary glTF container
pub fn export_asset(scene: &SceneController) -> Result<Vec<u8>, ExportError> {
    let model = scene.model().ok_or(ExportError::NoModel)?;
    let paint_atlases = scene.strategy() == Some(Strategy::UvPaint);
    let mut glb = GlbBuilder::default();

    // One glTF material per model material
    let mut materials: HashMap<MaterialId, usize> = HashMap::new();
    for (id, material) in model.materials() {
        let texture = match (scene.atlases().get(id), &material.texture) {
            (Some(atlas), _) if paint_atlases => Some(glb.push_texture(atlas.canvas())?),
            (_, TextureSource::Decoded(image)) => Some(glb.push_texture(image)?),
            _ => None,
        };
        let factor = if texture.is_some() { Rgba::WHITE.to_f32() } else { material.base_color.to_f32() };
        let mut pbr = json!({
            "baseColorFactor": factor,
            "metallicFactor": 0.0,
            "roughnessFactor": 1.0,
        });
        if let Some(texture) = texture {
            pbr["baseColorTexture"] = json!({ "index": texture });
        }
        let index = glb.push_material(json!({ "name": material.name, "pbrMetallicRoughness": pbr }));
        materials.insert(id, index);
    }

    for (mesh_id, node) in model.meshes() {
        let (Some(to_world), Some(&material)) = (model.mesh_to_world(mesh_id), materials.get(&node.material)) else {
            continue;
        };
        let geometry = &node.geometry;
        let positions: Vec<[f32; 3]> =
            geometry.positions.iter().map(|p| to_array(&math::transform_point(&to_world, p))).collect();
        let linear: Mat3 = to_world.fixed_view::<3, 3>(0, 0).into_owned();
        let normal_matrix = linear.try_inverse().map_or(linear, |inv| inv.transpose());
        let normals: Option<Vec<[f32; 3]>> = geometry.normals.as_ref().map(|normals| {
            normals
                .iter()
                .map(|n| {
                    let t = normal_matrix * n;
                    to_array(&if t.norm_squared() > 0.0 { t.normalize() } else { t })
                })
                .collect()
        });
        let uvs: Option<Vec<[f32; 2]>> = geometry.uvs.as_ref().map(|uvs| uvs.iter().map(gltf_uv).collect());
        let indices: Vec<u32> = geometry.triangles().flat_map(|t| t.map(|i| i as u32)).collect();

        glb.push_mesh(&node.name, &positions, normals.as_deref(), uvs.as_deref(), &indices, material);
    }

    let container = model.container();
    let mut decal_count = 0;
    for decal in scene.decals().iter() {
        let Some(visual) = decal.visual().and_then(|id| scene.visuals().get(id)) else {
            continue;
        };
        let texture = glb.push_texture(&visual.material.texture)?;
        let material = glb.push_material(json!({
            "name": format!("decal_{decal_count}"),
            "alphaMode": "BLEND",
            "doubleSided": true,
            "pbrMetallicRoughness": {
                "baseColorTexture": { "index": texture },
                "metallicFactor": 0.0,
                "roughnessFactor": 1.0,
            },
        }));

        let vertices = &visual.mesh.vertices;
        let positions: Vec<[f32; 3]> = vertices.iter().map(|v| to_array(&container.transform_point(&v.position))).collect();
        let normals: Vec<[f32; 3]> =
            vertices.iter().map(|v| to_array(&container.transform_direction(&v.normal).normalize())).collect();
        let uvs: Vec<[f32; 2]> = vertices.iter().map(|v| gltf_uv(&v.uv)).collect();

        glb.push_mesh(
            &format!("decal_{decal_count}"),
            &positions,
            Some(&normals),
            Some(&uvs),
            &visual.mesh.indices,
            material,
        );
        decal_count += 1;
    }

    let bytes = glb.finish()?;
    log::info!(
        "Exported GLB: {} meshes, {} decals, {} bytes",
        model.mesh_count(),
        decal_count,
        bytes.len()
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::SoftwareRenderer;

    /// Renderer whose frames always fail
    struct Failing {
        state: RendererState,
    }

    impl Renderer for Failing {
        fn state(&self) -> RendererState {
            self.state
        }
        fn set_state(&mut self, state: RendererState) {
            self.state = state;
        }
        fn render(&mut self, _scene: &SceneController) -> Result<(), RenderError> {
            Err(RenderError::InvalidSize { width: 0, height: 0 })
        }
        fn read_pixels(&self) -> Result<RgbaImage, RenderError> {
            Err(RenderError::NoFrame)
        }
    }

    #[test]
    fn test_snapshot_restores_state() {
        let scene = SceneController::default();
        let mut renderer = SoftwareRenderer::new(40, 20);
        let before = renderer.state();

        let image = export_image(&mut renderer, &scene, &ExportSettings::default()).unwrap();
        assert_eq!(image.dimensions(), (80, 40));
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0, 0]));
        assert_eq!(renderer.state(), before);
    }

    #[test]
    fn test_snapshot_restores_state_on_failure() {
        let scene = SceneController::default();
        let before = RendererState { width: 10, height: 10, pixel_ratio: 1.0, background: Some(Rgba::WHITE) };
        let mut renderer = Failing { state: before };
        assert!(export_image(&mut renderer, &scene, &ExportSettings::default()).is_err());
        assert_eq!(renderer.state(), before);
    }

    #[test]
    fn test_pixel_ratio_clamped_to_max_dimension() {
        let scene = SceneController::default();
        let mut renderer = SoftwareRenderer::new(100, 50);
        let settings = ExportSettings { pixel_ratio: 4.0, max_dimension: 200 };
        let image = export_image(&mut renderer, &scene, &settings).unwrap();
        assert_eq!(image.dimensions(), (200, 100));
    }

    #[test]
    fn test_png_bytes_have_signature() {
        let scene = SceneController::default();
        let mut renderer = SoftwareRenderer::new(8, 8);
        let png = export_png(&mut renderer, &scene, &ExportSettings::default()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_asset_without_model_fails() {
        assert!(matches!(export_asset(&SceneController::default()), Err(ExportError::NoModel)));
    }
}
