//! Snapshot and binary glTF export of decorated scenes

use approx::assert_relative_eq;
use serde_json::Value;

use super::fixtures::*;
use crate::config::ExportSettings;
use crate::foundation::color::Rgba;
use crate::foundation::math::Vec2;
use crate::render::{export_asset, export_image, Renderer, SoftwareRenderer};
use crate::scene::SceneCommand;

/// Split a GLB container into its JSON document and binary chunk
fn parse_glb(bytes: &[u8]) -> (Value, &[u8]) {
    let word = |at: usize| u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
    assert_eq!(word(0), 0x4654_6C67, "magic");
    assert_eq!(word(4), 2, "version");
    assert_eq!(word(8) as usize, bytes.len(), "declared length");

    let json_len = word(12) as usize;
    assert_eq!(word(16), 0x4E4F_534A);
    assert_eq!(json_len % 4, 0);
    let json: Value = serde_json::from_slice(&bytes[20..20 + json_len]).unwrap();

    let bin_at = 20 + json_len;
    let bin_len = word(bin_at) as usize;
    assert_eq!(word(bin_at + 4), 0x004E_4942);
    assert_eq!(bin_len % 4, 0);
    (json, &bytes[bin_at + 8..bin_at + 8 + bin_len])
}

/// Float components of an accessor
fn read_floats(doc: &Value, bin: &[u8], accessor: usize) -> Vec<f32> {
    let accessor = &doc["accessors"][accessor];
    let view = &doc["bufferViews"][accessor["bufferView"].as_u64().unwrap() as usize];
    let offset = view["byteOffset"].as_u64().unwrap() as usize;
    let length = view["byteLength"].as_u64().unwrap() as usize;
    bin[offset..offset + length]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

#[test]
fn test_geometric_export_contains_model_and_patches() {
    let mut scene = geometric_scene();
    let asset = add_text(&mut scene, "glb");
    place_at(&mut scene, asset, Vec2::zeros());
    place_at(&mut scene, asset, Vec2::new(60.0, 0.0));

    let bytes = export_asset(&scene).unwrap();
    let (doc, bin) = parse_glb(&bytes);

    assert_eq!(doc["asset"]["version"], "2.0");
    assert_eq!(doc["meshes"].as_array().unwrap().len(), 3);
    assert_eq!(doc["scenes"][0]["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(doc["buffers"][0]["byteLength"].as_u64().unwrap() as usize, bin.len());

    let position = doc["meshes"][0]["primitives"][0]["attributes"]["POSITION"].as_u64().unwrap() as usize;
    let min = doc["accessors"][position]["min"].as_array().unwrap();
    let max = doc["accessors"][position]["max"].as_array().unwrap();
    assert_relative_eq!(min[0].as_f64().unwrap(), -1.0, epsilon = 1e-5);
    assert_relative_eq!(max[1].as_f64().unwrap(), 1.0, epsilon = 1e-5);

    let decal_materials: Vec<&Value> = doc["materials"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["name"].as_str().is_some_and(|n| n.starts_with("decal_")))
        .collect();
    assert_eq!(decal_materials.len(), 2);
    for material in decal_materials {
        assert_eq!(material["alphaMode"], "BLEND");
        assert_eq!(material["doubleSided"], true);
        assert!(material["pbrMetallicRoughness"]["baseColorTexture"].is_object());
    }
    assert_eq!(doc["images"].as_array().unwrap().len(), 2);
}

#[test]
fn test_uv_paint_export_embeds_atlas_with_flipped_uvs() {
    let mut scene = paint_scene();
    let asset = add_text(&mut scene, "paint");
    place_at(&mut scene, asset, Vec2::zeros());

    let bytes = export_asset(&scene).unwrap();
    let (doc, bin) = parse_glb(&bytes);

    assert_eq!(doc["meshes"].as_array().unwrap().len(), 1);
    assert_eq!(doc["images"].as_array().unwrap().len(), 1);
    let material = &doc["materials"][0];
    assert_eq!(material["pbrMetallicRoughness"]["baseColorTexture"]["index"], 0);

    // First quad corner has uv (0, 0), stored as (0, 1)
    let texcoord = doc["meshes"][0]["primitives"][0]["attributes"]["TEXCOORD_0"].as_u64().unwrap() as usize;
    let uvs = read_floats(&doc, bin, texcoord);
    assert_eq!(uvs.len(), 8);
    assert_relative_eq!(uvs[0], 0.0);
    assert_relative_eq!(uvs[1], 1.0);
}

#[test]
fn test_untextured_material_exports_base_color() {
    let scene = geometric_scene();
    let bytes = export_asset(&scene).unwrap();
    let (doc, _) = parse_glb(&bytes);

    let pbr = &doc["materials"][0]["pbrMetallicRoughness"];
    assert!(pbr["baseColorTexture"].is_null());
    assert_eq!(pbr["baseColorFactor"].as_array().unwrap().len(), 4);
    assert!(doc.get("images").is_none());
}

#[test]
fn test_snapshot_shows_decal_on_transparent_background() {
    let mut scene = geometric_scene();
    let asset = add_text(&mut scene, "I");
    let id = place_at(&mut scene, asset, Vec2::zeros());
    scene.dispatch(SceneCommand::UpdateColor { id, color: Rgba::rgb(255, 0, 0) }).unwrap();

    let mut renderer = SoftwareRenderer::new(128, 72);
    let before = renderer.state();
    let settings = ExportSettings::default();
    let image = export_image(&mut renderer, &scene, &settings).unwrap();
    assert_eq!(renderer.state(), before);
    assert_eq!(image.dimensions(), (256, 144));

    assert_eq!(image.get_pixel(0, 0).0[3], 0);
    let [r, g, b, a] = image.get_pixel(128, 72).0;
    assert_eq!(a, 255);
    assert!(r > 200 && g < 50 && b < 50, "expected red text at center, got {:?}", [r, g, b, a]);

    scene.dispatch(SceneCommand::Delete(id)).unwrap();
    let image = export_image(&mut renderer, &scene, &settings).unwrap();
    let [r, g, b, _] = image.get_pixel(128, 72).0;
    assert_eq!(r, g);
    assert_eq!(g, b);
}
