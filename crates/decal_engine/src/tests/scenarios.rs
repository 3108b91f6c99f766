//! Model load, UV gate, and uv-paint placement scenarios

use approx::assert_relative_eq;
use image::RgbaImage;

use super::fixtures::*;
use crate::decal::{Strategy, UvProblems};
use crate::foundation::math::Vec2;
use crate::scene::{CommandOutcome, SceneCommand, SceneError, SceneEvent, StrategyState};

/// Bounding box and centroid of the pixels where `canvas` differs from `base`
fn ink(canvas: &RgbaImage, base: &RgbaImage) -> Option<([u32; 4], Vec2)> {
    let mut bounds = [u32::MAX, u32::MAX, 0, 0];
    let mut sum = Vec2::zeros();
    let mut count = 0.0;
    for (x, y, pixel) in canvas.enumerate_pixels() {
        if pixel == base.get_pixel(x, y) {
            continue;
        }
        bounds = [bounds[0].min(x), bounds[1].min(y), bounds[2].max(x), bounds[3].max(y)];
        sum += Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
        count += 1.0;
    }
    (count > 0.0).then(|| (bounds, sum / count))
}

#[test]
fn test_trusted_uvs_select_uv_paint() {
    // 2 x 0.5 quad with full-range UVs: world area equals UV area
    let mut scene = scene_with(small_config(), quad_model(2.0, 0.5, true));

    let report = scene.uv_report().expect("report");
    assert!(report.ok);
    assert!(report.summary_problems.is_empty());
    assert_relative_eq!(report.meshes[0].texel_density, 1.0, epsilon = 1e-4);
    assert_eq!(scene.strategy_state(), StrategyState::Selected(Strategy::UvPaint));

    let events = scene.drain_events();
    let Some(SceneEvent::ModelReady { name, mesh_count, materials, bounds }) =
        events.iter().find(|e| matches!(e, SceneEvent::ModelReady { .. }))
    else {
        panic!("no ModelReady in {events:?}");
    };
    assert_eq!(name, "quad");
    assert_eq!(*mesh_count, 1);
    let model = scene.model().expect("model");
    let expected: Vec<_> = model.materials().map(|(id, m)| (id, m.name.clone())).collect();
    assert_eq!(materials, &expected);
    assert_eq!(materials[0].1, "default");
    assert_relative_eq!(bounds.max_dimension(), 2.0, epsilon = 1e-4);
    assert_relative_eq!(bounds.size().y, 0.5, epsilon = 1e-4);
    assert!(events.iter().any(|e| matches!(e, SceneEvent::UvReportReady { needs_decision: false, .. })));
    assert!(events.contains(&SceneEvent::StrategySelected(Strategy::UvPaint)));
    assert!(events.iter().any(|e| matches!(e, SceneEvent::AtlasDirty(_))));
}

#[test]
fn test_missing_uvs_open_gate_and_reject_clears_everything() {
    let mut scene = scene_with(small_config(), quad_model(2.0, 2.0, false));
    let asset = add_text(&mut scene, "logo");

    let report = scene.uv_report().expect("report");
    assert!(!report.ok);
    assert_eq!(report.summary_problems, UvProblems::NO_UVS);
    assert_eq!(scene.strategy_state(), StrategyState::AwaitingDecision);
    assert!(scene
        .drain_events()
        .iter()
        .any(|e| matches!(e, SceneEvent::UvReportReady { needs_decision: true, .. })));

    let pointer = center(&scene);
    assert!(matches!(
        scene.dispatch(SceneCommand::Place { asset, pointer }),
        Err(SceneError::AwaitingUvDecision)
    ));

    scene.dispatch(SceneCommand::ResolveUvGate { accept: false }).unwrap();
    assert!(scene.model().is_none());
    assert!(scene.decals().is_empty());
    assert!(scene.assets().is_empty());
    assert!(scene.atlases().is_empty());
    assert_eq!(scene.strategy_state(), StrategyState::NoModel);

    let events = scene.drain_events();
    assert!(events.contains(&SceneEvent::ModelCleared));
    assert!(events.contains(&SceneEvent::AssetsCleared));
}

#[test]
fn test_strategy_override_skips_gate() {
    let mut scene = scene_with(small_config(), quad_model(2.0, 2.0, true));
    scene
        .dispatch(SceneCommand::LoadModel {
            source: crate::scene::ModelSource::Built(quad_model(2.0, 2.0, true)),
            strategy: Some(Strategy::Geometric),
        })
        .unwrap();
    assert_eq!(scene.strategy(), Some(Strategy::Geometric));
}

#[test]
fn test_failed_import_keeps_previous_model() {
    let mut scene = paint_scene();
    let asset = add_text(&mut scene, "keep");
    let id = place_at(&mut scene, asset, Vec2::zeros());

    let broken = crate::assets::ObjSource::new("broken", "v 0 0 0\nf 1 2 3\n");
    let result = scene.dispatch(SceneCommand::LoadModel {
        source: crate::scene::ModelSource::Obj(broken),
        strategy: None,
    });
    assert!(matches!(result, Err(SceneError::Import(_))));
    assert_eq!(scene.model().map(|m| m.name()), Some("quad"));
    assert!(scene.decals().contains(id));
}

#[test]
fn test_text_paint_centered_on_atlas_and_rotation_keeps_center() {
    let mut config = small_config();
    config.atlas.blank_size = 4096;
    config.canvas.resolution = 512;
    config.decal_defaults.uv_paint_size = 512.0;
    let mut scene = scene_with(config, quad_model(2.0, 2.0, true));
    let asset = add_text(&mut scene, "Hi");

    let id = place_at(&mut scene, asset, Vec2::zeros());
    let pixel = paint_pixel(&scene, id);
    assert_relative_eq!(pixel.x, 2048.0, epsilon = 1.0);
    assert_relative_eq!(pixel.y, 2048.0, epsilon = 1.0);

    let material = scene.decals().get(id).and_then(|d| d.material()).expect("painted");
    let atlas = scene.atlases().get(material).expect("atlas");
    let (bounds, centroid) = ink(atlas.canvas(), atlas.base()).expect("text painted");
    assert!(bounds[0] >= 2048 - 256 && bounds[2] < 2048 + 256);
    assert!(bounds[1] >= 2048 - 256 && bounds[3] < 2048 + 256);
    assert_relative_eq!(centroid, Vec2::new(2048.0, 2048.0), epsilon = 3.0);
    let wide = bounds[2] - bounds[0] > bounds[3] - bounds[1];
    assert!(wide);

    let version = atlas.handle().version;
    let outcome = scene.dispatch(SceneCommand::SetRotation { id, degrees: 90.0 }).unwrap();
    assert_eq!(outcome, CommandOutcome::Updated(id));
    assert_relative_eq!(scene.decals().get(id).unwrap().rotation_deg, 90.0);
    assert_eq!(paint_pixel(&scene, id), pixel);

    let atlas = scene.atlases().get(material).expect("atlas");
    assert_eq!(atlas.handle().version, version + 1);
    let (bounds, centroid) = ink(atlas.canvas(), atlas.base()).expect("text painted");
    assert_relative_eq!(centroid, Vec2::new(2048.0, 2048.0), epsilon = 3.0);
    let tall = bounds[3] - bounds[1] > bounds[2] - bounds[0];
    assert!(tall);
}
