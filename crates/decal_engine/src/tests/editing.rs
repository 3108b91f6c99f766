//! Editing, deletion, and re-derivation of placed decals

use approx::assert_relative_eq;
use image::RgbaImage;

use super::fixtures::*;
use crate::assets::{image_loader, ObjSource};
use crate::decal::{DecalKind, Placement, Strategy};
use crate::foundation::color::Rgba;
use crate::foundation::math::{Quat, Transform, Vec2, Vec3};
use crate::scene::{CommandOutcome, ModelSource, NewAsset, SceneCommand, SceneEvent, SceneController};

const QUAD_OBJ: &str = "\
v -1 -1 0
v 1 -1 0
v 1 1 0
v -1 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

fn atlas_canvas(scene: &SceneController) -> (RgbaImage, RgbaImage) {
    let (_, atlas) = scene.atlases().iter().next().expect("one atlas");
    (atlas.canvas().clone(), atlas.base().clone())
}

fn atlas_version(scene: &SceneController) -> u64 {
    let (_, atlas) = scene.atlases().iter().next().expect("one atlas");
    atlas.handle().version
}

#[test]
fn test_rotation_round_trip_restores_patch() {
    let mut scene = geometric_scene();
    let asset = add_text(&mut scene, "spin");
    let id = place_at(&mut scene, asset, Vec2::zeros());
    let visual = scene.decals().get(id).and_then(|d| d.visual()).expect("geometric visual");
    let original = scene.visuals().get(visual).expect("visual").mesh.clone();

    scene.dispatch(SceneCommand::SetRotation { id, degrees: 30.0 }).unwrap();
    assert_ne!(scene.visuals().get(visual).unwrap().mesh, original);

    scene.dispatch(SceneCommand::SetRotation { id, degrees: 0.0 }).unwrap();
    assert_eq!(scene.decals().get(id).unwrap().visual(), Some(visual));
    assert_eq!(scene.visuals().get(visual).unwrap().mesh, original);
    assert_eq!(scene.visuals().len(), 1);
}

#[test]
fn test_same_size_repaints_identically() {
    let mut scene = paint_scene();
    let asset = add_text(&mut scene, "ab");
    let id = place_at(&mut scene, asset, Vec2::zeros());
    let (before, base) = atlas_canvas(&scene);
    assert_ne!(before, base);
    let version = atlas_version(&scene);

    let size = scene.decals().get(id).unwrap().size;
    let outcome = scene.dispatch(SceneCommand::SetSize { id, size }).unwrap();
    assert_eq!(outcome, CommandOutcome::Updated(id));
    assert_eq!(atlas_canvas(&scene).0, before);
    assert_eq!(atlas_version(&scene), version + 1);
}

#[test]
fn test_invalid_edits_leave_record_untouched() {
    let mut scene = paint_scene();
    let asset = add_text(&mut scene, "x");
    let id = place_at(&mut scene, asset, Vec2::zeros());
    let record = scene.decals().get(id).cloned();

    assert!(scene.dispatch(SceneCommand::SetSize { id, size: -4.0 }).is_err());
    assert!(scene.dispatch(SceneCommand::SetSize { id, size: f32::NAN }).is_err());
    assert_eq!(
        scene.dispatch(SceneCommand::SetRotation { id, degrees: f32::INFINITY }).unwrap(),
        CommandOutcome::NoOp
    );
    assert_eq!(scene.decals().get(id).cloned(), record);
}

#[test]
fn test_remove_asset_cascades_to_its_decals() {
    let mut scene = paint_scene();
    let doomed = add_text(&mut scene, "a");
    let kept = add_text(&mut scene, "b");
    let pointer = center(&scene);
    let first = place(&mut scene, doomed, pointer);
    let second = place(&mut scene, doomed, pointer + Vec2::new(30.0, 0.0));
    let survivor = place(&mut scene, kept, pointer - Vec2::new(30.0, 0.0));
    scene.drain_events();

    let outcome = scene.dispatch(SceneCommand::RemoveAsset(doomed)).unwrap();
    assert_eq!(outcome, CommandOutcome::Removed(2));
    assert!(!scene.assets().contains(doomed));
    assert_eq!(scene.decals().len(), 1);
    assert!(scene.decals().contains(survivor));

    let events = scene.drain_events();
    assert!(events.contains(&SceneEvent::DecalRemoved(first)));
    assert!(events.contains(&SceneEvent::DecalRemoved(second)));
    assert!(events.contains(&SceneEvent::AssetRemoved(doomed)));

    assert_eq!(scene.dispatch(SceneCommand::RemoveAsset(doomed)).unwrap(), CommandOutcome::NoOp);
}

#[test]
fn test_delete_restores_atlas() {
    let mut scene = paint_scene();
    let asset = add_text(&mut scene, "gone");
    let id = place_at(&mut scene, asset, Vec2::zeros());

    assert_eq!(scene.dispatch(SceneCommand::Delete(id)).unwrap(), CommandOutcome::Removed(1));
    let (canvas, base) = atlas_canvas(&scene);
    assert_eq!(canvas, base);
    assert!(scene.canvas(id).is_none());
    assert!(scene.assets().contains(asset));

    assert_eq!(scene.dispatch(SceneCommand::Delete(id)).unwrap(), CommandOutcome::NoOp);
}

#[test]
fn test_clear_all_resets_atlases_and_visuals() {
    let mut scene = paint_scene();
    let asset = add_text(&mut scene, "one");
    place_at(&mut scene, asset, Vec2::zeros());
    place_at(&mut scene, asset, Vec2::new(0.0, 40.0));

    assert_eq!(scene.dispatch(SceneCommand::ClearAll).unwrap(), CommandOutcome::Removed(2));
    assert!(scene.decals().is_empty());
    let (canvas, base) = atlas_canvas(&scene);
    assert_eq!(canvas, base);
    assert_eq!(scene.assets().len(), 1);

    let mut scene = geometric_scene();
    let asset = add_text(&mut scene, "one");
    place_at(&mut scene, asset, Vec2::zeros());
    scene.dispatch(SceneCommand::ClearAll).unwrap();
    assert!(scene.visuals().is_empty());
}

#[test]
fn test_records_live_in_container_space() {
    let mut scene = geometric_scene();
    scene
        .dispatch(SceneCommand::SetContainerTransform(Transform::new(
            Vec3::new(0.5, 0.0, 0.0),
            Quat::identity(),
            1.0,
        )))
        .unwrap();
    let asset = add_text(&mut scene, "shifted");
    let id = place_at(&mut scene, asset, Vec2::zeros());

    let Some(Placement::Geometric { point, .. }) = scene.decals().get(id).map(|d| &d.placement) else {
        panic!("expected a geometric record");
    };
    assert_relative_eq!(point.x, -0.5, epsilon = 1e-4);
    assert_relative_eq!(point.y, 0.0, epsilon = 1e-4);
}

#[test]
fn test_geometric_move_reuses_visual() {
    let mut scene = geometric_scene();
    let asset = add_text(&mut scene, "drag");
    let id = place_at(&mut scene, asset, Vec2::zeros());
    let visual = scene.decals().get(id).and_then(|d| d.visual());

    let target = center(&scene) + Vec2::new(40.0, -20.0);
    let outcome = scene.dispatch(SceneCommand::Move { id, pointer: target }).unwrap();
    assert_eq!(outcome, CommandOutcome::Updated(id));

    let decal = scene.decals().get(id).unwrap();
    assert_eq!(decal.visual(), visual);
    assert_eq!(scene.visuals().len(), 1);
    let expected = hit_at(&scene, target).point;
    let Placement::Geometric { point, .. } = &decal.placement else {
        panic!("strategy changed");
    };
    assert_relative_eq!(*point, expected, epsilon = 1e-4);

    // Missing the model leaves the decal in place
    let before = scene.decals().get(id).cloned();
    let outcome = scene.dispatch(SceneCommand::Move { id, pointer: Vec2::new(1.0, 1.0) }).unwrap();
    assert_eq!(outcome, CommandOutcome::NoOp);
    assert_eq!(scene.decals().get(id).cloned(), before);
}

#[test]
fn test_uv_paint_moves_leave_no_trail() {
    let mut scene = paint_scene();
    let asset = add_text(&mut scene, "trail");
    let id = place_at(&mut scene, asset, Vec2::zeros());
    let start = paint_pixel(&scene, id);
    let (x, y) = (start.x as u32, start.y as u32);
    // Stamp footprint around the first placement
    let footprint = |canvas: &RgbaImage| {
        let mut pixels = Vec::new();
        for py in y - 15..=y + 15 {
            for px in x - 15..=x + 15 {
                pixels.push(*canvas.get_pixel(px, py));
            }
        }
        pixels
    };
    let (canvas, base) = atlas_canvas(&scene);
    assert_ne!(footprint(&canvas), footprint(&base));

    for offset in [Vec2::new(100.0, 0.0), Vec2::new(-90.0, 60.0), Vec2::new(80.0, -70.0)] {
        let pointer = center(&scene) + offset;
        let outcome = scene.dispatch(SceneCommand::Move { id, pointer }).unwrap();
        assert_eq!(outcome, CommandOutcome::Updated(id));
    }
    assert!((paint_pixel(&scene, id) - start).norm() > 32.0);

    let (canvas, base) = atlas_canvas(&scene);
    assert_eq!(footprint(&canvas), footprint(&base));
    assert_ne!(canvas, base);
}

#[test]
fn test_repeated_rotation_paints_identical_atlas() {
    let mut scene = paint_scene();
    let asset = add_text(&mut scene, "tilt");
    let id = place_at(&mut scene, asset, Vec2::zeros());

    scene.dispatch(SceneCommand::SetRotation { id, degrees: 45.0 }).unwrap();
    let (first, _) = atlas_canvas(&scene);
    scene.dispatch(SceneCommand::SetRotation { id, degrees: 45.0 }).unwrap();
    let (second, _) = atlas_canvas(&scene);
    assert_eq!(first.as_raw(), second.as_raw());
}

#[test]
fn test_text_edits_rerender_canvas() {
    let mut scene = geometric_scene();
    let asset = add_text(&mut scene, "old");
    let id = place_at(&mut scene, asset, Vec2::zeros());
    let before = scene.canvas(id).cloned().expect("canvas cached");

    let outcome = scene.dispatch(SceneCommand::UpdateText { id, text: "newer".to_string() }).unwrap();
    assert_eq!(outcome, CommandOutcome::Updated(id));
    let after = scene.canvas(id).cloned().unwrap();
    assert_ne!(after, before);
    let visual = scene.decals().get(id).and_then(|d| d.visual()).unwrap();
    assert_eq!(scene.visuals().get(visual).unwrap().material.texture, after);

    let red = Rgba::rgb(255, 0, 0);
    scene.dispatch(SceneCommand::UpdateColor { id, color: red }).unwrap();
    let canvas = scene.canvas(id).unwrap();
    assert!(canvas.pixels().any(|p| p.0 == red.to_array()));
    let summary = scene.summary(id).unwrap();
    assert_eq!(summary.text.as_deref(), Some("newer"));
    assert_eq!(summary.color, Some(red));
    assert_eq!(summary.strategy, Strategy::Geometric);
}

#[test]
fn test_text_only_edits_skip_logos() {
    let mut scene = paint_scene();
    let outcome = scene.dispatch(SceneCommand::AddAsset(NewAsset::PendingLogo { name: "logo.png".into() })).unwrap();
    let CommandOutcome::AssetAdded(asset) = outcome else {
        panic!("asset not added");
    };
    let id = place_at(&mut scene, asset, Vec2::zeros());

    assert_eq!(
        scene.dispatch(SceneCommand::UpdateText { id, text: "nope".into() }).unwrap(),
        CommandOutcome::NoOp
    );
    assert_eq!(
        scene.dispatch(SceneCommand::UpdateFont { id, family: "serif".into() }).unwrap(),
        CommandOutcome::NoOp
    );
    assert!(matches!(
        scene.decals().get(id).map(|d| &d.content.kind),
        Some(DecalKind::Logo { tint: None })
    ));
}

#[test]
fn test_pending_logo_completes_in_place() {
    let mut scene = paint_scene();
    let outcome = scene.dispatch(SceneCommand::AddAsset(NewAsset::PendingLogo { name: "logo.png".into() })).unwrap();
    let CommandOutcome::AssetAdded(asset) = outcome else {
        panic!("asset not added");
    };
    let id = place_at(&mut scene, asset, Vec2::zeros());
    let pixel = paint_pixel(&scene, id);
    let (x, y) = (pixel.x as u32, pixel.y as u32);

    let (canvas, _) = atlas_canvas(&scene);
    assert_eq!(canvas.get_pixel(x, y).0, Rgba::PLACEHOLDER_GRAY.to_array());
    scene.drain_events();

    let red = image_loader::solid_color(8, 8, Rgba::rgb(255, 0, 0));
    let bytes = image_loader::encode_png(&red).unwrap();
    assert!(scene.complete_logo(asset, &bytes).unwrap());

    let (canvas, _) = atlas_canvas(&scene);
    assert_eq!(canvas.get_pixel(x, y).0, [255, 0, 0, 255]);
    let events = scene.drain_events();
    assert!(events.iter().any(|e| matches!(e, SceneEvent::DecalUpdated(s) if s.id == id)));
    assert!(events.iter().any(|e| matches!(e, SceneEvent::AtlasDirty(_))));
}

#[test]
fn test_obj_reload_replaces_model_and_decals() {
    let mut scene = geometric_scene();
    let asset = add_text(&mut scene, "survives");
    let old = place_at(&mut scene, asset, Vec2::zeros());

    let outcome = scene
        .dispatch(SceneCommand::LoadModel {
            source: ModelSource::Obj(ObjSource::new("panel", QUAD_OBJ)),
            strategy: None,
        })
        .unwrap();
    assert_eq!(outcome, CommandOutcome::ModelLoaded(Some(Strategy::UvPaint)));
    assert_eq!(scene.model().map(|m| m.name()), Some("panel"));
    assert!(!scene.decals().contains(old));
    assert!(scene.visuals().is_empty());

    // Assets outlive the model
    let id = place_at(&mut scene, asset, Vec2::zeros());
    assert_eq!(scene.decals().get(id).unwrap().strategy(), Strategy::UvPaint);
}
