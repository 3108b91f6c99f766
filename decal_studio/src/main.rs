//! Decal Studio
//!
//! Command-line front end for the decal engine: loads an OBJ model, places
//! text and logo decals at screen positions, and writes a PNG snapshot
//! and/or a binary glTF asset.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};

use decal_engine::foundation::logging;
use decal_engine::prelude::*;

const DEFAULT_WIDTH: &str = "1280";
const DEFAULT_HEIGHT: &str = "720";

fn cli() -> Command {
    Command::new("decal_studio")
        .about("Places logo and text decals on a 3D model and exports the result")
        .arg(
            Arg::new("model")
                .value_name("OBJ")
                .help("Model to decorate (.obj, with .mtl and textures beside it)")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Engine configuration (.toml or .ron)"),
        )
        .arg(
            Arg::new("text")
                .short('t')
                .long("text")
                .value_name("TEXT")
                .help("Text decal to place (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("logo")
                .short('l')
                .long("logo")
                .value_name("IMAGE")
                .help("Logo image to place (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("at")
                .long("at")
                .value_name("X,Y")
                .help("Screen position for the next decal, in viewport pixels (repeatable, defaults to center)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("font")
                .long("font")
                .value_name("TTF")
                .help("Font file registered as the default font family"),
        )
        .arg(
            Arg::new("rotate")
                .long("rotate")
                .value_name("DEGREES")
                .help("Rotation applied to every placed decal")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("size")
                .long("size")
                .value_name("SIZE")
                .help("Size override (world units for geometric decals, atlas pixels for painted ones)")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("width")
                .long("width")
                .value_name("PIXELS")
                .default_value(DEFAULT_WIDTH)
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .value_name("PIXELS")
                .default_value(DEFAULT_HEIGHT)
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("accept-fallback")
                .long("accept-fallback")
                .help("Use projected decals when the model's UVs are unusable instead of failing")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("report")
                .long("report")
                .help("Print the UV analysis report as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("png")
                .long("png")
                .value_name("FILE")
                .help("Write a transparent snapshot"),
        )
        .arg(
            Arg::new("glb")
                .long("glb")
                .value_name("FILE")
                .help("Write a binary glTF asset"),
        )
}

fn main() -> Result<()> {
    logging::init();
    let matches = cli().get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => DecalEngineConfig::load_from_file(path).with_context(|| format!("Failed to load {path}"))?,
        None => DecalEngineConfig::default(),
    };
    let mut scene = SceneController::new(config).context("Invalid configuration")?;

    let width = *matches.get_one::<u32>("width").context("width has a default")?;
    let height = *matches.get_one::<u32>("height").context("height has a default")?;
    scene.set_viewport(Viewport::new(width, height));

    if let Some(font) = matches.get_one::<String>("font") {
        let bytes = fs::read(font).with_context(|| format!("Failed to read font {font}"))?;
        let family = scene.config().canvas.default_font_family.clone();
        scene.fonts_mut().register(family, &bytes).context("Font did not parse")?;
    }

    let model = PathBuf::from(matches.get_one::<String>("model").context("model is required")?);
    load_model(&mut scene, &model, matches.get_flag("accept-fallback"))?;

    if matches.get_flag("report") {
        if let Some(report) = scene.uv_report() {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }

    let placed = place_decals(&mut scene, &matches)?;
    println!("Placed {placed} decals using {:?}", scene.strategy());

    for event in scene.drain_events() {
        log::debug!("{:?}", event);
    }

    if let Some(path) = matches.get_one::<String>("png") {
        let mut renderer = SoftwareRenderer::new(width, height);
        let png = export_png(&mut renderer, &scene, &scene.config().export)?;
        fs::write(path, png).with_context(|| format!("Failed to write {path}"))?;
        println!("Wrote snapshot {path}");
    }
    if let Some(path) = matches.get_one::<String>("glb") {
        let glb = export_asset(&scene)?;
        fs::write(path, glb).with_context(|| format!("Failed to write {path}"))?;
        println!("Wrote asset {path}");
    }
    Ok(())
}

fn load_model(scene: &mut SceneController, path: &Path, accept_fallback: bool) -> Result<()> {
    scene
        .dispatch(SceneCommand::LoadModel { source: ModelSource::File(path.to_path_buf()), strategy: None })
        .with_context(|| format!("Failed to import {}", path.display()))?;

    if let Some(report) = scene.uv_report() {
        for mesh in report.meshes.iter().filter(|m| !m.problems.is_empty()) {
            log::warn!("Mesh '{}': {:?}", mesh.name, mesh.problems);
        }
    }

    if scene.strategy().is_none() {
        if !accept_fallback {
            bail!("Model UVs are unusable for painting; rerun with --accept-fallback to project decals instead");
        }
        scene.dispatch(SceneCommand::ResolveUvGate { accept: true })?;
    }
    Ok(())
}

fn parse_position(text: &str) -> Result<Vec2> {
    let (x, y) = text.split_once(',').with_context(|| format!("Expected X,Y but got '{text}'"))?;
    let x: f32 = x.trim().parse().with_context(|| format!("Invalid X in '{text}'"))?;
    let y: f32 = y.trim().parse().with_context(|| format!("Invalid Y in '{text}'"))?;
    Ok(Vec2::new(x, y))
}

fn place_decals(scene: &mut SceneController, matches: &ArgMatches) -> Result<usize> {
    let mut assets = Vec::new();
    for text in matches.get_many::<String>("text").into_iter().flatten() {
        assets.push(NewAsset::Text(text.clone()));
    }
    for path in matches.get_many::<String>("logo").into_iter().flatten() {
        let bytes = fs::read(path).with_context(|| format!("Failed to read logo {path}"))?;
        assets.push(NewAsset::Logo { name: path.clone(), bytes });
    }

    let positions = matches
        .get_many::<String>("at")
        .into_iter()
        .flatten()
        .map(|p| parse_position(p))
        .collect::<Result<Vec<_>>>()?;
    let viewport = *scene.viewport();
    let center = Vec2::new(viewport.width as f32 * 0.5, viewport.height as f32 * 0.5);

    let rotation = matches.get_one::<f32>("rotate").copied();
    let size = matches.get_one::<f32>("size").copied();
    let mut placed = 0;

    for (i, asset) in assets.into_iter().enumerate() {
        let CommandOutcome::AssetAdded(asset) = scene.dispatch(SceneCommand::AddAsset(asset))? else {
            continue;
        };
        let pointer = positions.get(i).copied().unwrap_or(center);
        let CommandOutcome::Placed(id) = scene.dispatch(SceneCommand::Place { asset, pointer })? else {
            log::warn!("Decal {} at ({}, {}) missed the model", i, pointer.x, pointer.y);
            continue;
        };
        if let Some(degrees) = rotation {
            scene.dispatch(SceneCommand::SetRotation { id, degrees })?;
        }
        if let Some(size) = size {
            scene.dispatch(SceneCommand::SetSize { id, size })?;
        }
        placed += 1;
    }
    Ok(placed)
}
