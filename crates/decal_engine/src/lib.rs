//! # Decal Engine
//!
//! Places logos and text onto imported 3D models and exports the result.
//!
//! ## Features
//!
//! - **Surface picking**: pointer positions resolve to model surface hits
//! - **Two placement strategies**: projected mesh patches, or painting into
//!   material texture atlases when the model's UVs can be trusted
//! - **UV analysis**: per-mesh UV quality report that decides the strategy
//! - **Editable records**: every decal can be moved, rotated, resized, and
//!   re-styled; its appearance is always re-derived from its record
//! - **Export**: transparent PNG snapshots and binary glTF assets
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use decal_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut scene = SceneController::new(DecalEngineConfig::default())?;
//!     scene.dispatch(SceneCommand::LoadModel {
//!         source: ModelSource::File("model.obj".into()),
//!         strategy: None,
//!     })?;
//!     let CommandOutcome::AssetAdded(asset) =
//!         scene.dispatch(SceneCommand::AddAsset(NewAsset::Text("Hello".into())))?
//!     else {
//!         return Ok(());
//!     };
//!     scene.dispatch(SceneCommand::Place { asset, pointer: Vec2::new(640.0, 360.0) })?;
//!
//!     let mut renderer = SoftwareRenderer::new(1280, 720);
//!     let png = export_png(&mut renderer, &scene, &scene.config().export)?;
//!     std::fs::write("snapshot.png", png)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod foundation;
pub mod config;
pub mod assets;
pub mod scene;
pub mod decal;
pub mod render;

#[cfg(test)]
mod tests;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{AssetLibrary, FontLibrary, ImportError, ObjLoader, ObjSource},
        config::{Config, DecalEngineConfig},
        decal::{DecalError, Strategy, UvProblems, UvReport},
        foundation::{
            collections::{AssetId, DecalId},
            color::Rgba,
            math::{Transform, Vec2, Vec3},
        },
        render::{export_asset, export_image, export_png, ExportError, Renderer, SoftwareRenderer},
        scene::{
            Camera, CommandOutcome, ModelSource, NewAsset, SceneCommand, SceneController, SceneError, SceneEvent,
            Viewport,
        },
    };
}
