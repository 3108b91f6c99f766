//! Decal placement and derivation
//!
//! Everything between a surface hit and a visible decal: the content canvas,
//! the orientation frame, UV quality analysis, and the two strategies that
//! put a canvas on the model.
//!
//! ## Strategies
//!
//! - **Geometric**: a separate mesh patch is projected onto the surface
//! - **UvPaint**: the canvas is painted into the material's texture atlas
//!
//! One strategy is chosen when a model loads and holds until it unloads.

pub mod canvas;
pub mod hit;
pub mod orientation;
pub mod uv_analysis;
pub mod geometric;
pub mod atlas;
pub mod registry;

pub use canvas::{render_canvas, thumbnail, CanvasContent};
pub use hit::{resolve_hit, SurfaceHit};
pub use orientation::SurfaceFrame;
pub use uv_analysis::{analyze_mesh, analyze_model, MeshUvReport, UvProblems, UvReport};
pub use geometric::{DecalMaterial, DecalMesh, DecalVertex, DecalVisual, ProjectorBox, VisualArena};
pub use atlas::{AtlasStore, MaterialAtlas, Stamp, TextureHandle};
pub use registry::{Decal, DecalContent, DecalKind, DecalRegistry, Placement};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::foundation::collections::AssetId;

/// How decals are applied to the current model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Projected mesh patches
    Geometric,
    /// Painting into material atlases
    UvPaint,
}

/// Errors raised while placing or re-deriving a decal
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecalError {
    /// No model is loaded
    #[error("No model loaded")]
    NoModel,

    /// The mesh a decal refers to is gone
    #[error("Decal mesh no longer exists")]
    UnknownMesh,

    /// No atlas exists for the material that was hit
    #[error("No atlas for the hit material")]
    NoAtlas,

    /// Uv-paint placement hit a mesh without texture coordinates
    #[error("Surface has no texture coordinates")]
    MissingUv,

    /// Clipping produced no triangles
    #[error("Decal projection produced an empty patch")]
    EmptyPatch,

    /// The referenced asset does not exist
    #[error("Unknown asset {0:?}")]
    UnknownAsset(AssetId),

    /// Size must be positive and finite
    #[error("Invalid decal size {0}")]
    InvalidSize(f32),
}
