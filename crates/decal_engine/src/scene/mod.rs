//! Scene management
//!
//! The loaded model, the camera that looks at it, and the controller that
//! owns every piece of mutable decal state.
//!
//! ## Architecture
//!
//! ```text
//! Host (UI, pointer, frame loop)
//!      ↓  SceneCommand / pointer callbacks / tick
//! SceneController
//!      ↓  hit → strategy → registry
//! Model + DecalRegistry + VisualArena + AtlasStore
//!      ↓  SceneEvent queue
//! Host
//! ```
//!
//! Coordinate spaces: mesh local → model (node transform) → container
//! (normalization) → world (container transform). Decal records live in
//! container space so rotating or zooming the model never invalidates them.

mod camera;
mod ray;
mod model;
mod events;
mod interaction;
mod controller;

pub use camera::{Camera, Viewport};
pub use ray::{ray_hits_sphere, Ray, Triangle, TriangleHit};
pub use model::{Material, MeshGeometry, MeshNode, Model, ModelBuilder, TextureSource};
pub use events::{DecalSummary, EventQueue, SceneEvent, SceneEventHandler};
pub use interaction::{DragGuard, FrameScheduler, InteractionState, PointerState, SharedInteraction, DRAG_THRESHOLD};
pub use controller::{
    CommandOutcome, ModelSource, NewAsset, SceneCommand, SceneController, SceneError, StrategyState,
};
