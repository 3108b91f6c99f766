//! # Scene Controller
//!
//! The single owner of all mutable decal state. Hosts talk to it through
//! typed [`SceneCommand`]s, pointer callbacks, and the per-frame [`tick`],
//! and learn about changes by draining [`SceneEvent`]s.
//!
//! Every command is atomic: the new appearance of a decal is derived from a
//! candidate record first, and the record, its visual, and its atlas are only
//! touched once that derivation succeeded.
//!
//! [`tick`]: SceneController::tick

use std::path::PathBuf;

use image::RgbaImage;
use thiserror::Error;

use crate::assets::{AssetError, AssetLibrary, AssetSource, FontLibrary, ImportError, ObjLoader, ObjSource};
use crate::config::{ConfigError, DecalEngineConfig};
use crate::decal::{
    analyze_model, geometric, render_canvas, resolve_hit, thumbnail, AtlasStore, Decal, DecalContent, DecalError,
    DecalKind, DecalRegistry, DecalVisual, Placement, Stamp, Strategy, SurfaceFrame, SurfaceHit, UvReport,
    VisualArena,
};
use crate::foundation::collections::{AssetId, DecalId, MaterialId, SecondaryMap, VisualId};
use crate::foundation::color::Rgba;
use crate::foundation::math::{Transform, Vec2};
use super::camera::{Camera, Viewport};
use super::events::{DecalSummary, EventQueue, SceneEvent, SceneEventHandler};
use super::interaction::{DragGuard, FrameScheduler, PointerState, SharedInteraction};
use super::model::Model;

/// Errors returned at the command boundary
#[derive(Error, Debug)]
pub enum SceneError {
    /// Model import failed; the previous model stays loaded
    #[error("Model import failed: {0}")]
    Import(#[from] ImportError),

    /// Decal placement or re-derivation failed
    #[error("Decal error: {0}")]
    Decal(#[from] DecalError),

    /// Asset operation failed
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// The command needs a loaded model
    #[error("No model loaded")]
    NoModel,

    /// The UV decision gate is still open
    #[error("Placement is waiting for the UV decision")]
    AwaitingUvDecision,
}

/// Where a model comes from
#[derive(Debug)]
pub enum ModelSource {
    /// OBJ text plus referenced files, already in memory
    Obj(ObjSource),
    /// OBJ file on disk
    File(PathBuf),
    /// A model assembled by the host
    Built(Box<Model>),
}

/// A new asset to register
#[derive(Debug, Clone)]
pub enum NewAsset {
    /// Encoded logo image
    Logo {
        /// Display name
        name: String,
        /// Encoded image bytes
        bytes: Vec<u8>,
    },
    /// Logo whose bytes arrive later
    PendingLogo {
        /// Display name
        name: String,
    },
    /// Text snippet
    Text(String),
}

/// Typed command accepted by [`SceneController::dispatch`]
#[derive(Debug)]
pub enum SceneCommand {
    /// Import a model, replacing the current one
    LoadModel {
        /// Model to import
        source: ModelSource,
        /// Force a strategy instead of deciding from the UV report
        strategy: Option<Strategy>,
    },
    /// Discard the model and everything that depends on it
    UnloadModel,
    /// Answer the UV decision gate
    ResolveUvGate {
        /// Accept geometric decals, or discard the model and all assets
        accept: bool,
    },
    /// Register an asset
    AddAsset(NewAsset),
    /// Remove an asset and every decal that uses it
    RemoveAsset(AssetId),
    /// Select the asset the next click places
    ArmAsset(Option<AssetId>),
    /// Place an asset under a pointer position
    Place {
        /// Asset to place
        asset: AssetId,
        /// Pointer position in logical pixels
        pointer: Vec2,
    },
    /// Move a decal under a pointer position
    Move {
        /// Decal to move
        id: DecalId,
        /// Pointer position in logical pixels
        pointer: Vec2,
    },
    /// Set in-plane rotation
    SetRotation {
        /// Decal
        id: DecalId,
        /// Degrees, counter-clockwise
        degrees: f32,
    },
    /// Set size (world units or atlas pixels)
    SetSize {
        /// Decal
        id: DecalId,
        /// New size
        size: f32,
    },
    /// Replace the text of a text decal
    UpdateText {
        /// Decal
        id: DecalId,
        /// New text
        text: String,
    },
    /// Change the font family of a text decal
    UpdateFont {
        /// Decal
        id: DecalId,
        /// Font family
        family: String,
    },
    /// Change the fill color (text) or tint (logo)
    UpdateColor {
        /// Decal
        id: DecalId,
        /// New color
        color: Rgba,
    },
    /// Delete a decal
    Delete(DecalId),
    /// Delete every decal and reset every atlas
    ClearAll,
    /// Replace the model's container transform
    SetContainerTransform(Transform),
}

/// What a successful command did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Nothing changed (miss, unknown id, or nothing to do)
    NoOp,
    /// State changed
    Applied,
    /// A model was loaded; `None` means the UV gate is pending
    ModelLoaded(Option<Strategy>),
    /// An asset was registered
    AssetAdded(AssetId),
    /// A decal was placed
    Placed(DecalId),
    /// A decal was re-derived
    Updated(DecalId),
    /// Decals were removed
    Removed(usize),
    /// A drag started on a decal
    DragStarted(DecalId),
}

/// Placement strategy state of the current model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    /// Nothing loaded
    NoModel,
    /// UV report not ok; waiting for the user to accept or reject
    AwaitingDecision,
    /// Strategy settled for the life of the model
    Selected(Strategy),
}

/// Owner of the model, assets, decals, atlases, and interaction state
pub struct SceneController {
    config: DecalEngineConfig,
    camera: Camera,
    viewport: Viewport,
    model: Option<Model>,
    report: Option<UvReport>,
    state: StrategyState,
    assets: AssetLibrary,
    fonts: FontLibrary,
    decals: DecalRegistry,
    canvases: SecondaryMap<DecalId, RgbaImage>,
    visuals: VisualArena,
    atlases: AtlasStore,
    events: EventQueue,
    interaction: SharedInteraction,
    pointer: PointerState,
    scheduler: FrameScheduler,
    drag: Option<DragGuard>,
}

impl SceneController {
    /// Create a controller after validating `config`
    pub fn new(config: DecalEngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: DecalEngineConfig) -> Self {
        let viewport = Viewport::default();
        let mut camera = Camera::default();
        camera.set_aspect_ratio(viewport.aspect());
        Self {
            config,
            camera,
            viewport,
            model: None,
            report: None,
            state: StrategyState::NoModel,
            assets: AssetLibrary::new(),
            fonts: FontLibrary::new(),
            decals: DecalRegistry::new(),
            canvases: SecondaryMap::new(),
            visuals: VisualArena::new(),
            atlases: AtlasStore::default(),
            events: EventQueue::new(),
            interaction: SharedInteraction::default(),
            pointer: PointerState::default(),
            scheduler: FrameScheduler::new(),
            drag: None,
        }
    }

    // ---- accessors ----

    /// Active configuration
    pub fn config(&self) -> &DecalEngineConfig {
        &self.config
    }

    /// Active camera
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable camera, for orbit controls
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Drawing surface
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Resize the drawing surface; the camera aspect follows
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.camera.set_aspect_ratio(viewport.aspect());
    }

    /// Loaded model
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// UV report of the loaded model
    pub fn uv_report(&self) -> Option<&UvReport> {
        self.report.as_ref()
    }

    /// Strategy state
    pub fn strategy_state(&self) -> StrategyState {
        self.state
    }

    /// Settled strategy, if any
    pub fn strategy(&self) -> Option<Strategy> {
        match self.state {
            StrategyState::Selected(strategy) => Some(strategy),
            _ => None,
        }
    }

    /// Registered assets
    pub fn assets(&self) -> &AssetLibrary {
        &self.assets
    }

    /// Font library, for registering font families
    pub fn fonts_mut(&mut self) -> &mut FontLibrary {
        &mut self.fonts
    }

    /// Decal records
    pub fn decals(&self) -> &DecalRegistry {
        &self.decals
    }

    /// Derived visuals of geometric decals
    pub fn visuals(&self) -> &VisualArena {
        &self.visuals
    }

    /// Material atlases of the loaded model
    pub fn atlases(&self) -> &AtlasStore {
        &self.atlases
    }

    /// Cached canvas of a decal
    pub fn canvas(&self, id: DecalId) -> Option<&RgbaImage> {
        self.canvases.get(id)
    }

    /// Interaction state shared with the host's camera controls
    pub fn interaction(&self) -> SharedInteraction {
        SharedInteraction::clone(&self.interaction)
    }

    /// Decal being dragged
    pub fn dragging(&self) -> Option<DecalId> {
        self.drag.as_ref().map(DragGuard::decal)
    }

    /// Editable fields and thumbnail of a decal
    pub fn summary(&self, id: DecalId) -> Option<DecalSummary> {
        let decal = self.decals.get(id)?;
        let (text, font_family, color) = match &decal.content.kind {
            DecalKind::Text { text, font_family, color, .. } => {
                (Some(text.clone()), Some(font_family.clone()), Some(*color))
            }
            DecalKind::Logo { tint } => (None, None, *tint),
        };
        let size = self.config.canvas.thumbnail_size;
        let thumbnail = self
            .canvases
            .get(id)
            .map_or_else(|| RgbaImage::new(size, size), |canvas| thumbnail(canvas, size));
        Some(DecalSummary {
            id,
            asset: decal.content.asset,
            strategy: decal.strategy(),
            size: decal.size,
            rotation_deg: decal.rotation_deg,
            text,
            font_family,
            color,
            thumbnail,
        })
    }

    // ---- events ----

    /// Take every queued event
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        self.events.drain()
    }

    /// Register an event handler used by [`Self::dispatch_events`]
    pub fn register_handler(&mut self, handler: Box<dyn SceneEventHandler>) {
        self.events.register_handler(handler);
    }

    /// Run queued events through the registered handlers, returning the rest
    pub fn dispatch_events(&mut self) -> Vec<SceneEvent> {
        self.events.dispatch()
    }

    // ---- commands ----

    /// Execute a command
    ///
    /// Failures are logged and returned; the scene is left as it was.
    pub fn dispatch(&mut self, command: SceneCommand) -> Result<CommandOutcome, SceneError> {
        log::trace!("Dispatching {:?}", std::mem::discriminant(&command));
        let result = self.execute(command);
        self.flush_dirty_atlases();
        if let Err(e) = &result {
            log::warn!("Command failed: {}", e);
        }
        result
    }

    fn execute(&mut self, command: SceneCommand) -> Result<CommandOutcome, SceneError> {
        match command {
            SceneCommand::LoadModel { source, strategy } => self.load_model(source, strategy),
            SceneCommand::UnloadModel => {
                if self.model.is_none() {
                    log::debug!("Unload ignored, no model");
                    return Ok(CommandOutcome::NoOp);
                }
                self.discard_model();
                Ok(CommandOutcome::Applied)
            }
            SceneCommand::ResolveUvGate { accept } => self.resolve_gate(accept),
            SceneCommand::AddAsset(asset) => {
                let id = match asset {
                    NewAsset::Logo { name, bytes } => self.assets.add_logo_bytes(name, &bytes),
                    NewAsset::PendingLogo { name } => self.assets.add_logo_pending(name),
                    NewAsset::Text(text) => self.assets.add_text(text),
                };
                Ok(CommandOutcome::AssetAdded(id))
            }
            SceneCommand::RemoveAsset(id) => self.remove_asset(id),
            SceneCommand::ArmAsset(id) => {
                if let Err(e) = self.assets.arm(id) {
                    log::debug!("Arm ignored: {}", e);
                    return Ok(CommandOutcome::NoOp);
                }
                Ok(CommandOutcome::Applied)
            }
            SceneCommand::Place { asset, pointer } => self.place(asset, pointer),
            SceneCommand::Move { id, pointer } => self.move_decal(id, pointer),
            SceneCommand::SetRotation { id, degrees } => {
                if !degrees.is_finite() {
                    log::debug!("Rotation {} ignored", degrees);
                    return Ok(CommandOutcome::NoOp);
                }
                self.edit(id, false, |decal| {
                    decal.rotation_deg = degrees;
                    true
                })
            }
            SceneCommand::SetSize { id, size } => {
                if !(size.is_finite() && size > 0.0) {
                    return Err(DecalError::InvalidSize(size).into());
                }
                self.edit(id, false, |decal| {
                    decal.size = size;
                    true
                })
            }
            SceneCommand::UpdateText { id, text } => self.edit(id, true, |decal| match &mut decal.content.kind {
                DecalKind::Text { text: current, .. } => {
                    *current = text;
                    true
                }
                DecalKind::Logo { .. } => false,
            }),
            SceneCommand::UpdateFont { id, family } => self.edit(id, true, |decal| match &mut decal.content.kind {
                DecalKind::Text { font_family, .. } => {
                    *font_family = family;
                    true
                }
                DecalKind::Logo { .. } => false,
            }),
            SceneCommand::UpdateColor { id, color } => self.edit(id, true, |decal| {
                match &mut decal.content.kind {
                    DecalKind::Text { color: current, .. } => *current = color,
                    DecalKind::Logo { tint } => *tint = Some(color),
                }
                true
            }),
            SceneCommand::Delete(id) => {
                let removed = self.remove_decals(&[id]);
                if removed == 0 {
                    log::debug!("Delete ignored, unknown decal {:?}", id);
                    return Ok(CommandOutcome::NoOp);
                }
                Ok(CommandOutcome::Removed(removed))
            }
            SceneCommand::ClearAll => Ok(CommandOutcome::Removed(self.clear_all())),
            SceneCommand::SetContainerTransform(transform) => match self.model.as_mut() {
                Some(model) => {
                    model.set_container(transform);
                    Ok(CommandOutcome::Applied)
                }
                None => {
                    log::debug!("Container transform ignored, no model");
                    Ok(CommandOutcome::NoOp)
                }
            },
        }
    }

    fn load_model(&mut self, source: ModelSource, strategy: Option<Strategy>) -> Result<CommandOutcome, SceneError> {
        let target_size = self.config.model.target_size;
        let model = match source {
            ModelSource::Obj(obj) => ObjLoader::load(&obj, target_size)?,
            ModelSource::File(path) => ObjLoader::load_file(&path, target_size)?,
            ModelSource::Built(model) => *model,
        };

        if self.model.is_some() {
            self.discard_model();
        }

        let report = analyze_model(&model, &self.config.uv);
        let atlases = AtlasStore::from_model(&model, &self.config.atlas);
        self.state = match strategy {
            Some(forced) => StrategyState::Selected(forced),
            None if report.ok => StrategyState::Selected(Strategy::UvPaint),
            None => StrategyState::AwaitingDecision,
        };
        log::info!(
            "Loaded model '{}' ({} meshes), strategy {:?}",
            model.name(),
            model.mesh_count(),
            self.state
        );

        self.events.send(SceneEvent::ModelReady {
            name: model.name().to_string(),
            mesh_count: model.mesh_count(),
            materials: model.materials().map(|(id, m)| (id, m.name.clone())).collect(),
            bounds: *model.bounds(),
        });
        self.events.send(SceneEvent::UvReportReady {
            report: report.clone(),
            needs_decision: self.state == StrategyState::AwaitingDecision,
        });
        if let Some(selected) = self.strategy() {
            self.events.send(SceneEvent::StrategySelected(selected));
        }

        self.model = Some(model);
        self.report = Some(report);
        self.atlases = atlases;
        Ok(CommandOutcome::ModelLoaded(self.strategy()))
    }

    fn resolve_gate(&mut self, accept: bool) -> Result<CommandOutcome, SceneError> {
        if self.state != StrategyState::AwaitingDecision {
            log::debug!("No UV decision pending");
            return Ok(CommandOutcome::NoOp);
        }
        if accept {
            log::info!("UV gate accepted, using geometric decals");
            self.state = StrategyState::Selected(Strategy::Geometric);
            self.events.send(SceneEvent::StrategySelected(Strategy::Geometric));
        } else {
            log::info!("UV gate rejected, discarding model and assets");
            self.discard_model();
            let removed = self.assets.clear();
            log::debug!("Removed {} assets", removed);
            self.events.send(SceneEvent::AssetsCleared);
        }
        Ok(CommandOutcome::Applied)
    }

    fn discard_model(&mut self) {
        self.end_drag();
        let dropped = self.decals.drain().len();
        self.visuals.clear();
        self.canvases.clear();
        self.atlases = AtlasStore::default();
        self.model = None;
        self.report = None;
        self.state = StrategyState::NoModel;
        log::info!("Model discarded with {} decals", dropped);
        self.events.send(SceneEvent::ModelCleared);
    }

    fn remove_asset(&mut self, id: AssetId) -> Result<CommandOutcome, SceneError> {
        if !self.assets.contains(id) {
            log::debug!("Remove ignored, unknown asset {:?}", id);
            return Ok(CommandOutcome::NoOp);
        }
        let dependents = self.decals.referencing_asset(id);
        let removed = self.remove_decals(&dependents);
        self.assets.remove(id);
        log::info!("Removed asset {:?} and {} decals", id, removed);
        self.events.send(SceneEvent::AssetRemoved(id));
        Ok(CommandOutcome::Removed(removed))
    }

    fn require_strategy(&self) -> Result<Strategy, SceneError> {
        match self.state {
            StrategyState::NoModel => Err(SceneError::NoModel),
            StrategyState::AwaitingDecision => Err(SceneError::AwaitingUvDecision),
            StrategyState::Selected(strategy) => Ok(strategy),
        }
    }

    fn hit_under(&self, pointer: Vec2) -> Result<Option<SurfaceHit>, SceneError> {
        let model = self.model.as_ref().ok_or(SceneError::NoModel)?;
        Ok(resolve_hit(pointer, &self.viewport, &self.camera, model))
    }

    fn place(&mut self, asset: AssetId, pointer: Vec2) -> Result<CommandOutcome, SceneError> {
        let strategy = self.require_strategy()?;
        let Some(kind) = self.initial_kind(asset) else {
            log::debug!("Place ignored, unknown asset {:?}", asset);
            return Ok(CommandOutcome::NoOp);
        };
        let Some(hit) = self.hit_under(pointer)? else {
            log::debug!("Place missed the model at {:?}", pointer);
            return Ok(CommandOutcome::NoOp);
        };

        let (placement, size) = match strategy {
            Strategy::Geometric => (self.geometric_placement(&hit, None)?, self.config.decal_defaults.geometric_size),
            Strategy::UvPaint => (self.paint_placement(&hit)?, self.config.decal_defaults.uv_paint_size),
        };
        let mut candidate = Decal {
            id: DecalId::default(),
            placement,
            content: DecalContent { asset, kind },
            size,
            rotation_deg: 0.0,
        };

        let canvas = self.render_decal_canvas(&candidate)?;
        if let Some(visual) = self.derive_visual(&candidate, &canvas)? {
            let visual_id = self.visuals.insert(visual);
            set_visual(&mut candidate.placement, visual_id);
        }

        let material = candidate.material();
        let id = self.decals.insert_with(|id| Decal { id, ..candidate });
        self.canvases.insert(id, canvas);
        if let Some(material) = material {
            self.recomposite(material);
        }

        log::info!("Placed {:?} decal {:?}", strategy, id);
        if let Some(summary) = self.summary(id) {
            self.events.send(SceneEvent::DecalPlaced(summary));
        }
        Ok(CommandOutcome::Placed(id))
    }

    fn move_decal(&mut self, id: DecalId, pointer: Vec2) -> Result<CommandOutcome, SceneError> {
        self.require_strategy()?;
        let Some(current) = self.decals.get(id) else {
            log::debug!("Move ignored, unknown decal {:?}", id);
            return Ok(CommandOutcome::NoOp);
        };
        let Some(hit) = self.hit_under(pointer)? else {
            log::debug!("Move missed the model at {:?}", pointer);
            return Ok(CommandOutcome::NoOp);
        };

        let placement = match current.placement {
            Placement::Geometric { visual, .. } => self.geometric_placement(&hit, visual)?,
            Placement::UvPaint { .. } => self.paint_placement(&hit)?,
        };
        let candidate = Decal { placement, ..current.clone() };
        self.commit(candidate, false)
    }

    /// Apply `change` to a copy of the record and commit it
    ///
    /// `change` returns false when the edit does not apply to this decal.
    fn edit(
        &mut self,
        id: DecalId,
        content_changed: bool,
        change: impl FnOnce(&mut Decal) -> bool,
    ) -> Result<CommandOutcome, SceneError> {
        let Some(current) = self.decals.get(id) else {
            log::debug!("Edit ignored, unknown decal {:?}", id);
            return Ok(CommandOutcome::NoOp);
        };
        let mut candidate = current.clone();
        if !change(&mut candidate) {
            log::debug!("Edit does not apply to decal {:?}", id);
            return Ok(CommandOutcome::NoOp);
        }
        self.commit(candidate, content_changed)
    }

    /// Re-derive a decal from `candidate` and, on success, replace its record
    fn commit(&mut self, mut candidate: Decal, content_changed: bool) -> Result<CommandOutcome, SceneError> {
        let id = candidate.id;
        let Some(previous_material) = self.decals.get(id).map(Decal::material) else {
            return Ok(CommandOutcome::NoOp);
        };

        let canvas = match self.canvases.get(id) {
            Some(cached) if !content_changed => cached.clone(),
            _ => self.render_decal_canvas(&candidate)?,
        };
        let visual = self.derive_visual(&candidate, &canvas)?;

        // Derivation succeeded; commit record, visual, and atlas together
        if let Some(visual) = visual {
            let live = candidate.visual().filter(|v| self.visuals.get(*v).is_some());
            match live {
                Some(existing) => {
                    self.visuals.replace(existing, visual);
                }
                None => {
                    let visual_id = self.visuals.insert(visual);
                    set_visual(&mut candidate.placement, visual_id);
                }
            }
        }
        let material = candidate.material();
        if let Some(slot) = self.decals.get_mut(id) {
            *slot = candidate;
        }
        self.canvases.insert(id, canvas);
        if let Some(material) = material {
            self.recomposite(material);
        }
        if let Some(previous) = previous_material.filter(|m| Some(*m) != material) {
            self.recomposite(previous);
        }

        log::trace!("Decal {:?} re-derived", id);
        if let Some(summary) = self.summary(id) {
            self.events.send(SceneEvent::DecalUpdated(summary));
        }
        Ok(CommandOutcome::Updated(id))
    }

    fn remove_decals(&mut self, ids: &[DecalId]) -> usize {
        let mut materials: Vec<MaterialId> = Vec::new();
        let mut removed = 0;
        for &id in ids {
            let Some(decal) = self.decals.remove(id) else {
                continue;
            };
            if let Some(visual) = decal.visual() {
                self.visuals.remove(visual);
            }
            if let Some(material) = decal.material() {
                if !materials.contains(&material) {
                    materials.push(material);
                }
            }
            self.canvases.remove(id);
            if self.dragging() == Some(id) {
                self.end_drag();
            }
            self.events.send(SceneEvent::DecalRemoved(id));
            removed += 1;
        }
        for material in materials {
            self.recomposite(material);
        }
        removed
    }

    fn clear_all(&mut self) -> usize {
        self.end_drag();
        let drained = self.decals.drain();
        self.visuals.clear();
        self.canvases.clear();
        self.atlases.reset_all();
        for decal in &drained {
            self.events.send(SceneEvent::DecalRemoved(decal.id));
        }
        log::info!("Cleared {} decals", drained.len());
        drained.len()
    }

    // ---- derivation ----

    fn initial_kind(&self, asset: AssetId) -> Option<DecalKind> {
        let kind = match &self.assets.get(asset)?.source {
            AssetSource::Text(text) => DecalKind::Text {
                text: text.clone(),
                font_family: self.config.canvas.default_font_family.clone(),
                color: self.config.canvas.default_text_color,
                font_px: None,
            },
            AssetSource::Logo(_) => DecalKind::Logo { tint: None },
        };
        Some(kind)
    }

    fn geometric_placement(&self, hit: &SurfaceHit, visual: Option<VisualId>) -> Result<Placement, DecalError> {
        let model = self.model.as_ref().ok_or(DecalError::NoModel)?;
        let frame = SurfaceFrame::build(&hit.normal, &self.camera).map_axes(|v| model.world_to_container_direction(v));
        Ok(Placement::Geometric {
            mesh: hit.mesh,
            point: model.world_to_container_point(&hit.point),
            normal: frame.normal,
            frame,
            visual,
        })
    }

    fn paint_placement(&self, hit: &SurfaceHit) -> Result<Placement, DecalError> {
        let uv = hit.uv.ok_or(DecalError::MissingUv)?;
        let atlas = self.atlases.get(hit.material).ok_or(DecalError::NoAtlas)?;
        Ok(Placement::UvPaint { material: hit.material, uv, pixel: atlas.uv_to_pixel(&uv) })
    }

    fn render_decal_canvas(&self, decal: &Decal) -> Result<RgbaImage, DecalError> {
        let content = decal
            .canvas_content(&self.assets)
            .ok_or(DecalError::UnknownAsset(decal.content.asset))?;
        Ok(render_canvas(&content, &self.fonts, &self.config.canvas))
    }

    /// Visual for a geometric record; uv-paint records only need their atlas
    fn derive_visual(&self, decal: &Decal, canvas: &RgbaImage) -> Result<Option<DecalVisual>, DecalError> {
        match &decal.placement {
            Placement::Geometric { mesh, point, frame, .. } => {
                let model = self.model.as_ref().ok_or(DecalError::NoModel)?;
                geometric::build_visual(
                    model,
                    *mesh,
                    point,
                    frame,
                    decal.size,
                    decal.rotation_deg,
                    canvas.clone(),
                    &self.config.geometric,
                )
                .map(Some)
            }
            Placement::UvPaint { material, .. } => match self.atlases.get(*material) {
                Some(_) => Ok(None),
                None => Err(DecalError::NoAtlas),
            },
        }
    }

    /// Rebuild one atlas from its base plus its decals in placement order
    fn recomposite(&mut self, material: MaterialId) {
        let Some(atlas) = self.atlases.get_mut(material) else {
            return;
        };
        let canvases = &self.canvases;
        let stamps: Vec<Stamp<'_>> = self
            .decals
            .painted_on(material)
            .filter_map(|decal| {
                let Placement::UvPaint { pixel, .. } = decal.placement else {
                    return None;
                };
                let canvas = canvases.get(decal.id)?;
                Some(Stamp { canvas, pixel, size: decal.size, rotation_deg: decal.rotation_deg })
            })
            .collect();
        atlas.recomposite(stamps);
    }

    fn flush_dirty_atlases(&mut self) {
        for handle in self.atlases.take_dirty() {
            self.events.send(SceneEvent::AtlasDirty(handle));
        }
    }

    // ---- assets arriving late ----

    /// Supply the bytes of a pending logo and re-derive every decal using it
    ///
    /// Returns whether the image decoded.
    pub fn complete_logo(&mut self, asset: AssetId, bytes: &[u8]) -> Result<bool, SceneError> {
        let ready = self.assets.complete_logo(asset, bytes)?;
        for id in self.decals.referencing_asset(asset) {
            let Some(candidate) = self.decals.get(id).cloned() else {
                continue;
            };
            if let Err(e) = self.commit(candidate, true) {
                log::warn!("Decal {:?} kept its placeholder: {}", id, e);
            }
        }
        self.flush_dirty_atlases();
        Ok(ready)
    }

    // ---- pointer ----

    /// Topmost decal under a pointer position
    pub fn decal_at(&self, pointer: Vec2) -> Option<DecalId> {
        let model = self.model.as_ref()?;
        let hit = resolve_hit(pointer, &self.viewport, &self.camera, model)?;
        let point = model.world_to_container_point(&hit.point);
        let hit_pixel = hit
            .uv
            .and_then(|uv| self.atlases.get(hit.material).map(|atlas| atlas.uv_to_pixel(&uv)));

        self.decals
            .iter()
            .filter(|decal| {
                let reach = decal.size * 0.5;
                match &decal.placement {
                    Placement::Geometric { point: anchor, .. } => (point - anchor).norm() <= reach,
                    Placement::UvPaint { material, pixel, .. } => {
                        *material == hit.material && hit_pixel.is_some_and(|p| (p - pixel).norm() <= reach)
                    }
                }
            })
            .last()
            .map(|decal| decal.id)
    }

    /// Pointer pressed
    ///
    /// With an armed asset this places it and starts dragging the new decal;
    /// otherwise it starts dragging the decal under the pointer, if any.
    pub fn pointer_down(&mut self, position: Vec2) -> Result<CommandOutcome, SceneError> {
        self.pointer.press(position);
        self.scheduler.cancel();

        if let Some(asset) = self.assets.armed() {
            let outcome = self.dispatch(SceneCommand::Place { asset, pointer: position })?;
            if let CommandOutcome::Placed(id) = outcome {
                self.assets.arm(None)?;
                self.begin_drag(id);
            }
            return Ok(outcome);
        }

        match self.decal_at(position) {
            Some(id) => {
                self.begin_drag(id);
                Ok(CommandOutcome::DragStarted(id))
            }
            None => Ok(CommandOutcome::NoOp),
        }
    }

    /// Pointer moved; during a drag the position is applied on the next tick
    ///
    /// Jitter within [`DRAG_THRESHOLD`](super::interaction::DRAG_THRESHOLD) of the
    /// press leaves the decal where it is.
    pub fn pointer_move(&mut self, position: Vec2) {
        self.pointer.move_to(position);
        if self.drag.is_some() && self.pointer.is_dragging() && self.scheduler.schedule(position) {
            log::trace!("Drag update scheduled");
        }
    }

    /// Pointer released; applies any pending drag position and ends the drag
    pub fn pointer_up(&mut self, position: Vec2) {
        self.pointer.move_to(position);
        if let (Some(id), Some(pending)) = (self.dragging(), self.scheduler.take()) {
            self.apply_drag(id, pending);
        }
        self.end_drag();
        self.pointer.release();
    }

    /// Pointer cancelled; drops any pending update and ends the drag
    pub fn pointer_cancel(&mut self) {
        self.end_drag();
        self.pointer.release();
    }

    /// Animation frame callback
    ///
    /// Performs at most one drag raycast. Returns whether a decal moved.
    pub fn tick(&mut self) -> bool {
        let moved = match (self.dragging(), self.scheduler.take()) {
            (Some(id), Some(position)) => self.apply_drag(id, position),
            _ => false,
        };
        self.flush_dirty_atlases();
        moved
    }

    fn apply_drag(&mut self, id: DecalId, position: Vec2) -> bool {
        match self.dispatch(SceneCommand::Move { id, pointer: position }) {
            Ok(CommandOutcome::Updated(_)) => true,
            Ok(_) => false,
            // Already logged by dispatch; the decal stays where it was
            Err(_) => false,
        }
    }

    fn begin_drag(&mut self, id: DecalId) {
        // Release any previous guard before acquiring a new one
        self.drag = None;
        self.drag = Some(DragGuard::acquire(&self.interaction, id));
    }

    fn end_drag(&mut self) {
        self.scheduler.cancel();
        self.drag = None;
    }
}

impl Default for SceneController {
    fn default() -> Self {
        Self::with_config(DecalEngineConfig::default())
    }
}

impl std::fmt::Debug for SceneController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneController")
            .field("model", &self.model.as_ref().map(Model::name))
            .field("state", &self.state)
            .field("assets", &self.assets.len())
            .field("decals", &self.decals.len())
            .field("dragging", &self.dragging())
            .finish()
    }
}

fn set_visual(placement: &mut Placement, id: VisualId) {
    if let Placement::Geometric { visual, .. } = placement {
        *visual = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::scene::{Material, MeshGeometry};

    fn quad(with_uvs: bool) -> Box<Model> {
        let positions = vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ];
        let mut geometry = MeshGeometry::new(positions, vec![0, 1, 2, 0, 2, 3]);
        if with_uvs {
            geometry = geometry.with_uvs(vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ]);
        }
        let mut builder = Model::builder("quad");
        let material = builder.add_material(Material::default());
        builder.add_mesh("quad", geometry, material);
        Box::new(builder.build(2.0).unwrap())
    }

    fn controller() -> SceneController {
        let mut config = DecalEngineConfig::default();
        config.canvas.resolution = 32;
        config.atlas.blank_size = 64;
        SceneController::new(config).unwrap()
    }

    fn center(controller: &SceneController) -> Vec2 {
        let vp = controller.viewport();
        Vec2::new(vp.width as f32 / 2.0, vp.height as f32 / 2.0)
    }

    #[test]
    fn test_commands_without_model() {
        let mut scene = controller();
        let asset = scene.assets.add_text("hi");
        let pointer = center(&scene);
        assert!(matches!(scene.dispatch(SceneCommand::Place { asset, pointer }), Err(SceneError::NoModel)));
        assert_eq!(scene.dispatch(SceneCommand::UnloadModel).unwrap(), CommandOutcome::NoOp);
        assert_eq!(scene.dispatch(SceneCommand::ResolveUvGate { accept: true }).unwrap(), CommandOutcome::NoOp);
    }

    #[test]
    fn test_pending_gate_blocks_placement() {
        let mut scene = controller();
        let outcome = scene
            .dispatch(SceneCommand::LoadModel { source: ModelSource::Built(quad(false)), strategy: None })
            .unwrap();
        assert_eq!(outcome, CommandOutcome::ModelLoaded(None));
        assert_eq!(scene.strategy_state(), StrategyState::AwaitingDecision);

        let asset = scene.assets.add_text("hi");
        let pointer = center(&scene);
        assert!(matches!(
            scene.dispatch(SceneCommand::Place { asset, pointer }),
            Err(SceneError::AwaitingUvDecision)
        ));

        scene.dispatch(SceneCommand::ResolveUvGate { accept: true }).unwrap();
        assert_eq!(scene.strategy(), Some(Strategy::Geometric));
        assert!(matches!(scene.dispatch(SceneCommand::Place { asset, pointer }), Ok(CommandOutcome::Placed(_))));
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let mut scene = controller();
        scene
            .dispatch(SceneCommand::LoadModel { source: ModelSource::Built(quad(true)), strategy: None })
            .unwrap();
        let ghost = DecalId::default();
        for command in [
            SceneCommand::Delete(ghost),
            SceneCommand::SetRotation { id: ghost, degrees: 10.0 },
            SceneCommand::SetSize { id: ghost, size: 3.0 },
            SceneCommand::UpdateText { id: ghost, text: "x".into() },
            SceneCommand::Move { id: ghost, pointer: Vec2::new(10.0, 10.0) },
            SceneCommand::RemoveAsset(AssetId::default()),
            SceneCommand::ArmAsset(Some(AssetId::default())),
        ] {
            assert_eq!(scene.dispatch(command).unwrap(), CommandOutcome::NoOp);
        }
    }

    #[test]
    fn test_invalid_size_leaves_record_untouched() {
        let mut scene = controller();
        scene
            .dispatch(SceneCommand::LoadModel { source: ModelSource::Built(quad(true)), strategy: None })
            .unwrap();
        let asset = scene.assets.add_text("hi");
        let pointer = center(&scene);
        let CommandOutcome::Placed(id) = scene.dispatch(SceneCommand::Place { asset, pointer }).unwrap() else {
            panic!("expected placement");
        };
        let before = scene.decals().get(id).cloned();
        assert!(scene.dispatch(SceneCommand::SetSize { id, size: -1.0 }).is_err());
        assert_eq!(scene.decals().get(id).cloned(), before);
    }

    #[test]
    fn test_place_miss_is_noop() {
        let mut scene = controller();
        scene
            .dispatch(SceneCommand::LoadModel { source: ModelSource::Built(quad(true)), strategy: None })
            .unwrap();
        let asset = scene.assets.add_text("hi");
        let outcome = scene.dispatch(SceneCommand::Place { asset, pointer: Vec2::new(2.0, 2.0) }).unwrap();
        assert_eq!(outcome, CommandOutcome::NoOp);
        assert!(scene.decals().is_empty());
    }

    #[test]
    fn test_replacing_drag_keeps_capture() {
        let mut scene = controller();
        scene
            .dispatch(SceneCommand::LoadModel { source: ModelSource::Built(quad(true)), strategy: None })
            .unwrap();
        let asset = scene.assets.add_text("hi");
        let pointer = center(&scene);
        let CommandOutcome::Placed(id) = scene.dispatch(SceneCommand::Place { asset, pointer }).unwrap() else {
            panic!("expected placement");
        };
        scene.begin_drag(id);
        scene.begin_drag(id);
        assert!(scene.interaction().borrow().pointer_captured);
        scene.pointer_cancel();
        assert!(!scene.interaction().borrow().pointer_captured);
    }
}
