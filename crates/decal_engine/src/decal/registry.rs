//! # Decal Registry
//!
//! Owns every decal record of the current model, in placement order. A
//! record holds everything needed to re-derive the decal's appearance; the
//! derived render state is only a [`VisualId`] for geometric decals and
//! nothing at all for uv-paint decals.

use crate::assets::{AssetLibrary, AssetSource, LogoImage};
use crate::foundation::collections::{AssetId, DecalId, MaterialId, MeshId, OrderedSlotMap, VisualId};
use crate::foundation::color::Rgba;
use crate::foundation::math::{Vec2, Vec3};
use super::canvas::CanvasContent;
use super::orientation::SurfaceFrame;
use super::Strategy;

static NO_IMAGE: LogoImage = LogoImage::Pending;

/// Where and how a decal sits on the model
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// Projected mesh patch; positions in container space
    Geometric {
        /// Mesh the patch was cut from
        mesh: MeshId,
        /// Hit point
        point: Vec3,
        /// Surface normal at the hit, facing the viewer at placement time
        normal: Vec3,
        /// Unrotated orientation frame captured at placement time
        frame: SurfaceFrame,
        /// Derived visual
        visual: Option<VisualId>,
    },
    /// Painted into a material atlas
    UvPaint {
        /// Material whose atlas receives the paint
        material: MaterialId,
        /// Texture coordinate of the hit
        uv: Vec2,
        /// Atlas pixel of the hit
        pixel: Vec2,
    },
}

impl Placement {
    /// Strategy implied by the placement variant
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Geometric { .. } => Strategy::Geometric,
            Self::UvPaint { .. } => Strategy::UvPaint,
        }
    }
}

/// Editable content of a decal
#[derive(Debug, Clone, PartialEq)]
pub enum DecalKind {
    /// A line of text
    Text {
        /// Characters
        text: String,
        /// Font family
        font_family: String,
        /// Fill color
        color: Rgba,
        /// Explicit font size in canvas pixels
        font_px: Option<f32>,
    },
    /// A logo image
    Logo {
        /// Optional multiplicative tint
        tint: Option<Rgba>,
    },
}

/// Asset reference plus decal-specific overrides
#[derive(Debug, Clone, PartialEq)]
pub struct DecalContent {
    /// Source asset
    pub asset: AssetId,
    /// Content overrides
    pub kind: DecalKind,
}

/// One placed decal
#[derive(Debug, Clone, PartialEq)]
pub struct Decal {
    /// Stable id
    pub id: DecalId,
    /// Placement
    pub placement: Placement,
    /// Content
    pub content: DecalContent,
    /// World units (geometric) or atlas pixels (uv-paint)
    pub size: f32,
    /// In-plane rotation in degrees
    pub rotation_deg: f32,
}

impl Decal {
    /// Strategy of this decal
    pub fn strategy(&self) -> Strategy {
        self.placement.strategy()
    }

    /// Visual id for geometric decals
    pub fn visual(&self) -> Option<VisualId> {
        match self.placement {
            Placement::Geometric { visual, .. } => visual,
            Placement::UvPaint { .. } => None,
        }
    }

    /// Atlas material for uv-paint decals
    pub fn material(&self) -> Option<MaterialId> {
        match self.placement {
            Placement::UvPaint { material, .. } => Some(material),
            Placement::Geometric { .. } => None,
        }
    }

    /// What the canvas generator should draw for this decal
    ///
    /// Returns `None` when the referenced asset no longer exists.
    pub fn canvas_content<'a>(&'a self, assets: &'a AssetLibrary) -> Option<CanvasContent<'a>> {
        let asset = assets.get(self.content.asset)?;
        match (&self.content.kind, &asset.source) {
            (DecalKind::Text { text, font_family, color, font_px }, _) => Some(CanvasContent::Text {
                text,
                font_family,
                color: *color,
                font_px: *font_px,
            }),
            (DecalKind::Logo { tint }, AssetSource::Logo(image)) => Some(CanvasContent::Logo { image, tint: *tint }),
            // A logo override on a text asset has no image to draw
            (DecalKind::Logo { tint }, AssetSource::Text(_)) => Some(CanvasContent::Logo {
                image: &NO_IMAGE,
                tint: *tint,
            }),
        }
    }
}

/// Decal records in placement order
#[derive(Debug, Default)]
pub struct DecalRegistry {
    decals: OrderedSlotMap<DecalId, Decal>,
}

impl DecalRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record built from its freshly assigned id
    pub fn insert_with(&mut self, build: impl FnOnce(DecalId) -> Decal) -> DecalId {
        self.decals.insert_with_key(build)
    }

    /// Look up a decal
    pub fn get(&self, id: DecalId) -> Option<&Decal> {
        self.decals.get(id)
    }

    /// Mutable lookup
    pub fn get_mut(&mut self, id: DecalId) -> Option<&mut Decal> {
        self.decals.get_mut(id)
    }

    /// Whether the id refers to a live decal
    pub fn contains(&self, id: DecalId) -> bool {
        self.decals.contains_key(id)
    }

    /// Remove a decal
    pub fn remove(&mut self, id: DecalId) -> Option<Decal> {
        self.decals.remove(id)
    }

    /// Decals in placement order
    pub fn iter(&self) -> impl Iterator<Item = &Decal> + '_ {
        self.decals.iter().map(|(_, d)| d)
    }

    /// Decal ids in placement order
    pub fn ids(&self) -> Vec<DecalId> {
        self.decals.keys().collect()
    }

    /// Number of decals
    pub fn len(&self) -> usize {
        self.decals.len()
    }

    /// True when there are no decals
    pub fn is_empty(&self) -> bool {
        self.decals.is_empty()
    }

    /// Ids of decals that reference `asset`
    pub fn referencing_asset(&self, asset: AssetId) -> Vec<DecalId> {
        self.decals
            .iter()
            .filter(|(_, d)| d.content.asset == asset)
            .map(|(id, _)| id)
            .collect()
    }

    /// Uv-paint decals on `material`, in placement order
    pub fn painted_on(&self, material: MaterialId) -> impl Iterator<Item = &Decal> + '_ {
        self.iter().filter(move |d| d.material() == Some(material))
    }

    /// Remove every decal, returning them in placement order
    pub fn drain(&mut self) -> Vec<Decal> {
        self.decals.drain().into_iter().map(|(_, d)| d).collect()
    }
}
