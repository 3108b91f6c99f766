//! Asset management
//!
//! Logos and text snippets the user can place as decals, referenced by stable
//! [`AssetId`] keys. Also hosts the model importer, image helpers and the
//! font library.

pub mod obj_loader;
pub mod mtl_parser;
pub mod image_loader;
pub mod fonts;

pub use obj_loader::{ImportError, ObjLoader, ObjSource};
pub use mtl_parser::{MtlData, MtlParser};
pub use fonts::FontLibrary;

use image::RgbaImage;
use thiserror::Error;

use crate::foundation::collections::{AssetId, OrderedSlotMap};

/// Asset errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Image or file could not be loaded
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Image could not be encoded
    #[error("Failed to encode image: {0}")]
    EncodeFailed(String),

    /// Font bytes could not be parsed
    #[error("Font error: {0}")]
    Font(String),

    /// No asset with this id
    #[error("Unknown asset {0:?}")]
    UnknownAsset(AssetId),

    /// The operation needs a logo asset
    #[error("Asset {0:?} is not a logo")]
    NotALogo(AssetId),
}

/// Load state of a logo image
#[derive(Debug, Clone)]
pub enum LogoImage {
    /// Bytes have not arrived yet
    Pending,
    /// Decoded and ready to draw
    Ready(RgbaImage),
    /// Decoding failed; drawn as a placeholder
    Failed(String),
}

/// What an asset draws
#[derive(Debug, Clone)]
pub enum AssetSource {
    /// Raster logo
    Logo(LogoImage),
    /// Text snippet
    Text(String),
}

/// Kind of an asset, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Raster logo
    Logo,
    /// Text snippet
    Text,
}

/// A placeable asset
#[derive(Debug, Clone)]
pub struct Asset {
    /// Display name
    pub name: String,
    /// Payload
    pub source: AssetSource,
}

impl Asset {
    /// Kind of this asset
    pub fn kind(&self) -> AssetKind {
        match self.source {
            AssetSource::Logo(_) => AssetKind::Logo,
            AssetSource::Text(_) => AssetKind::Text,
        }
    }
}

/// All assets of the current session, in creation order
#[derive(Debug, Default)]
pub struct AssetLibrary {
    assets: OrderedSlotMap<AssetId, Asset>,
    armed: Option<AssetId>,
}

impl AssetLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a logo from encoded bytes
    ///
    /// Undecodable bytes still create the asset, in the `Failed` state.
    pub fn add_logo_bytes(&mut self, name: impl Into<String>, bytes: &[u8]) -> AssetId {
        let name = name.into();
        let image = match image_loader::decode_image(bytes) {
            Ok(image) => LogoImage::Ready(image),
            Err(e) => {
                log::warn!("Logo '{}' failed to decode: {}", name, e);
                LogoImage::Failed(e.to_string())
            }
        };
        self.insert(name, AssetSource::Logo(image))
    }

    /// Add a logo whose bytes arrive later through [`Self::complete_logo`]
    pub fn add_logo_pending(&mut self, name: impl Into<String>) -> AssetId {
        self.insert(name.into(), AssetSource::Logo(LogoImage::Pending))
    }

    /// Add a text asset
    pub fn add_text(&mut self, text: impl Into<String>) -> AssetId {
        let text = text.into();
        self.insert(text.clone(), AssetSource::Text(text))
    }

    fn insert(&mut self, name: String, source: AssetSource) -> AssetId {
        let id = self.assets.insert(Asset { name, source });
        log::debug!("Added asset {:?}", id);
        id
    }

    /// Supply the bytes of a pending (or failed) logo
    ///
    /// Returns whether decoding succeeded; the asset ends up `Ready` or `Failed`.
    pub fn complete_logo(&mut self, id: AssetId, bytes: &[u8]) -> Result<bool, AssetError> {
        let asset = self.assets.get_mut(id).ok_or(AssetError::UnknownAsset(id))?;
        let AssetSource::Logo(image) = &mut asset.source else {
            return Err(AssetError::NotALogo(id));
        };
        match image_loader::decode_image(bytes) {
            Ok(decoded) => {
                *image = LogoImage::Ready(decoded);
                log::info!("Logo '{}' ready", asset.name);
                Ok(true)
            }
            Err(e) => {
                log::warn!("Logo '{}' failed to decode: {}", asset.name, e);
                *image = LogoImage::Failed(e.to_string());
                Ok(false)
            }
        }
    }

    /// Look up an asset
    pub fn get(&self, id: AssetId) -> Option<&Asset> {
        self.assets.get(id)
    }

    /// Whether the id refers to a live asset
    pub fn contains(&self, id: AssetId) -> bool {
        self.assets.contains_key(id)
    }

    /// Assets in creation order
    pub fn iter(&self) -> impl Iterator<Item = (AssetId, &Asset)> + '_ {
        self.assets.iter()
    }

    /// Number of assets
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// True when there are no assets
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Remove an asset, disarming it if it was armed
    pub fn remove(&mut self, id: AssetId) -> Option<Asset> {
        if self.armed == Some(id) {
            self.armed = None;
        }
        self.assets.remove(id)
    }

    /// Remove every asset
    pub fn clear(&mut self) -> usize {
        self.armed = None;
        self.assets.drain().len()
    }

    /// Select the asset the next click places; `None` disarms
    pub fn arm(&mut self, id: Option<AssetId>) -> Result<(), AssetError> {
        if let Some(id) = id {
            if !self.assets.contains_key(id) {
                return Err(AssetError::UnknownAsset(id));
            }
        }
        self.armed = id;
        Ok(())
    }

    /// Currently armed asset
    pub fn armed(&self) -> Option<AssetId> {
        self.armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::color::Rgba;

    fn png_bytes() -> Vec<u8> {
        image_loader::encode_png(&image_loader::solid_color(2, 2, Rgba::WHITE)).unwrap()
    }

    #[test]
    fn test_ids_are_stable_across_removal() {
        let mut library = AssetLibrary::new();
        let a = library.add_text("A");
        let b = library.add_text("B");
        let c = library.add_text("C");

        library.remove(a);
        assert!(!library.contains(a));
        assert_eq!(library.get(b).unwrap().name, "B");
        assert_eq!(library.get(c).unwrap().name, "C");

        let order: Vec<_> = library.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![b, c]);
    }

    #[test]
    fn test_pending_logo_completes() {
        let mut library = AssetLibrary::new();
        let id = library.add_logo_pending("logo");
        assert!(matches!(library.get(id).unwrap().source, AssetSource::Logo(LogoImage::Pending)));

        assert!(library.complete_logo(id, &png_bytes()).unwrap());
        assert!(matches!(library.get(id).unwrap().source, AssetSource::Logo(LogoImage::Ready(_))));
    }

    #[test]
    fn test_bad_logo_bytes_mark_failed() {
        let mut library = AssetLibrary::new();
        let id = library.add_logo_bytes("broken", b"nope");
        assert!(matches!(library.get(id).unwrap().source, AssetSource::Logo(LogoImage::Failed(_))));
    }

    #[test]
    fn test_complete_logo_rejects_text() {
        let mut library = AssetLibrary::new();
        let id = library.add_text("hello");
        assert!(matches!(library.complete_logo(id, &png_bytes()), Err(AssetError::NotALogo(_))));
    }

    #[test]
    fn test_arming() {
        let mut library = AssetLibrary::new();
        let id = library.add_text("hello");
        library.arm(Some(id)).unwrap();
        assert_eq!(library.armed(), Some(id));

        library.remove(id);
        assert_eq!(library.armed(), None);
        assert!(library.arm(Some(id)).is_err());
    }
}
