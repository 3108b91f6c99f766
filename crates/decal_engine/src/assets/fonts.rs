//! Font library for text decals
//!
//! Hosts register TrueType/OpenType font bytes per family name; the canvas
//! generator looks families up here and rasterizes glyphs with `fontdue`.
//! The first registered family doubles as the fallback for unknown names.

use std::collections::HashMap;

use fontdue::{Font, FontSettings};

use super::AssetError;

/// Registered fonts keyed by family name
#[derive(Default)]
pub struct FontLibrary {
    fonts: HashMap<String, Font>,
    fallback: Option<String>,
}

impl FontLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Register font bytes under a family name
    ///
    /// Re-registering a family replaces the previous font.
    pub fn register(&mut self, family: impl Into<String>, font_data: &[u8]) -> Result<(), AssetError> {
        let family = family.into();
        let font = Font::from_bytes(font_data, FontSettings::default())
            .map_err(|e| AssetError::Font(format!("fontdue error for '{family}': {e}")))?;

        log::info!("Registered font family '{}'", family);
        if self.fallback.is_none() {
            self.fallback = Some(family.clone());
        }
        self.fonts.insert(family, font);
        Ok(())
    }

    /// Font for `family`, falling back to the first registered family
    pub fn resolve(&self, family: &str) -> Option<&Font> {
        self.fonts.get(family).or_else(|| {
            let fallback = self.fallback.as_ref()?;
            log::trace!("Font family '{}' not registered, using '{}'", family, fallback);
            self.fonts.get(fallback)
        })
    }

    /// Whether a family is registered under exactly this name
    pub fn contains(&self, family: &str) -> bool {
        self.fonts.contains_key(family)
    }

    /// Registered family names
    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.fonts.keys().map(String::as_str)
    }

    /// True when no font has been registered
    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

impl std::fmt::Debug for FontLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontLibrary")
            .field("families", &self.fonts.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback)
            .finish()
    }
}
