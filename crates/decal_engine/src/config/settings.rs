//! # Engine Settings
//!
//! All tunables of the decal engine, grouped by the subsystem that reads them.
//! Every section has sensible defaults so a missing section in a TOML or RON
//! file falls back cleanly.

use serde::{Serialize, Deserialize};

use super::{Config, ConfigError};
use crate::foundation::color::Rgba;

/// Model import settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Largest dimension of a model after normalization, in world units
    pub target_size: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { target_size: 2.0 }
    }
}

/// Asset canvas rasterization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasSettings {
    /// Edge length of the square canvas in pixels
    pub resolution: u32,
    /// Fraction of the canvas a logo may fill
    pub logo_fill: f32,
    /// Adaptive font size numerator, as a fraction of the resolution
    pub adaptive_font_scale: f32,
    /// Smallest adaptive font size, as a fraction of the resolution
    pub min_font_ratio: f32,
    /// Largest adaptive font size, as a fraction of the resolution
    pub max_font_ratio: f32,
    /// Widest a line of text may be, as a fraction of the resolution
    pub max_text_width_ratio: f32,
    /// Font family used when a text decal names none
    pub default_font_family: String,
    /// Fill color for new text decals
    pub default_text_color: Rgba,
    /// Edge length of decal thumbnails sent to the UI
    pub thumbnail_size: u32,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            resolution: 512,
            logo_fill: 0.88,
            adaptive_font_scale: 1.6,
            min_font_ratio: 0.08,
            max_font_ratio: 0.45,
            max_text_width_ratio: 0.9,
            default_font_family: "sans-serif".to_string(),
            default_text_color: Rgba::BLACK,
            thumbnail_size: 64,
        }
    }
}

/// Thresholds used to classify a mesh's UV mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UvThresholds {
    /// Lowest acceptable texel density
    pub density_min: f32,
    /// Highest acceptable texel density
    pub density_max: f32,
    /// UV area below which a mesh counts as degenerate
    pub degenerate_epsilon: f32,
    /// Slack allowed outside `[0, 1]` before flagging out-of-bounds UVs
    pub bounds_tolerance: f32,
}

impl Default for UvThresholds {
    fn default() -> Self {
        Self {
            density_min: 0.1,
            density_max: 10.0,
            degenerate_epsilon: 1e-8,
            bounds_tolerance: 1e-4,
        }
    }
}

/// Material atlas settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasSettings {
    /// Edge length of the blank atlas used for untextured materials
    pub blank_size: u32,
    /// Fill of the blank atlas
    pub blank_color: Rgba,
}

impl Default for AtlasSettings {
    fn default() -> Self {
        Self {
            blank_size: 2048,
            blank_color: Rgba::WHITE,
        }
    }
}

/// Geometric (projected mesh) decal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometricSettings {
    /// Projector width/height relative to the decal size
    pub lateral_padding: f32,
    /// Projector depth relative to the decal size
    pub depth_ratio: f32,
    /// Offset along the surface normal, in world units
    pub surface_offset: f32,
    /// Draw order of decal patches relative to the model (model is 0)
    pub render_order: i32,
}

impl Default for GeometricSettings {
    fn default() -> Self {
        Self {
            lateral_padding: 1.05,
            depth_ratio: 0.6,
            surface_offset: 0.002,
            render_order: 1,
        }
    }
}

/// Initial values for newly placed decals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecalDefaults {
    /// Initial size of a geometric decal, in world units
    pub geometric_size: f32,
    /// Initial size of a uv-paint decal, in atlas pixels
    pub uv_paint_size: f32,
}

impl Default for DecalDefaults {
    fn default() -> Self {
        Self {
            geometric_size: 0.4,
            uv_paint_size: 256.0,
        }
    }
}

/// Snapshot export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Device pixel ratio used for snapshots
    pub pixel_ratio: f32,
    /// Largest snapshot edge in pixels
    pub max_dimension: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            pixel_ratio: 2.0,
            max_dimension: 8192,
        }
    }
}

/// # Complete Engine Configuration
///
/// Top-level configuration that encompasses all engine subsystems.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecalEngineConfig {
    /// Model import
    pub model: ModelSettings,
    /// Asset canvases
    pub canvas: CanvasSettings,
    /// UV classification
    pub uv: UvThresholds,
    /// Material atlases
    pub atlas: AtlasSettings,
    /// Geometric decals
    pub geometric: GeometricSettings,
    /// New decal defaults
    pub decal_defaults: DecalDefaults,
    /// Snapshot export
    pub export: ExportSettings,
}

impl DecalEngineConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if !(self.model.target_size > 0.0) {
            return invalid("model.target_size must be positive");
        }
        if self.canvas.resolution < 16 {
            return invalid("canvas.resolution must be at least 16 pixels");
        }
        if !(self.canvas.logo_fill > 0.0 && self.canvas.logo_fill <= 1.0) {
            return invalid("canvas.logo_fill must be in (0, 1]");
        }
        if self.canvas.min_font_ratio <= 0.0 || self.canvas.min_font_ratio > self.canvas.max_font_ratio {
            return invalid("canvas font ratios must satisfy 0 < min <= max");
        }
        if !(self.uv.density_min > 0.0 && self.uv.density_min < self.uv.density_max) {
            return invalid("uv density band must satisfy 0 < min < max");
        }
        if self.atlas.blank_size == 0 {
            return invalid("atlas.blank_size must be positive");
        }
        if self.geometric.lateral_padding < 1.0 || self.geometric.depth_ratio <= 0.0 {
            return invalid("geometric padding must be >= 1 and depth ratio positive");
        }
        if self.decal_defaults.geometric_size <= 0.0 || self.decal_defaults.uv_paint_size <= 0.0 {
            return invalid("decal default sizes must be positive");
        }
        if !(self.export.pixel_ratio > 0.0) || self.export.max_dimension == 0 {
            return invalid("export settings must be positive");
        }
        Ok(())
    }
}

impl Config for DecalEngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DecalEngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_density_band_rejected() {
        let mut config = DecalEngineConfig::default();
        config.uv.density_min = 20.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decals.toml");
        let path = path.to_str().unwrap();

        let mut config = DecalEngineConfig::default();
        config.atlas.blank_size = 1024;
        config.canvas.default_font_family = "Inter".to_string();
        config.save_to_file(path).unwrap();

        let loaded = DecalEngineConfig::load_from_file(path).unwrap();
        assert_eq!(loaded.atlas.blank_size, 1024);
        assert_eq!(loaded.canvas.default_font_family, "Inter");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[uv]\ndensity_max = 4.0\n").unwrap();

        let loaded = DecalEngineConfig::load_from_file(path.to_str().unwrap()).unwrap();
        assert!((loaded.uv.density_max - 4.0).abs() < f32::EPSILON);
        assert_eq!(loaded.canvas.resolution, 512);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = DecalEngineConfig::load_from_file("settings.yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_ron_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decals.ron");

        let mut config = DecalEngineConfig::default();
        config.geometric.depth_ratio = 0.75;
        config.save_to_file(&path).unwrap();

        let loaded = DecalEngineConfig::load_from_file(&path).unwrap();
        assert!((loaded.geometric.depth_ratio - 0.75).abs() < f32::EPSILON);
    }
}
