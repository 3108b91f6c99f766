//! Configuration system
//!
//! [`Config`] gives any serde type TOML/RON file loading, and
//! [`DecalEngineConfig`] groups every tunable the engine reads.

mod settings;

use std::path::Path;

pub use serde::{Serialize, Deserialize};
pub use settings::{
    AtlasSettings, CanvasSettings, DecalDefaults, DecalEngineConfig, ExportSettings,
    GeometricSettings, ModelSettings, UvThresholds,
};

/// On-disk configuration formats, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.toml`
    Toml,
    /// `.ron`
    Ron,
}

impl ConfigFormat {
    /// Format for `path`, if its extension is recognised
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Deserialize `text` in this format
    pub fn parse<T: for<'de> Deserialize<'de>>(self, text: &str) -> Result<T, ConfigError> {
        match self {
            Self::Toml => toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string())),
            Self::Ron => ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Serialize `value` in this format
    pub fn render<T: Serialize>(self, value: &T) -> Result<String, ConfigError> {
        match self {
            Self::Toml => toml::to_string_pretty(value).map_err(|e| ConfigError::Serialize(e.to_string())),
            Self::Ron => ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string())),
        }
    }
}

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a `.toml` or `.ron` file
    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)?;
        let config = format.parse(&contents)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a `.toml` or `.ron` file
    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = ConfigFormat::from_path(path)?.render(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its valid range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
