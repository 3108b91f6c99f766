//! Rendering and export
//!
//! A software renderer that draws the current scene into an RGBA frame, and
//! the export services built on it: transparent PNG snapshots and binary
//! glTF (GLB) assets.

pub mod software;
pub mod export;

pub use software::{Framebuffer, Renderer, RendererState, SoftwareRenderer};
pub use export::{export_asset, export_image, export_png, ExportError};

use thiserror::Error;

/// Errors that can occur during rendering
#[derive(Error, Debug)]
pub enum RenderError {
    /// The output surface has no pixels
    ///
    /// Occurs when the logical size or pixel ratio rounds to zero.
    #[error("Invalid framebuffer size {width}x{height}")]
    InvalidSize {
        /// Device width
        width: u32,
        /// Device height
        height: u32,
    },

    /// Pixels were requested before any frame was rendered
    #[error("No frame has been rendered")]
    NoFrame,
}
