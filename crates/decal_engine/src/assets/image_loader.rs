//! Image loading utilities for logos and material textures
//!
//! Every decoded image is normalized to 8-bit straight-alpha RGBA so that
//! canvases, atlases, and the software renderer share a single pixel layout.

use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, RgbaImage};

use crate::assets::AssetError;
use crate::foundation::color::Rgba;

/// Decode an image from memory (PNG or JPEG)
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, AssetError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| AssetError::LoadFailed(format!("Failed to decode image from bytes: {e}")))?;

    let rgba = img.to_rgba8();
    log::debug!("Decoded image {}x{} from memory", rgba.width(), rgba.height());
    Ok(rgba)
}

/// Load an image from a file path
pub fn load_image_file<P: AsRef<Path>>(path: P) -> Result<RgbaImage, AssetError> {
    let path_ref = path.as_ref();
    log::debug!("Loading image from: {:?}", path_ref);

    let img = image::open(path_ref)
        .map_err(|e| AssetError::LoadFailed(format!("Failed to load image {}: {e}", path_ref.display())))?;

    let rgba = img.to_rgba8();
    log::info!("Loaded image {}x{} from {:?}", rgba.width(), rgba.height(), path_ref);
    Ok(rgba)
}

/// Create a solid color image (used for blank atlases and placeholders)
pub fn solid_color(width: u32, height: u32, color: Rgba) -> RgbaImage {
    RgbaImage::from_pixel(width, height, color.to_pixel())
}

/// Encode an image as PNG bytes
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, AssetError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| AssetError::EncodeFailed(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_image() {
        let img = solid_color(4, 4, Rgba::rgb(255, 0, 0));
        assert_eq!(img.dimensions(), (4, 4));
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(img.as_raw().len(), 4 * 4 * 4);
    }

    #[test]
    fn test_png_encode_decode() {
        let mut img = solid_color(3, 2, Rgba::TRANSPARENT);
        img.put_pixel(2, 1, Rgba::new(10, 20, 30, 128).to_pixel());

        let bytes = encode_png(&img).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_garbage_bytes_fail() {
        assert!(matches!(decode_image(b"not an image"), Err(AssetError::LoadFailed(_))));
    }
}
