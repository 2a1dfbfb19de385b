//! Decoded RGBA8 texture data.

use std::path::Path;

use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Tightly packed RGBA8 pixels, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Wraps raw pixels after checking they cover `width * height` texels.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> ResourceResult<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(ResourceError::InvalidTextureSize {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Black and white checkerboard of `size`×`size` texels split into
    /// `cells`×`cells` squares. Used when no texture is configured.
    pub fn checkerboard(size: u32, cells: u32) -> Self {
        let size = size.max(1);
        let cell = (size / cells.clamp(1, size)).max(1);

        let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                let value = if (x / cell + y / cell) % 2 == 0 { 255 } else { 0 };
                pixels.extend_from_slice(&[value, value, value, 255]);
            }
        }

        Self {
            width: size,
            height: size,
            pixels,
        }
    }
}

/// Decodes a PNG or JPEG file into RGBA8, adding an opaque alpha channel
/// where the source has none.
pub fn load_rgba(path: &Path) -> ResourceResult<TextureData> {
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }

    let rgba = image::open(path)?.into_rgba8();
    let (width, height) = rgba.dimensions();
    info!("Loaded texture '{}': {}x{}", path.display(), width, height);

    TextureData::new(width, height, rgba.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_length() {
        assert!(TextureData::new(2, 2, vec![0; 16]).is_ok());

        match TextureData::new(2, 2, vec![0; 12]) {
            Err(ResourceError::InvalidTextureSize {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 12);
            }
            other => panic!("expected size error, got {:?}", other),
        }

        assert!(TextureData::new(0, 4, Vec::new()).is_err());
    }

    #[test]
    fn test_checkerboard() {
        let tex = TextureData::checkerboard(8, 2);
        assert_eq!((tex.width, tex.height), (8, 8));
        assert_eq!(tex.pixels.len(), 8 * 8 * 4);

        let texel = |x: usize, y: usize| &tex.pixels[(y * 8 + x) * 4..(y * 8 + x) * 4 + 4];
        assert_eq!(texel(0, 0), &[255, 255, 255, 255]);
        assert_eq!(texel(3, 3), &[255, 255, 255, 255]);
        assert_eq!(texel(4, 0), &[0, 0, 0, 255]);
        assert_eq!(texel(0, 4), &[0, 0, 0, 255]);
        assert_eq!(texel(7, 7), &[255, 255, 255, 255]);
    }

    #[test]
    fn test_checkerboard_degenerate_inputs() {
        let tex = TextureData::checkerboard(0, 0);
        assert_eq!((tex.width, tex.height), (1, 1));
        assert_eq!(tex.pixels.len(), 4);
    }

    #[test]
    fn test_load_rgba_missing_file() {
        let err = load_rgba(Path::new("does/not/exist.png")).unwrap_err();
        assert!(matches!(err, ResourceError::FileNotFound(_)));
    }
}
