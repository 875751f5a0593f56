//! Encoding of captured frames into image file bytes
//!
//! `GetLatestFrame` hands the most recent frame to callers as an encoded
//! image. BMP (24-bit, no compression) is the default because it is cheap to
//! produce every frame; PNG is available when size matters.
//!
//! # Examples
//!
//! ```
//! use screenscout::{
//!     capture::Frame,
//!     util::encode::{FrameEncoding, encode_frame},
//! };
//!
//! let frame = Frame::from_test_pattern(64, 48);
//!
//! let bmp = encode_frame(&frame, FrameEncoding::Bmp).unwrap();
//! assert_eq!(&bmp[0..2], b"BM");
//!
//! let png = encode_frame(&frame, FrameEncoding::Png).unwrap();
//! assert_eq!(&png[1..4], b"PNG");
//! ```

use std::fmt;
use std::io::Cursor;

use image::{
    ImageEncoder, RgbImage,
    codecs::{
        bmp::BmpEncoder,
        png::{CompressionType, FilterType, PngEncoder},
    },
};
use serde::{Deserialize, Serialize};

use crate::{
    capture::Frame,
    error::{ScoutError, ScoutResult},
};

/// File format used when exporting a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameEncoding {
    /// 24-bit uncompressed bitmap
    #[default]
    Bmp,
    /// Lossless PNG with fast compression
    Png,
}

impl FrameEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameEncoding::Bmp => "bmp",
            FrameEncoding::Png => "png",
        }
    }

    /// Picks an encoding from a file extension (`bmp` or `png`)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "bmp" => Some(FrameEncoding::Bmp),
            "png" => Some(FrameEncoding::Png),
            _ => None,
        }
    }
}

impl fmt::Display for FrameEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encodes an RGB image as a 24-bit BMP
pub fn encode_bmp(image: &RgbImage) -> ScoutResult<Vec<u8>> {
    let (width, height) = image.dimensions();
    validate_dimensions(width, height)?;

    let mut output = Vec::new();
    let mut cursor = Cursor::new(&mut output);
    BmpEncoder::new(&mut cursor)
        .write_image(image.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| ScoutError::EncodingFailed {
            format: "bmp".to_string(),
            reason: e.to_string(),
        })?;

    Ok(output)
}

/// Encodes an RGB image as PNG
///
/// Frames are exported often, so the fast compression level is used.
pub fn encode_png(image: &RgbImage) -> ScoutResult<Vec<u8>> {
    let (width, height) = image.dimensions();
    validate_dimensions(width, height)?;

    let mut output = Vec::new();
    let encoder = PngEncoder::new_with_quality(
        Cursor::new(&mut output),
        CompressionType::Fast,
        FilterType::Adaptive,
    );
    encoder
        .write_image(image.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| ScoutError::EncodingFailed {
            format: "png".to_string(),
            reason: e.to_string(),
        })?;

    Ok(output)
}

/// Converts a frame to RGB and encodes it
pub fn encode_frame(frame: &Frame, encoding: FrameEncoding) -> ScoutResult<Vec<u8>> {
    let rgb = frame.to_rgb_image()?;
    match encoding {
        FrameEncoding::Bmp => encode_bmp(&rgb),
        FrameEncoding::Png => encode_png(&rgb),
    }
}

fn validate_dimensions(width: u32, height: u32) -> ScoutResult<()> {
    if width == 0 || height == 0 {
        return Err(ScoutError::InvalidParameter {
            parameter: "dimensions".to_string(),
            reason:    "Image dimensions must be > 0".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use image::GenericImageView;

    use super::*;

    #[test]
    fn test_encode_bmp_header() {
        let frame = Frame::from_test_pattern(31, 7);
        let bytes = encode_frame(&frame, FrameEncoding::Bmp).unwrap();

        assert_eq!(&bytes[0..2], b"BM");
        // 24 bits per pixel
        assert_eq!(u16::from_le_bytes([bytes[28], bytes[29]]), 24);
    }

    #[test]
    fn test_encode_bmp_lossless() {
        let frame = Frame::from_test_pattern(40, 30);
        let bytes = encode_frame(&frame, FrameEncoding::Bmp).unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
        assert_eq!(decoded.to_rgb8(), frame.to_rgb_image().unwrap());
    }

    #[test]
    fn test_encode_png_lossless() {
        let frame = Frame::from_test_pattern(100, 100);
        let bytes = encode_frame(&frame, FrameEncoding::Png).unwrap();

        // PNG signature
        assert_eq!(&bytes[0..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.to_rgb8(), frame.to_rgb_image().unwrap());
    }

    #[test]
    fn test_encode_rejects_empty_image() {
        let empty = RgbImage::new(0, 0);
        assert!(matches!(encode_bmp(&empty), Err(ScoutError::InvalidParameter { .. })));
        assert!(encode_png(&empty).is_err());
    }

    #[test]
    fn test_encoding_from_extension() {
        assert_eq!(FrameEncoding::from_extension("PNG"), Some(FrameEncoding::Png));
        assert_eq!(FrameEncoding::from_extension("bmp"), Some(FrameEncoding::Bmp));
        assert_eq!(FrameEncoding::from_extension("gif"), None);
        assert_eq!(FrameEncoding::default(), FrameEncoding::Bmp);
    }
}
