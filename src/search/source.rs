//! Source images supplied by the caller for batch search
//!
//! The boundary takes one byte buffer plus `width`, `height` and `stride`:
//! a positive width means raw top-down BGRA pixels, a width of zero means
//! compressed image bytes (PNG, JPEG, BMP, WebP) to decode.

use image::RgbImage;

use crate::capture::{PixelFormat, pixels_to_rgb};
use crate::error::{ScoutError, ScoutResult};

/// Pixels handed to the matcher out-of-band
#[derive(Debug, Clone, Copy)]
pub enum SourceImage<'a> {
    /// Top-down BGRA rows of `stride` bytes
    Bgra {
        data:   &'a [u8],
        width:  u32,
        height: u32,
        stride: usize,
    },
    /// Compressed image file bytes
    Encoded(&'a [u8]),
}

impl<'a> SourceImage<'a> {
    /// Interprets boundary arguments
    ///
    /// `stride <= 0` means tightly packed rows (`width * 4`).
    pub fn from_boundary(data: &'a [u8], width: i32, height: i32, stride: i32) -> ScoutResult<Self> {
        if data.is_empty() {
            return Err(ScoutError::invalid_parameter("image", "source buffer is empty"));
        }
        match width {
            0 => Ok(SourceImage::Encoded(data)),
            w if w > 0 && height > 0 => Ok(SourceImage::Bgra {
                data,
                width: w as u32,
                height: height as u32,
                stride: if stride > 0 {
                    stride as usize
                } else {
                    w as usize * PixelFormat::Bgra8.bytes_per_pixel()
                },
            }),
            _ => Err(ScoutError::invalid_parameter(
                "dimensions",
                format!("{width}x{height} is not a valid raw image size"),
            )),
        }
    }

    /// Converts to the 3-channel image the matcher works on
    pub fn decode(&self) -> ScoutResult<RgbImage> {
        match *self {
            SourceImage::Bgra {
                data,
                width,
                height,
                stride,
            } => pixels_to_rgb(data, width, height, stride, PixelFormat::Bgra8),
            SourceImage::Encoded(bytes) => {
                let decoded = image::load_from_memory(bytes)
                    .map_err(|e| ScoutError::ImageError(format!("failed to decode source image: {e}")))?;
                let rgb = decoded.to_rgb8();
                if rgb.width() == 0 || rgb.height() == 0 {
                    return Err(ScoutError::ImageError("decoded source image is empty".to_string()));
                }
                Ok(rgb)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb};

    use super::*;

    #[test]
    fn test_raw_with_padding() {
        // 2x2 BGRA with 4 bytes of padding per row
        let data = [
            0, 0, 255, 255, 0, 255, 0, 255, 9, 9, 9, 9, //
            255, 0, 0, 255, 10, 20, 30, 0, 9, 9, 9, 9,
        ];
        let source = SourceImage::from_boundary(&data, 2, 2, 12).unwrap();
        let rgb = source.decode().unwrap();

        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([0, 255, 0]));
        assert_eq!(rgb.get_pixel(0, 1), &Rgb([0, 0, 255]));
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([30, 20, 10]));
    }

    #[test]
    fn test_non_positive_stride_means_packed() {
        let data = vec![7u8; 3 * 2 * 4];
        match SourceImage::from_boundary(&data, 3, 2, 0).unwrap() {
            SourceImage::Bgra { stride, .. } => assert_eq!(stride, 12),
            other => panic!("unexpected {other:?}"),
        }
        assert!(SourceImage::from_boundary(&data, 3, 2, -5).unwrap().decode().is_ok());
    }

    #[test]
    fn test_short_buffer_fails_decode() {
        let data = vec![0u8; 10];
        let source = SourceImage::from_boundary(&data, 4, 4, 16).unwrap();
        assert!(source.decode().is_err());
    }

    #[test]
    fn test_invalid_dimensions() {
        let data = vec![0u8; 16];
        assert!(SourceImage::from_boundary(&data, -1, 2, 0).is_err());
        assert!(SourceImage::from_boundary(&data, 2, 0, 0).is_err());
        assert!(SourceImage::from_boundary(&[], 2, 2, 0).is_err());
    }

    #[test]
    fn test_encoded_png() {
        let image = RgbImage::from_pixel(5, 4, Rgb([1, 2, 3]));
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();

        let decoded = SourceImage::from_boundary(&bytes, 0, 0, 0).unwrap().decode().unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_encoded_garbage() {
        let source = SourceImage::from_boundary(b"nope", 0, 0, 0).unwrap();
        assert!(matches!(source.decode(), Err(ScoutError::ImageError(_))));
    }
}
