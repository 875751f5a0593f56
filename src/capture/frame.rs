//! Captured pixel frames
//!
//! A [`Frame`] is a top-down pixel buffer in BGRA or BGR byte order, with a
//! row stride that may include padding. Frames are immutable once published;
//! the frame buffer hands out `Arc<Frame>` snapshots.
//!
//! # Examples
//!
//! ```
//! use screenscout::capture::{Frame, PixelFormat, PixelRect};
//!
//! let frame = Frame::from_test_pattern(64, 48);
//! assert_eq!(frame.format(), PixelFormat::Bgra8);
//!
//! let cropped = frame.crop(PixelRect::new(8, 8, 32, 16)).unwrap();
//! assert_eq!(cropped.dimensions(), (32, 16));
//!
//! let rgb = cropped.to_rgb_image().unwrap();
//! assert_eq!(rgb.dimensions(), (32, 16));
//! ```

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{ScoutError, ScoutResult};
use crate::model::PixelRect;

/// Byte layout of one pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Blue, green, red, alpha
    Bgra8,
    /// Blue, green, red
    Bgr8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 => 4,
            PixelFormat::Bgr8 => 3,
        }
    }
}

/// One captured picture of the target surface
#[derive(Clone, Debug)]
pub struct Frame {
    width:       u32,
    height:      u32,
    stride:      usize,
    format:      PixelFormat,
    data:        Vec<u8>,
    sequence:    u64,
    captured_at: DateTime<Utc>,
}

impl Frame {
    /// Wraps a raw pixel buffer, validating stride and length
    pub fn new(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> ScoutResult<Self> {
        validate_layout(data.len(), width, height, stride, format)?;
        Ok(Self {
            width,
            height,
            stride,
            format,
            data,
            sequence: 0,
            captured_at: Utc::now(),
        })
    }

    /// Wraps tightly packed BGRA bytes
    pub fn from_bgra(width: u32, height: u32, data: Vec<u8>) -> ScoutResult<Self> {
        Self::new(width, height, width as usize * 4, PixelFormat::Bgra8, data)
    }

    /// Builds a BGRA frame from an RGB image
    pub fn from_rgb_image(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for pixel in image.pixels() {
            let [r, g, b] = pixel.0;
            data.extend_from_slice(&[b, g, r, 255]);
        }
        Self {
            width,
            height,
            stride: width as usize * 4,
            format: PixelFormat::Bgra8,
            data,
            sequence: 0,
            captured_at: Utc::now(),
        }
    }

    /// Horizontal gradient test pattern, useful without a capture backend
    pub fn from_test_pattern(width: u32, height: u32) -> Self {
        let image = RgbImage::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            image::Rgb([r, g, 128])
        });
        Self::from_rgb_image(&image)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Publication order assigned by the frame buffer (0 if never published)
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    /// Pixel bytes of row `y`, without padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        let len = self.width as usize * self.format.bytes_per_pixel();
        &self.data[start..start + len]
    }

    /// Copies a sub-rectangle into a new tightly packed frame
    pub fn crop(&self, rect: PixelRect) -> ScoutResult<Self> {
        if rect.is_empty() || !rect.fits_within(self.width, self.height) {
            return Err(ScoutError::invalid_parameter(
                "crop",
                format!(
                    "{}x{} at ({}, {}) does not fit in {}x{}",
                    rect.width, rect.height, rect.x, rect.y, self.width, self.height
                ),
            ));
        }

        let bpp = self.format.bytes_per_pixel();
        let row_len = rect.width as usize * bpp;
        let mut data = Vec::with_capacity(row_len * rect.height as usize);
        for y in rect.y..rect.y + rect.height {
            let start = y as usize * self.stride + rect.x as usize * bpp;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        Ok(Self {
            width: rect.width,
            height: rect.height,
            stride: row_len,
            format: self.format,
            data,
            sequence: self.sequence,
            captured_at: self.captured_at,
        })
    }

    /// Converts to a 3-channel RGB image, dropping alpha
    pub fn to_rgb_image(&self) -> ScoutResult<RgbImage> {
        pixels_to_rgb(&self.data, self.width, self.height, self.stride, self.format)
    }
}

fn validate_layout(
    len: usize,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
) -> ScoutResult<()> {
    if width == 0 || height == 0 {
        return Err(ScoutError::ImageError(format!(
            "frame dimensions must be positive, got {width}x{height}"
        )));
    }
    let row_len = width as usize * format.bytes_per_pixel();
    if stride < row_len {
        return Err(ScoutError::ImageError(format!(
            "stride {stride} is smaller than row length {row_len}"
        )));
    }
    // The last row does not need its padding
    let required = stride * (height as usize - 1) + row_len;
    if len < required {
        return Err(ScoutError::ImageError(format!(
            "buffer holds {len} bytes but {width}x{height} with stride {stride} needs {required}"
        )));
    }
    Ok(())
}

/// Converts a top-down BGR(A) buffer with row padding into an RGB image
pub fn pixels_to_rgb(
    data: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
) -> ScoutResult<RgbImage> {
    validate_layout(data.len(), width, height, stride, format)?;

    let bpp = format.bytes_per_pixel();
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height as usize {
        let row = &data[y * stride..y * stride + width as usize * bpp];
        for px in row.chunks_exact(bpp) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| ScoutError::ImageError("converted buffer has wrong length".to_string()))
}
