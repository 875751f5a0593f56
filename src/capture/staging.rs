//! Reusable CPU-side staging surface and client-area cropping
//!
//! Captured window surfaces include the non-client frame (borders, title
//! bar), so each copy is cropped to the client area before publication.

use serde::{Deserialize, Serialize};

use super::frame::{Frame, PixelFormat};
use crate::error::{ScoutError, ScoutResult};
use crate::model::{PixelRect, Region};

/// Shape of a staging allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub width:  u32,
    pub height: u32,
    pub stride: usize,
    pub format: PixelFormat,
}

impl SurfaceDesc {
    /// Tightly packed surface
    pub fn packed(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            stride: width as usize * format.bytes_per_pixel(),
            format,
        }
    }

    fn byte_len(&self) -> usize {
        self.stride * self.height as usize
    }
}

/// CPU copy of the most recent captured surface
///
/// The allocation is reused across frames and only replaced when the
/// incoming dimensions, stride or format change.
#[derive(Debug, Default)]
pub struct StagingBuffer {
    desc:          Option<SurfaceDesc>,
    data:          Vec<u8>,
    reallocations: u64,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the buffer match `desc`, returning `true` if it reallocated
    pub fn ensure(&mut self, desc: SurfaceDesc) -> bool {
        if self.desc == Some(desc) {
            return false;
        }
        tracing::debug!(
            width = desc.width,
            height = desc.height,
            stride = desc.stride,
            "Reallocating staging surface"
        );
        self.data = vec![0; desc.byte_len()];
        self.desc = Some(desc);
        self.reallocations += 1;
        true
    }

    pub fn desc(&self) -> Option<SurfaceDesc> {
        self.desc
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Number of allocations performed so far
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Copies `src` (rows of `src_stride` bytes) into the staging surface
    pub fn copy_from(&mut self, desc: SurfaceDesc, src: &[u8], src_stride: usize) -> ScoutResult<()> {
        let row_len = desc.width as usize * desc.format.bytes_per_pixel();
        let rows = desc.height as usize;
        if src_stride < row_len || src.len() < src_stride * rows.saturating_sub(1) + row_len {
            return Err(ScoutError::ImageError(format!(
                "source surface of {} bytes (stride {src_stride}) is too small for {}x{}",
                src.len(),
                desc.width,
                desc.height
            )));
        }

        self.ensure(desc);
        for y in 0..rows {
            let src_row = &src[y * src_stride..y * src_stride + row_len];
            let dst = y * desc.stride;
            self.data[dst..dst + row_len].copy_from_slice(src_row);
        }
        Ok(())
    }

    /// Publishes the staged pixels (optionally cropped) as a new frame
    pub fn to_frame(&self, crop: Option<PixelRect>) -> ScoutResult<Frame> {
        let desc = self
            .desc
            .ok_or_else(|| ScoutError::ImageError("staging surface is empty".to_string()))?;
        let frame = Frame::new(desc.width, desc.height, desc.stride, desc.format, self.data.clone())?;
        match crop {
            Some(rect) if rect != PixelRect::full(desc.width, desc.height) => frame.crop(rect),
            _ => Ok(frame),
        }
    }
}

/// Screen-space rectangle in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub left:   i32,
    pub top:    i32,
    pub right:  i32,
    pub bottom: i32,
}

impl ScreenRect {
    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }

    /// Part of `region` that lies on this rectangle, in the same coordinates
    ///
    /// `None` selects the whole rectangle. Negative coordinates are valid on
    /// a desktop whose monitors extend left of or above the primary one.
    /// Returns `None` when nothing overlaps.
    ///
    /// # Examples
    ///
    /// ```
    /// use screenscout::capture::ScreenRect;
    /// use screenscout::model::Region;
    ///
    /// // Secondary monitor to the left of a 1920x1080 primary
    /// let desktop = ScreenRect { left: -1280, top: 0, right: 1920, bottom: 1080 };
    /// let grab = desktop.clip(Some(Region::new(-1300, 100, 400, 300))).unwrap();
    /// assert_eq!(grab, ScreenRect { left: -1280, top: 100, right: -900, bottom: 400 });
    /// ```
    pub fn clip(&self, region: Option<Region>) -> Option<ScreenRect> {
        let (left, top, right, bottom) = match region {
            None => (self.left, self.top, self.right, self.bottom),
            Some(region) => {
                let right = i64::from(region.x) + i64::from(region.width);
                let bottom = i64::from(region.y) + i64::from(region.height);
                (
                    region.x,
                    region.y,
                    right.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
                    bottom.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
                )
            }
        };
        let clipped = ScreenRect {
            left:   left.max(self.left),
            top:    top.max(self.top),
            right:  right.min(self.right),
            bottom: bottom.min(self.bottom),
        };
        (clipped.left < clipped.right && clipped.top < clipped.bottom).then_some(clipped)
    }
}

/// Maps a captured window surface onto its client area
///
/// `window_bounds` is the window rectangle the surface was captured from,
/// `client_origin` the client area's top-left corner in screen coordinates.
/// The offset is clamped to the surface; an empty result falls back to the
/// whole surface.
///
/// # Examples
///
/// ```
/// use screenscout::capture::{PixelRect, ScreenRect, client_crop};
///
/// let window = ScreenRect { left: 100, top: 50, right: 916, bottom: 689 };
/// let crop = client_crop(window, (108, 81), (800, 600), (816, 639));
/// assert_eq!(crop, PixelRect::new(8, 31, 800, 600));
/// ```
pub fn client_crop(
    window_bounds: ScreenRect,
    client_origin: (i32, i32),
    client_size: (u32, u32),
    surface_size: (u32, u32),
) -> PixelRect {
    let (surface_w, surface_h) = surface_size;
    let offset_x = (client_origin.0 - window_bounds.left).clamp(0, surface_w as i32) as u32;
    let offset_y = (client_origin.1 - window_bounds.top).clamp(0, surface_h as i32) as u32;
    let width = client_size.0.min(surface_w - offset_x);
    let height = client_size.1.min(surface_h - offset_y);

    let crop = PixelRect::new(offset_x, offset_y, width, height);
    if crop.is_empty() {
        PixelRect::full(surface_w, surface_h)
    } else {
        crop
    }
}
