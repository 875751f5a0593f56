//! Decoded reference images with precomputed correlation statistics

use std::path::Path;

use image::RgbImage;

use crate::error::{ScoutError, ScoutResult};

/// Reference image plus the sums the ZNCC kernel needs for every placement
///
/// Pixels are interleaved RGB, so a `w x h` template is scored as one vector
/// of `w * h * 3` samples.
#[derive(Debug, Clone)]
pub struct Template {
    image:    RgbImage,
    sum:      u64,
    sum_sq:   u64,
    variance: u128,
}

impl Template {
    /// Precomputes statistics for `image`
    pub fn new(image: RgbImage) -> ScoutResult<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ScoutError::invalid_parameter(
                "template",
                "template dimensions must be > 0",
            ));
        }

        let (sum, sum_sq) = image
            .as_raw()
            .iter()
            .fold((0u64, 0u64), |(sum, sum_sq), &v| {
                let v = u64::from(v);
                (sum + v, sum_sq + v * v)
            });
        let n = u128::from(width) * u128::from(height) * 3;
        let variance = (n * u128::from(sum_sq)).saturating_sub(u128::from(sum) * u128::from(sum));

        Ok(Self {
            image,
            sum,
            sum_sq,
            variance,
        })
    }

    /// Decodes an image file into a template
    ///
    /// Failures map to distinct codes: unreadable path, undecodable data,
    /// and a decoded image with no pixels.
    pub fn from_path(path: &Path) -> ScoutResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| ScoutError::TemplatePathInvalid {
            path:   path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if bytes.is_empty() {
            return Err(ScoutError::TemplateEmpty {
                path: path.to_path_buf(),
            });
        }
        let decoded = image::load_from_memory(&bytes).map_err(|e| ScoutError::TemplateDecodeFailed {
            path:   path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let rgb = decoded.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(ScoutError::TemplateEmpty {
                path: path.to_path_buf(),
            });
        }
        Self::new(rgb)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Tightly packed RGB samples, row-major
    pub fn samples(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Number of samples (`width * height * 3`)
    pub fn sample_count(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height()) * 3
    }

    pub fn sum(&self) -> u64 {
        self.sum
    }

    pub fn sum_sq(&self) -> u64 {
        self.sum_sq
    }

    /// `n * sum(t^2) - sum(t)^2`, zero for a flat template
    pub fn centered_variance(&self) -> u128 {
        self.variance
    }

    pub fn is_flat(&self) -> bool {
        self.variance == 0
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_statistics() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([1, 2, 3]));
        image.put_pixel(1, 0, Rgb([4, 5, 6]));
        let template = Template::new(image).unwrap();

        assert_eq!(template.sample_count(), 6);
        assert_eq!(template.sum(), 21);
        assert_eq!(template.sum_sq(), 91);
        // 6 * 91 - 21^2
        assert_eq!(template.centered_variance(), 105);
    }

    #[test]
    fn test_solid_colour_is_not_flat() {
        let template = Template::new(RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]))).unwrap();
        assert!(!template.is_flat());

        let gray = Template::new(RgbImage::from_pixel(4, 4, Rgb([128, 128, 128]))).unwrap();
        assert!(gray.is_flat());
    }

    #[test]
    fn test_from_path_errors() {
        let dir = TempDir::new().unwrap();

        let missing = Template::from_path(&dir.path().join("missing.png"));
        assert!(matches!(missing, Err(ScoutError::TemplatePathInvalid { .. })));

        let garbage = dir.path().join("garbage.png");
        std::fs::write(&garbage, b"definitely not an image").unwrap();
        assert!(matches!(
            Template::from_path(&garbage),
            Err(ScoutError::TemplateDecodeFailed { .. })
        ));
    }

    #[test]
    fn test_from_path_empty_file() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty.png");
        std::fs::write(&empty, b"").unwrap();

        let result = Template::from_path(&empty);
        assert!(matches!(result, Err(ScoutError::TemplateEmpty { .. })));
        assert_eq!(result.unwrap_err().code(), -3);
    }

    #[test]
    fn test_from_path_decodes_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("icon.png");
        RgbImage::from_pixel(3, 2, Rgb([9, 8, 7])).save(&path).unwrap();

        let template = Template::from_path(&path).unwrap();
        assert_eq!(template.dimensions(), (3, 2));
    }

    #[test]
    fn test_rejects_empty_image() {
        assert!(Template::new(RgbImage::new(0, 5)).is_err());
    }
}
