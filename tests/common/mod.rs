//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use image::{Rgb, RgbImage};
use screenscout::capture::SessionConfig;
use tempfile::TempDir;

/// Session timings short enough for tests against the mock backend
pub fn fast_config() -> SessionConfig {
    SessionConfig::builder()
        .poll_interval(Duration::from_millis(2))
        .retry_backoff(Duration::from_millis(5))
        .push_wait(Duration::from_millis(10))
        .first_frame_timeout(Duration::from_millis(400))
        .resolve_timeout(Duration::from_secs(2))
        .build()
}

/// 10x10 solid red square
pub fn red_square() -> RgbImage {
    RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]))
}

/// Small template with structure in every channel
pub fn gradient_marker(size: u32) -> RgbImage {
    RgbImage::from_fn(size, size, |x, y| {
        Rgb([(x * 255 / size) as u8, (y * 255 / size) as u8, ((x + y) * 7 % 256) as u8])
    })
}

/// Black canvas with `patch` pasted at `(x, y)`
pub fn scene_with(width: u32, height: u32, patch: &RgbImage, x: u32, y: u32) -> RgbImage {
    let mut scene = RgbImage::new(width, height);
    image::imageops::replace(&mut scene, patch, i64::from(x), i64::from(y));
    scene
}

/// Saves `image` as PNG inside `dir` and returns its path
pub fn save_png(dir: &TempDir, name: &str, image: &RgbImage) -> PathBuf {
    let path = dir.path().join(name);
    image.save(&path).expect("failed to save test image");
    path
}

/// Encodes `image` to PNG bytes in memory
pub fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("failed to encode test image");
    bytes
}

/// Converts to top-down BGRA rows padded with `padding` junk bytes each
pub fn to_bgra(image: &RgbImage, padding: usize) -> (Vec<u8>, usize) {
    let stride = image.width() as usize * 4 + padding;
    let mut data = Vec::with_capacity(stride * image.height() as usize);
    for row in image.rows() {
        for pixel in row {
            let [r, g, b] = pixel.0;
            data.extend_from_slice(&[b, g, r, 255]);
        }
        data.extend(std::iter::repeat_n(0xAB, padding));
    }
    (data, stride)
}
