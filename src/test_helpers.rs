//! Shared test utilities for the cvd-sim test suite.
//!
//! Synthetic image fixtures written with the `image` crate encoders, plus a
//! few non-image files for exercising the validator.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let path = tmp.path().join("photo.jpg");
//! create_test_jpeg(&path, 200, 150);
//! ```

use image::{ExtendedColorType, GrayImage, ImageEncoder, RgbImage};
use std::path::Path;

// =========================================================================
// Pixel buffers
// =========================================================================

/// A buffer where every pixel differs from its neighbours.
pub fn gradient_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

pub fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, image::Rgb(rgb))
}

// =========================================================================
// Files on disk
// =========================================================================

/// Create a small valid JPEG file with the given dimensions.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = gradient_image(width, height);
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
}

/// Create a solid-color RGB PNG.
pub fn create_test_png(path: &Path, width: u32, height: u32, rgb: [u8; 3]) {
    solid_image(width, height, rgb).save(path).unwrap();
}

/// Create a single-channel PNG.
pub fn create_test_png_gray(path: &Path, width: u32, height: u32) {
    let img = GrayImage::from_fn(width, height, |x, _| image::Luma([(x * 7 % 256) as u8]));
    img.save(path).unwrap();
}

/// Create a GIF (palette-quantized, so pixel values are approximate).
pub fn create_test_gif(path: &Path, width: u32, height: u32) {
    let img = gradient_image(width, height);
    let file = std::fs::File::create(path).unwrap();
    image::codecs::gif::GifEncoder::new(file)
        .encode(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
}

/// A binary PPM. Sniffable, but not on the input allow-list.
pub fn create_test_ppm(path: &Path, width: u32, height: u32) {
    let mut bytes = format!("P6\n{width} {height}\n255\n").into_bytes();
    bytes.extend(gradient_image(width, height).into_raw());
    std::fs::write(path, bytes).unwrap();
}

/// A PNG whose header is intact but whose pixel data is cut off.
pub fn create_truncated_png(path: &Path, width: u32, height: u32) {
    let tmp = path.with_extension("full.png");
    gradient_image(width, height).save(&tmp).unwrap();
    let bytes = std::fs::read(&tmp).unwrap();
    std::fs::remove_file(&tmp).unwrap();
    std::fs::write(path, &bytes[..bytes.len().min(60)]).unwrap();
}

/// Write arbitrary bytes, e.g. a text file pretending to be an image.
pub fn write_bytes(path: &Path, bytes: &[u8]) {
    std::fs::write(path, bytes).unwrap();
}
