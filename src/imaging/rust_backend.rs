//! Image codec backend built on the `image` crate.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, BMP, TIFF, WebP) | `ImageReader::with_guessed_format` + `decode` |
//! | Mode conversion | `DynamicImage::into_rgb8` |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` |
//! | Encode → PNG | `PngEncoder::new_with_quality` (`Best` compression when optimizing) |
//! | Encode → WebP | `WebPEncoder::new_lossless` |
//! | Encode → TIFF / BMP | `TiffEncoder` / `BmpEncoder` |
//!
//! Encoded bytes are staged in a sibling temp file and renamed over the
//! target, so a failed write never leaves a truncated image at the output path.

use super::backend::{BackendError, ImageBackend};
use super::params::EncodeParams;
use crate::types::OutputFormat;
use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::tiff::TiffEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, ImageReader, RgbImage};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::LazyLock;

const STAGING_PREFIX: &str = ".cvd-sim-";

/// Extensions whose decoders are compiled in.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("gif", ImageFormat::Gif),
    ("bmp", ImageFormat::Bmp),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Whether `path` has one of the [`supported_input_extensions`].
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            supported_input_extensions()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
}

/// Backend using the `image` crate codecs.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `image` into an in-memory buffer in the requested container.
fn encode_to_vec(image: &RgbImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError> {
    let (w, h) = image.dimensions();
    let raw = image.as_raw();
    let mut buf = Cursor::new(Vec::new());

    let result = match params.format {
        OutputFormat::Jpeg => {
            let quality = params.quality.value() as u8;
            JpegEncoder::new_with_quality(&mut buf, quality).write_image(
                raw,
                w,
                h,
                ExtendedColorType::Rgb8,
            )
        }
        OutputFormat::Png => {
            let compression = if params.optimize {
                CompressionType::Best
            } else {
                CompressionType::Default
            };
            PngEncoder::new_with_quality(&mut buf, compression, FilterType::Adaptive).write_image(
                raw,
                w,
                h,
                ExtendedColorType::Rgb8,
            )
        }
        // The pure-Rust WebP encoder is lossless only; quality is not applied.
        OutputFormat::Webp => {
            WebPEncoder::new_lossless(&mut buf).write_image(raw, w, h, ExtendedColorType::Rgb8)
        }
        OutputFormat::Tiff => {
            TiffEncoder::new(&mut buf).write_image(raw, w, h, ExtendedColorType::Rgb8)
        }
        OutputFormat::Bmp => {
            BmpEncoder::new(&mut buf).write_image(raw, w, h, ExtendedColorType::Rgb8)
        }
    };

    result.map_err(|e| {
        BackendError::Encode(format!("{} encode failed: {}", params.format.name(), e))
    })?;
    Ok(buf.into_inner())
}

impl ImageBackend for RustBackend {
    fn decode(&self, path: &Path) -> Result<RgbImage, BackendError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let img = reader.decode().map_err(|e| {
            BackendError::Decode(format!("Failed to decode {}: {}", path.display(), e))
        })?;
        Ok(img.into_rgb8())
    }

    fn encode(&self, image: &RgbImage, params: &EncodeParams) -> Result<(), BackendError> {
        let bytes = encode_to_vec(image, params)?;
        let parent = params
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)?;

        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".part")
            .tempfile_in(parent)?;
        staged.write_all(&bytes)?;
        staged.persist(&params.output).map_err(|e| e.error)?;
        Ok(())
    }
}
