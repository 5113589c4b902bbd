//! Image codec backend trait and shared error types.
//!
//! The [`ImageBackend`] trait defines the two operations the pipeline needs
//! from a codec: decode a file to an RGB buffer, and encode an RGB buffer to a
//! file. Everything in between (simulation, naming, metadata) is
//! backend-agnostic.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use the recording `MockBackend` in this module.

use super::params::EncodeParams;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Decode/encode failure tied to the file it happened on.
#[derive(Error, Debug)]
#[error("image processing failed for {}: {source}", path.display())]
pub struct ImageError {
    pub path: PathBuf,
    #[source]
    pub source: BackendError,
}

impl ImageError {
    pub fn new(path: impl Into<PathBuf>, source: BackendError) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Trait for image codec backends.
///
/// `Sync` so one backend can be shared by every worker thread in a batch.
pub trait ImageBackend: Sync {
    /// Decode an image file of any supported mode into 8-bit RGB.
    fn decode(&self, path: &Path) -> Result<RgbImage, BackendError>;

    /// Encode `image` to `params.output`, creating parent directories.
    fn encode(&self, image: &RgbImage, params: &EncodeParams) -> Result<(), BackendError>;
}
