//! Single-image simulation step.
//!
//! [`Simulator::simulate`] turns one decoded RGB buffer into the view of one
//! [`DeficiencyType`]:
//!
//! - `Grayscale` is a luminance reduction replicated to three channels.
//!   Algorithm and severity do not apply.
//! - Everything else goes through a [`CvdTransform`] resolved from the
//!   configured [`Algorithm`] (see [`transforms::builtin_transform`]).
//!
//! The output always has the input's dimensions and three channels. A
//! transform that fails or hands back a differently sized buffer is reported
//! as a [`SimulationError`] naming the type attempted; no partial buffer is
//! ever returned.
//!
//! A `Simulator` holds no mutable state, so a single instance is shared by
//! every worker in a batch.

mod color;
pub mod transforms;

use crate::config::SimulationConfig;
use crate::types::{Algorithm, Deficiency, DeficiencyType};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("severity {0} outside 0.0..=1.0")]
    Severity(f64),
    #[error("transform returned {got_w}x{got_h}, expected {want_w}x{want_h}")]
    ShapeMismatch {
        want_w: u32,
        want_h: u32,
        got_w: u32,
        got_h: u32,
    },
    #[error("{0}")]
    Failed(String),
}

/// A transform failure for one (image, deficiency type) pair.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{deficiency} simulation failed: {source}")]
pub struct SimulationError {
    pub deficiency: DeficiencyType,
    #[source]
    pub source: TransformError,
}

/// The colorimetric transform seam.
///
/// Implementations map an sRGB buffer to its dichromat-perceived equivalent
/// for one deficiency axis, blended toward the original by `severity`.
pub trait CvdTransform: Send + Sync {
    fn simulate_cvd(
        &self,
        image: &RgbImage,
        deficiency: Deficiency,
        severity: f64,
    ) -> Result<RgbImage, TransformError>;
}

/// Resolved transform plus the severity it runs at.
pub struct Simulator {
    transform: Box<dyn CvdTransform>,
    severity: f64,
}

impl Simulator {
    pub fn new(algorithm: Algorithm, severity: f64) -> Self {
        Self::with_transform(transforms::builtin_transform(algorithm), severity)
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.algorithm(), config.severity())
    }

    /// Use a caller-supplied transform instead of a built-in one.
    pub fn with_transform(transform: Box<dyn CvdTransform>, severity: f64) -> Self {
        Self {
            transform,
            severity,
        }
    }

    pub fn severity(&self) -> f64 {
        self.severity
    }

    pub fn simulate(
        &self,
        image: &RgbImage,
        deficiency: DeficiencyType,
    ) -> Result<RgbImage, SimulationError> {
        let Some(axis) = deficiency.axis() else {
            return Ok(to_grayscale(image));
        };

        let fail = |source| SimulationError { deficiency, source };
        let out = self
            .transform
            .simulate_cvd(image, axis, self.severity)
            .map_err(fail)?;

        if out.dimensions() != image.dimensions() {
            return Err(fail(TransformError::ShapeMismatch {
                want_w: image.width(),
                want_h: image.height(),
                got_w: out.width(),
                got_h: out.height(),
            }));
        }
        Ok(out)
    }
}

/// Rec. 709 luma replicated into R, G and B.
pub fn to_grayscale(image: &RgbImage) -> RgbImage {
    let luma = image::imageops::grayscale(image);
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let l = luma.get_pixel(x, y)[0];
        image::Rgb([l, l, l])
    })
}
