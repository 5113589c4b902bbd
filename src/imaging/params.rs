//! Parameter types for the writer.
//!
//! These structs describe *what* to write, not *how*. They are the interface
//! between the [`process`](crate::process) unit of work (which decides where
//! each simulated image goes) and the [`backend`](super::backend) (which does
//! the encoding). Keeping them separate lets tests swap in a mock backend
//! without touching the processing logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–95, default 95). Clamped on construction.
//! - [`EncodeParams`]: Output path, format, quality and optimize flag for one write.

use crate::config::SimulationConfig;
use crate::types::OutputFormat;
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-95).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u32);

impl Quality {
    pub const MAX: u32 = 95;

    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, Self::MAX))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(Self::MAX)
    }
}

/// Parameters for a single encode-to-disk operation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeParams {
    pub output: PathBuf,
    pub format: OutputFormat,
    pub quality: Quality,
    /// PNG: best compression. JPEG: recorded only, the encoder has no
    /// separate optimize pass.
    pub optimize: bool,
}

impl EncodeParams {
    pub fn from_config(output: PathBuf, config: &SimulationConfig) -> Self {
        Self {
            output,
            format: config.output_format(),
            quality: Quality::new(config.quality()),
            optimize: config.optimize(),
        }
    }

    /// Quality actually handed to the encoder. Lossless formats take none.
    pub fn effective_quality(&self) -> Option<Quality> {
        self.format.is_lossy().then_some(self.quality)
    }
}
