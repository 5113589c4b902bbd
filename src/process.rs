//! The per-image unit of work.
//!
//! ```text
//! validate → decode → simulate each type → encode each type → [sidecar]
//! ```
//!
//! A [`Processor`] runs this pipeline for one input path. Any failure along
//! the way fails the whole unit: the caller either gets every requested
//! output path or an error, never a partial map. Files already written for
//! earlier types are left on disk; only the returned record is all-or-nothing.
//!
//! The validator's decode is thrown away. The backend opens the file again
//! for the real decode.
//!
//! ## Output location
//!
//! Every output name goes through
//! [`sanitize_output_path`](crate::security::sanitize_output_path) against
//! the configured output directory. Metadata sidecars, when enabled, land in
//! the same directory as `{input stem}_metadata.json` (`{input key}_metadata.json`
//! under [`OutputNaming::InputStem`]).

use crate::config::SimulationConfig;
use crate::imaging::{EncodeParams, ImageBackend, ImageError};
use crate::metadata::{self, MetadataError, SIDECAR_SUFFIX};
use crate::naming::{self, OutputNaming};
use crate::profiling::{NoopProfiler, Profiler, timed};
use crate::security::{self, SecurityValidator, SecurityViolation};
use crate::simulate::{SimulationError, Simulator};
use crate::types::DeficiencyType;
use image::RgbImage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Security(#[from] SecurityViolation),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error("Metadata export failed: {0}")]
    Metadata(#[from] MetadataError),
}

static NOOP: NoopProfiler = NoopProfiler;

/// Everything one unit of work needs, shared read-only across workers.
pub struct Processor<'a, B: ImageBackend> {
    backend: &'a B,
    config: SimulationConfig,
    simulator: Simulator,
    validator: SecurityValidator,
    profiler: &'a dyn Profiler,
    naming: OutputNaming,
    export_metadata: bool,
    timestamp: Option<String>,
}

impl<'a, B: ImageBackend> Processor<'a, B> {
    pub fn new(backend: &'a B, config: SimulationConfig) -> Self {
        Self {
            backend,
            simulator: Simulator::from_config(&config),
            validator: SecurityValidator::from_config(&config),
            config,
            profiler: &NOOP,
            naming: OutputNaming::default(),
            export_metadata: false,
            timestamp: None,
        }
    }

    pub fn with_simulator(mut self, simulator: Simulator) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn with_profiler(mut self, profiler: &'a dyn Profiler) -> Self {
        self.profiler = profiler;
        self
    }

    pub fn with_naming(mut self, naming: OutputNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Write a provenance sidecar per processed input.
    pub fn with_metadata(mut self, enabled: bool) -> Self {
        self.export_metadata = enabled;
        self
    }

    /// Fixed timestamp for every output name instead of the wall clock.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn backend(&self) -> &B {
        self.backend
    }

    pub fn profiler(&self) -> &dyn Profiler {
        self.profiler
    }

    /// Simulate every deficiency type for `path`.
    pub fn process_image(
        &self,
        path: &Path,
    ) -> Result<BTreeMap<DeficiencyType, PathBuf>, ProcessError> {
        self.process_types(path, &DeficiencyType::ALL)
    }

    /// Simulate a single deficiency type for `path`.
    pub fn process_image_type(
        &self,
        path: &Path,
        deficiency: DeficiencyType,
    ) -> Result<PathBuf, ProcessError> {
        let started = Instant::now();
        let image = self.load(path)?;
        let output = self.write_type(path, &image, deficiency, &self.timestamp(), false)?;

        if self.export_metadata {
            let outputs = BTreeMap::from([(deficiency, output.clone())]);
            self.write_sidecar(path, &outputs, started)?;
        }
        Ok(output)
    }

    /// Run the full unit of work for the given types.
    pub fn process_types(
        &self,
        path: &Path,
        types: &[DeficiencyType],
    ) -> Result<BTreeMap<DeficiencyType, PathBuf>, ProcessError> {
        let started = Instant::now();
        let image = self.load(path)?;
        let timestamp = self.timestamp();
        let several = types.len() > 1;

        let mut outputs = BTreeMap::new();
        for &ty in types {
            let output = self.write_type(path, &image, ty, &timestamp, several)?;
            outputs.insert(ty, output);
        }

        if self.export_metadata {
            self.write_sidecar(path, &outputs, started)?;
        }

        info!("Image processing complete: {} outputs", outputs.len());
        Ok(outputs)
    }

    fn timestamp(&self) -> String {
        self.timestamp
            .clone()
            .unwrap_or_else(naming::timestamp_now)
    }

    /// Validate, then decode afresh.
    fn load(&self, path: &Path) -> Result<RgbImage, ProcessError> {
        info!("Processing image: {}", path.display());

        timed(self.profiler, "validate", || self.validator.validate(path))?;
        let image = timed(self.profiler, "decode", || self.backend.decode(path))
            .map_err(|e| ImageError::new(path, e))?;
        debug!(
            "Loaded {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(image)
    }

    /// Simulate one type and encode it under the output directory.
    fn write_type(
        &self,
        input: &Path,
        image: &RgbImage,
        ty: DeficiencyType,
        timestamp: &str,
        several: bool,
    ) -> Result<PathBuf, ProcessError> {
        let simulated = timed(self.profiler, "simulate", || self.simulator.simulate(image, ty))?;

        let base = self.naming.base(input, ty, several);
        let filename = naming::output_filename(&base, timestamp, self.config.output_format());
        let output = security::sanitize_output_path(self.config.output_directory(), &filename)?;

        let params = EncodeParams::from_config(output.clone(), &self.config);
        timed(self.profiler, "encode", || {
            self.backend.encode(&simulated, &params)
        })
        .map_err(|e| ImageError::new(&output, e))?;

        info!("Processed {}: {}", ty.name(), output.display());
        Ok(output)
    }

    fn write_sidecar(
        &self,
        input: &Path,
        outputs: &BTreeMap<DeficiencyType, PathBuf>,
        started: Instant,
    ) -> Result<PathBuf, ProcessError> {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let record = metadata::create_metadata(input, outputs, &self.config, elapsed_ms, "");
        let stem = self.naming.sidecar_stem(input);
        let target = security::sanitize_output_path(
            self.config.output_directory(),
            &format!("{stem}{SIDECAR_SUFFIX}.json"),
        )?;
        Ok(metadata::export_metadata(&record, &target)?)
    }
}
