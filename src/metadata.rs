//! Provenance metadata for simulation runs.
//!
//! Each processed input can get a JSON sidecar recording everything needed to
//! reproduce its outputs:
//!
//! ```json
//! {
//!   "version": "0.3.0",
//!   "timestamp": "2024-05-01T12:30:00Z",
//!   "input_file": "photos/cat.jpg",
//!   "input_checksum": "9f86d0…",
//!   "output_files": { "PROTAN": "outputs/cat_protan_image_20240501_143000.png" },
//!   "config": { "algorithm": "BRETTEL_1997", "severity": 0.8, … },
//!   "system_info": { "os": "linux", "arch": "x86_64", … },
//!   "execution_time_ms": 184.2,
//!   "notes": ""
//! }
//! ```
//!
//! Writing a record with [`export_metadata`] and reading it back with
//! [`load_metadata`] yields an equal [`SimulationMetadata`].

use crate::config::SimulationConfig;
use crate::types::DeficiencyType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SIDECAR_SUFFIX: &str = "_metadata";

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetadata {
    pub version: String,
    /// UTC, second precision, `Z` suffix.
    pub timestamp: String,
    pub input_file: String,
    pub input_checksum: String,
    #[serde(default)]
    pub output_files: BTreeMap<String, String>,
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub system_info: BTreeMap<String, String>,
    #[serde(default)]
    pub execution_time_ms: f64,
    #[serde(default)]
    pub notes: String,
}

fn digest_reader<D: Digest>(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}

/// Lower-hex content hash of the file at `path`, read in 8 KiB chunks.
pub fn calculate_checksum(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    let file = File::open(path)?;
    match algorithm {
        HashAlgorithm::Sha256 => digest_reader::<Sha256>(file),
        HashAlgorithm::Sha512 => digest_reader::<Sha512>(file),
    }
}

/// Host and build details worth recording next to results.
pub fn get_system_info() -> BTreeMap<String, String> {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get().to_string())
        .unwrap_or_else(|_| "unknown".into());
    let git_hash = match env!("GIT_HASH") {
        "" => "unknown",
        hash => hash,
    };

    BTreeMap::from([
        (
            "platform".to_string(),
            format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        ),
        ("os".to_string(), std::env::consts::OS.to_string()),
        ("arch".to_string(), std::env::consts::ARCH.to_string()),
        ("family".to_string(), std::env::consts::FAMILY.to_string()),
        ("cpu_count".to_string(), cpus),
        (
            "cvd_sim_version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        ),
        ("git_hash".to_string(), git_hash.to_string()),
        ("build_target".to_string(), env!("BUILD_TARGET").to_string()),
    ])
}

fn utc_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Build the record for one processed input.
///
/// A checksum failure is logged and recorded as an empty string rather than
/// failing the run.
pub fn create_metadata(
    input_file: &Path,
    output_files: &BTreeMap<DeficiencyType, PathBuf>,
    config: &SimulationConfig,
    execution_time_ms: f64,
    notes: &str,
) -> SimulationMetadata {
    let input_checksum = calculate_checksum(input_file, HashAlgorithm::Sha256).unwrap_or_else(|e| {
        tracing::warn!("Could not calculate checksum for {}: {e}", input_file.display());
        String::new()
    });

    SimulationMetadata {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: utc_timestamp(),
        input_file: input_file.display().to_string(),
        input_checksum,
        output_files: output_files
            .iter()
            .map(|(ty, path)| (ty.name().to_string(), path.display().to_string()))
            .collect(),
        config: config.to_map(),
        system_info: get_system_info(),
        execution_time_ms,
        notes: notes.to_string(),
    }
}

/// Write `metadata` as pretty JSON (2-space indent), creating parent
/// directories. Returns the path written.
pub fn export_metadata(metadata: &SimulationMetadata, path: &Path) -> Result<PathBuf, MetadataError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(path, json)?;
    tracing::info!("Metadata exported: {}", path.display());
    Ok(path.to_path_buf())
}

pub fn load_metadata(path: &Path) -> Result<SimulationMetadata, MetadataError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Result of checking a sidecar against the current input and build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub metadata_valid: bool,
    pub input_file_exists: bool,
    pub checksum_match: bool,
    pub software_version_match: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl VerificationReport {
    /// Input present, unchanged, and processed by this version.
    pub fn is_reproducible(&self) -> bool {
        self.metadata_valid && self.checksum_match && self.software_version_match
    }
}

/// Compare a sidecar against `input_file` (or the input it names) and the
/// running build.
pub fn verify_reproducibility(
    metadata_path: &Path,
    input_file: Option<&Path>,
) -> Result<VerificationReport, MetadataError> {
    let metadata = load_metadata(metadata_path)?;
    let mut report = VerificationReport {
        metadata_valid: true,
        input_file_exists: false,
        checksum_match: false,
        software_version_match: false,
        warnings: Vec::new(),
        errors: Vec::new(),
    };

    let input = input_file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&metadata.input_file));
    if input.exists() {
        report.input_file_exists = true;
        match calculate_checksum(&input, HashAlgorithm::Sha256) {
            Ok(sum) if sum == metadata.input_checksum => report.checksum_match = true,
            Ok(_) => report
                .errors
                .push("Input file checksum does not match".to_string()),
            Err(e) => report.errors.push(format!("Could not verify checksum: {e}")),
        }
    } else {
        report
            .errors
            .push(format!("Input file not found: {}", input.display()));
    }

    let current = env!("CARGO_PKG_VERSION");
    if metadata.version == current {
        report.software_version_match = true;
    } else {
        report.warnings.push(format!(
            "Software version differs: metadata={}, current={current}",
            metadata.version
        ));
    }

    let system = get_system_info();
    if metadata.system_info.get("platform") != system.get("platform") {
        report
            .warnings
            .push("Platform differs, results may vary slightly".to_string());
    }

    Ok(report)
}

/// `{dir}/{stem}{suffix}.json` for an image at `{dir}/{stem}.{ext}`.
pub fn sidecar_path(image: &Path, suffix: &str) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    image.with_file_name(format!("{stem}{suffix}.json"))
}
