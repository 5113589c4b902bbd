//! Output file naming.
//!
//! Every simulated image is written as
//!
//! ```text
//! {base}_image_{timestamp}.{ext}
//! ```
//!
//! where `base` is the deficiency token (`protan`, `deutan`, `tritan`, `bw`)
//! or a caller-supplied custom name, and `timestamp` is local time formatted
//! `%Y%m%d_%H%M%S`.
//!
//! Two units writing the same deficiency type in the same second would
//! collide under plain deficiency naming. [`OutputNaming::InputStem`] prefixes
//! an input key (`{stem}-{tag}_{type}`), where `tag` is a short hash of the
//! absolute input path, so `a/img.png` and `b/img.png` stay apart.

use crate::types::{DeficiencyType, OutputFormat};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Hex digits of the path hash kept in an input key.
const INPUT_TAG_LEN: usize = 8;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Current local time in [`TIMESTAMP_FORMAT`].
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `{base}_image_{timestamp}.{ext}`.
pub fn output_filename(base: &str, timestamp: &str, format: OutputFormat) -> String {
    format!("{base}_image_{timestamp}.{}", format.extension())
}

/// Short lower-hex hash of the absolute form of `input`.
pub fn input_tag(input: &Path) -> String {
    let absolute = input
        .canonicalize()
        .or_else(|_| std::path::absolute(input))
        .unwrap_or_else(|_| input.to_path_buf());
    Sha256::digest(absolute.as_os_str().as_encoded_bytes())
        .iter()
        .take(INPUT_TAG_LEN / 2)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// `{stem}-{tag}`, unique per input path.
pub fn input_key(input: &Path) -> String {
    let tag = input_tag(input);
    match input.file_stem().map(|s| s.to_string_lossy()) {
        Some(stem) if !stem.is_empty() => format!("{stem}-{tag}"),
        _ => tag,
    }
}

/// How the `base` part of an output name is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputNaming {
    /// Deficiency token only.
    #[default]
    Deficiency,
    /// `{input stem}-{path tag}_{deficiency token}`.
    InputStem,
    /// Caller-chosen name. When a unit writes several types the type token
    /// is appended (`{name}_{type}`) so they stay distinct.
    Custom(String),
}

impl OutputNaming {
    pub fn base(&self, input: &Path, deficiency: DeficiencyType, several_types: bool) -> String {
        match self {
            OutputNaming::Deficiency => deficiency.value().to_string(),
            OutputNaming::InputStem => format!("{}_{}", input_key(input), deficiency.value()),
            OutputNaming::Custom(name) if several_types => {
                format!("{name}_{}", deficiency.value())
            }
            OutputNaming::Custom(name) => name.clone(),
        }
    }

    /// Name stem for the metadata sidecar of `input`.
    pub fn sidecar_stem(&self, input: &Path) -> String {
        match self {
            OutputNaming::InputStem => input_key(input),
            _ => input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}
