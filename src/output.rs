//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Batch
//!
//! ```text
//! Processing: photos/cat.jpg
//!   PROTAN       -> outputs/cat-3f2a9c01_protan_image_20240101_120000.jpg
//!   DEUTAN       -> outputs/cat-3f2a9c01_deutan_image_20240101_120000.jpg
//!   TRITAN       -> outputs/cat-3f2a9c01_tritan_image_20240101_120000.jpg
//!   GRAYSCALE    -> outputs/cat-3f2a9c01_bw_image_20240101_120000.jpg
//!
//! Complete: 1/1 images processed successfully
//! ```
//!
//! Failed inputs produce one `Error processing <path>: <reason>` line on
//! stderr and nothing on stdout.
//!
//! ## Listings
//!
//! ```text
//! Available simulation algorithms:
//!
//!   brettel_1997    - Brettel et al. 1997 - Classic algorithm, computationally efficient
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>` or `String`)
//! for testability and a `print_*` wrapper that writes to stdout or stderr.
//! Format functions are pure.

use crate::batch::{BatchResult, ItemResult, Progress};
use crate::presets::list_presets;
use crate::types::{Algorithm, DeficiencyType};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const PRESET_BLURB_CHARS: usize = 60;

// ============================================================================
// Listings
// ============================================================================

pub fn format_algorithm_list() -> Vec<String> {
    let mut lines = vec!["Available simulation algorithms:".to_string(), String::new()];
    lines.extend(Algorithm::ALL.iter().map(|a| {
        format!("  {:15} - {}", a.name().to_ascii_lowercase(), a.description())
    }));
    lines
}

pub fn format_type_list() -> Vec<String> {
    let mut lines = vec![
        "Available color vision deficiency types:".to_string(),
        String::new(),
    ];
    lines.extend(DeficiencyType::ALL.iter().map(|t| {
        format!("  {:12} - {}", t.name().to_ascii_lowercase(), t.description())
    }));
    lines
}

pub fn format_preset_list() -> Vec<String> {
    let mut lines = vec!["Available configuration presets:".to_string(), String::new()];
    for preset in list_presets() {
        let blurb: String = preset.description.chars().take(PRESET_BLURB_CHARS).collect();
        lines.push(format!("  {:25} - {}", preset.kind.id(), preset.name));
        lines.push(format!("      {blurb}..."));
        lines.push(String::new());
    }
    lines
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

// ============================================================================
// Batch results
// ============================================================================

fn type_lines(outputs: &BTreeMap<DeficiencyType, PathBuf>) -> Vec<String> {
    outputs
        .iter()
        .map(|(ty, path)| format!("  {:12} -> {}", ty.name(), path.display()))
        .collect()
}

/// Stdout lines for one input. Empty for a failed input.
pub fn format_item_result(input: &Path, result: &ItemResult) -> Vec<String> {
    let body = match result {
        ItemResult::All(outputs) => type_lines(outputs),
        ItemResult::Single(path) => vec![format!("  -> {}", path.display())],
        ItemResult::Failed(_) => return Vec::new(),
    };
    let mut lines = vec![String::new(), format!("Processing: {}", input.display())];
    lines.extend(body);
    lines
}

/// Stderr line for a failed input.
pub fn format_item_error(input: &Path, reason: &str) -> String {
    format!("Error processing {}: {reason}", input.display())
}

pub fn format_progress(progress: &Progress<'_>) -> String {
    let width = progress.total.to_string().len();
    let status = if progress.result.is_success() { "ok" } else { "failed" };
    format!(
        "[{:>width$}/{}] {} ({status})",
        progress.completed,
        progress.total,
        progress.path.display()
    )
}

pub fn format_summary(success: usize, total: usize) -> String {
    format!("Complete: {success}/{total} images processed successfully")
}

/// Per-input output in the order the inputs were given.
pub fn print_batch_results(order: &[PathBuf], results: &BatchResult) {
    let mut printed = std::collections::BTreeSet::new();
    for input in order {
        if !printed.insert(input) {
            continue;
        }
        let Some(result) = results.get(input) else {
            continue;
        };
        match result.failure() {
            Some(reason) => eprintln!("{}", format_item_error(input, reason)),
            None => print_lines(&format_item_result(input, result)),
        }
    }
}

// ============================================================================
// Video
// ============================================================================

pub fn format_video_result(input: &Path, outputs: &BTreeMap<DeficiencyType, PathBuf>) -> Vec<String> {
    let mut lines = vec![String::new(), format!("Processing video: {}", input.display())];
    lines.extend(type_lines(outputs));
    lines
}
