//! Named configuration profiles for common use cases.
//!
//! | Preset | Algorithm | Severity | Format | Quality | Optimize |
//! |---|---|---|---|---|---|
//! | `web_design` | MACHADO_2009 | 0.8 | WEBP | 85 | yes |
//! | `print_media` | VIENOT_1999 | 1.0 | PNG | 95 | yes |
//! | `scientific_visualization` | BRETTEL_1997 | 1.0 | TIFF | 95 | no |
//! | `mobile_app` | AUTO | 0.7 | JPEG | 90 | yes |
//! | `archival` | VISCHECK | 1.0 | PNG | 95 | yes |
//! | `fast_preview` | BRETTEL_1997 | 0.6 | JPEG | 75 | yes |
//!
//! A preset only sets the five simulation knobs above. Output directory,
//! worker count and resource limits come from the layers underneath it.

use crate::config::{ConfigValues, SimulationConfig, ValidationError};
use crate::types::{Algorithm, OutputFormat};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown preset '{name}'. Available: {available}")]
pub struct UnknownPreset {
    pub name: String,
    pub available: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PresetKind {
    WebDesign,
    PrintMedia,
    ScientificVisualization,
    MobileApp,
    Archival,
    FastPreview,
}

impl PresetKind {
    pub const ALL: [PresetKind; 6] = [
        PresetKind::WebDesign,
        PresetKind::PrintMedia,
        PresetKind::ScientificVisualization,
        PresetKind::MobileApp,
        PresetKind::Archival,
        PresetKind::FastPreview,
    ];

    /// Identifier accepted by `--preset`.
    pub fn id(self) -> &'static str {
        match self {
            PresetKind::WebDesign => "web_design",
            PresetKind::PrintMedia => "print_media",
            PresetKind::ScientificVisualization => "scientific_visualization",
            PresetKind::MobileApp => "mobile_app",
            PresetKind::Archival => "archival",
            PresetKind::FastPreview => "fast_preview",
        }
    }

    pub fn preset(self) -> &'static Preset {
        &PRESETS[self as usize]
    }
}

impl fmt::Display for PresetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for PresetKind {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPreset {
                name: s.to_string(),
                available: Self::ALL.map(PresetKind::id).join(", "),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub kind: PresetKind,
    pub name: &'static str,
    pub description: &'static str,
    pub algorithm: Algorithm,
    pub severity: f64,
    pub output_format: OutputFormat,
    pub quality: u32,
    pub optimize: bool,
    pub recommended_for: &'static [&'static str],
}

impl Preset {
    /// `base` with this preset's simulation knobs written over it.
    pub fn overlay(&self, base: &ConfigValues) -> ConfigValues {
        ConfigValues {
            algorithm: self.algorithm,
            severity: self.severity,
            output_format: self.output_format,
            quality: self.quality,
            optimize: self.optimize,
            ..base.clone()
        }
    }
}

// Indexed by `PresetKind as usize`.
static PRESETS: [Preset; 6] = [
    Preset {
        kind: PresetKind::WebDesign,
        name: "Web Design",
        description: "Optimized for web UI/UX design and accessibility testing. \
            Uses WebP format for modern browser compatibility, moderate quality \
            for fast loading, and Machado 2009 algorithm for accurate severity simulation.",
        algorithm: Algorithm::Machado2009,
        severity: 0.8,
        output_format: OutputFormat::Webp,
        quality: 85,
        optimize: true,
        recommended_for: &[
            "Website accessibility audits",
            "UI/UX design validation",
            "Frontend development testing",
            "Browser compatibility checks",
        ],
    },
    Preset {
        kind: PresetKind::PrintMedia,
        name: "Print Media",
        description: "Optimized for print media and high-resolution output. \
            Uses PNG format for lossless quality, maximum output quality, \
            and Viénot 1999 algorithm for severe deficiency accuracy.",
        algorithm: Algorithm::Vienot1999,
        severity: 1.0,
        output_format: OutputFormat::Png,
        quality: 95,
        optimize: true,
        recommended_for: &[
            "Magazine and book design",
            "Poster and flyer creation",
            "Professional photography",
            "High-resolution artwork",
        ],
    },
    Preset {
        kind: PresetKind::ScientificVisualization,
        name: "Scientific Visualization",
        description: "Optimized for data visualization and research applications. \
            Uses TIFF format for archival quality, maximum severity for \
            worst-case testing, and Brettel 1997 for computational efficiency \
            in batch processing.",
        algorithm: Algorithm::Brettel1997,
        severity: 1.0,
        output_format: OutputFormat::Tiff,
        quality: 95,
        optimize: false,
        recommended_for: &[
            "Research paper figures",
            "Data visualization validation",
            "Academic publication preparation",
            "Statistical graphics testing",
        ],
    },
    Preset {
        kind: PresetKind::MobileApp,
        name: "Mobile App Design",
        description: "Optimized for mobile application design. Uses JPEG with \
            balanced quality for smaller file sizes, auto-select algorithm \
            for versatility, and moderate severity for realistic simulation.",
        algorithm: Algorithm::Auto,
        severity: 0.7,
        output_format: OutputFormat::Jpeg,
        quality: 90,
        optimize: true,
        recommended_for: &[
            "iOS/Android app design",
            "Mobile game UI testing",
            "Responsive design validation",
            "Touch interface accessibility",
        ],
    },
    Preset {
        kind: PresetKind::Archival,
        name: "Archival",
        description: "Optimized for archival and preservation workflows. Uses \
            lossless PNG with maximum quality settings and Vischeck algorithm \
            for compatibility with legacy accessibility standards.",
        algorithm: Algorithm::Vischeck,
        severity: 1.0,
        output_format: OutputFormat::Png,
        quality: 95,
        optimize: true,
        recommended_for: &[
            "Digital preservation projects",
            "Museum digitization",
            "Historical document accessibility",
            "Long-term archival storage",
        ],
    },
    Preset {
        kind: PresetKind::FastPreview,
        name: "Fast Preview",
        description: "Optimized for quick previews and iterative design. Uses JPEG \
            with reduced quality for speed, Brettel 1997 for computational \
            efficiency, and lower severity for faster processing.",
        algorithm: Algorithm::Brettel1997,
        severity: 0.6,
        output_format: OutputFormat::Jpeg,
        quality: 75,
        optimize: true,
        recommended_for: &[
            "Rapid prototyping",
            "Design iteration cycles",
            "Quick accessibility checks",
            "Bulk preview generation",
        ],
    },
];

/// Look a preset up by its identifier, case-insensitively.
pub fn get_preset(name: &str) -> Result<&'static Preset, UnknownPreset> {
    name.parse::<PresetKind>().map(PresetKind::preset)
}

pub fn list_presets() -> &'static [Preset] {
    &PRESETS
}

/// Stock defaults with the preset applied, optionally writing to `output_directory`.
pub fn apply_preset(
    kind: PresetKind,
    output_directory: Option<&Path>,
) -> Result<SimulationConfig, ValidationError> {
    let mut values = kind.preset().overlay(&ConfigValues::default());
    if let Some(dir) = output_directory {
        values.output_directory = dir.to_path_buf();
    }
    SimulationConfig::new(values)
}

/// Multi-line description of a preset for `--list-presets`.
pub fn preset_info(kind: PresetKind) -> String {
    let preset = kind.preset();
    let rule = "=".repeat(60);
    let mut lines = vec![
        rule.clone(),
        format!("Preset: {} ({})", preset.name, kind.id()),
        rule,
        String::new(),
        "Description:".to_string(),
        format!("  {}", preset.description),
        String::new(),
        "Configuration:".to_string(),
        format!("  algorithm: {}", preset.algorithm),
        format!("  severity: {}", preset.severity),
        format!("  output_format: {}", preset.output_format),
        format!("  quality: {}", preset.quality),
        format!("  optimize: {}", preset.optimize),
    ];
    if !preset.recommended_for.is_empty() {
        lines.push(String::new());
        lines.push("Recommended for:".to_string());
        lines.extend(preset.recommended_for.iter().map(|u| format!("  • {u}")));
    }
    lines.join("\n")
}
