//! Closed enumerations shared by every stage of the pipeline.
//!
//! Each enum has a canonical upper-case *name* (`PROTAN`, `MACHADO_2009`,
//! `PNG`) used in serialized config and metadata, and parses from either
//! its name or its lower-case *value* case-insensitively, so `machado_2009`,
//! `MACHADO_2009` and `Machado_2009` all resolve to the same variant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A string that does not name any variant of the target enum.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Types of color vision deficiency, plus the grayscale special case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum DeficiencyType {
    /// Missing or defective L-cones (red).
    Protan,
    /// Missing or defective M-cones (green).
    Deutan,
    /// Missing or defective S-cones (blue).
    Tritan,
    /// Achromatopsia: luminance only.
    Grayscale,
}

impl DeficiencyType {
    pub const ALL: [DeficiencyType; 4] = [
        DeficiencyType::Protan,
        DeficiencyType::Deutan,
        DeficiencyType::Tritan,
        DeficiencyType::Grayscale,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DeficiencyType::Protan => "PROTAN",
            DeficiencyType::Deutan => "DEUTAN",
            DeficiencyType::Tritan => "TRITAN",
            DeficiencyType::Grayscale => "GRAYSCALE",
        }
    }

    /// Short token used in output file names.
    pub fn value(self) -> &'static str {
        match self {
            DeficiencyType::Protan => "protan",
            DeficiencyType::Deutan => "deutan",
            DeficiencyType::Tritan => "tritan",
            DeficiencyType::Grayscale => "bw",
        }
    }

    /// The cone class this type attenuates, or `None` for grayscale.
    pub fn axis(self) -> Option<Deficiency> {
        match self {
            DeficiencyType::Protan => Some(Deficiency::Protan),
            DeficiencyType::Deutan => Some(Deficiency::Deutan),
            DeficiencyType::Tritan => Some(Deficiency::Tritan),
            DeficiencyType::Grayscale => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DeficiencyType::Protan => "Protanopia - Missing or defective L-cones (red)",
            DeficiencyType::Deutan => "Deuteranopia - Missing or defective M-cones (green)",
            DeficiencyType::Tritan => "Tritanopia - Missing or defective S-cones (blue)",
            DeficiencyType::Grayscale => "Achromatopsia - Complete color blindness",
        }
    }
}

/// Deficiency axis handed to a simulation transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Deficiency {
    Protan,
    Deutan,
    Tritan,
}

/// Named selection key for the simulation transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Algorithm {
    #[default]
    Brettel1997,
    Vienot1999,
    Machado2009,
    Vischeck,
    Auto,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::Brettel1997,
        Algorithm::Vienot1999,
        Algorithm::Machado2009,
        Algorithm::Vischeck,
        Algorithm::Auto,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Brettel1997 => "BRETTEL_1997",
            Algorithm::Vienot1999 => "VIENOT_1999",
            Algorithm::Machado2009 => "MACHADO_2009",
            Algorithm::Vischeck => "VISCHECK",
            Algorithm::Auto => "AUTO",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Algorithm::Brettel1997 => "Brettel et al. 1997 - Classic algorithm, computationally efficient",
            Algorithm::Vienot1999 => "Vienot et al. 1999 - Improved accuracy for severe deficiencies",
            Algorithm::Machado2009 => "Machado et al. 2009 - Modern, handles severity levels well",
            Algorithm::Vischeck => "Vischeck - Based on the popular Vischeck tool",
            Algorithm::Auto => "Auto-select - Automatically chooses best algorithm",
        }
    }
}

/// Output image container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
    Tiff,
    Bmp,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::Webp,
        OutputFormat::Tiff,
        OutputFormat::Bmp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::Webp => "WEBP",
            OutputFormat::Tiff => "TIFF",
            OutputFormat::Bmp => "BMP",
        }
    }

    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Bmp => "bmp",
        }
    }

    /// Whether the encoder takes a quality parameter.
    pub fn is_lossy(self) -> bool {
        matches!(self, OutputFormat::Jpeg | OutputFormat::Webp)
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            OutputFormat::Jpeg => image::ImageFormat::Jpeg,
            OutputFormat::Png => image::ImageFormat::Png,
            OutputFormat::Webp => image::ImageFormat::WebP,
            OutputFormat::Tiff => image::ImageFormat::Tiff,
            OutputFormat::Bmp => image::ImageFormat::Bmp,
        }
    }
}

/// Log verbosity as exposed in config and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// `tracing` has no level above error; critical folds into it.
    pub fn tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error | LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}

// =============================================================================
// Name parsing and display
// =============================================================================

fn parse_named<T: Copy>(
    kind: &'static str,
    all: &[T],
    names: impl Fn(T) -> [&'static str; 2],
    s: &str,
) -> Result<T, UnknownVariant> {
    all.iter()
        .copied()
        .find(|v| names(*v).iter().any(|n| n.eq_ignore_ascii_case(s.trim())))
        .ok_or_else(|| UnknownVariant {
            kind,
            value: s.to_string(),
        })
}

impl FromStr for DeficiencyType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_named("deficiency type", &Self::ALL, |v| [v.name(), v.value()], s)
    }
}

impl FromStr for Algorithm {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_named("algorithm", &Self::ALL, |v| [v.name(), v.name()], s)
    }
}

impl FromStr for OutputFormat {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_named("output format", &Self::ALL, |v| [v.name(), v.extension()], s)
    }
}

impl FromStr for LogLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "warn" is what RUST_LOG users type
        if s.trim().eq_ignore_ascii_case("warn") {
            return Ok(LogLevel::Warning);
        }
        parse_named("log level", &Self::ALL, |v| [v.name(), v.name()], s)
    }
}

macro_rules! string_conversions {
    ($($ty:ty),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl TryFrom<String> for $ty {
            type Error = UnknownVariant;

            fn try_from(s: String) -> Result<Self, UnknownVariant> {
                s.parse()
            }
        }

        impl From<$ty> for &'static str {
            fn from(v: $ty) -> Self {
                v.name()
            }
        }
    )*};
}

string_conversions!(DeficiencyType, Algorithm, OutputFormat, LogLevel);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deficiency_values_match_file_tokens() {
        let values: Vec<&str> = DeficiencyType::ALL.iter().map(|d| d.value()).collect();
        assert_eq!(values, vec!["protan", "deutan", "tritan", "bw"]);
    }

    #[test]
    fn deficiency_parses_name_or_value() {
        assert_eq!("protan".parse::<DeficiencyType>(), Ok(DeficiencyType::Protan));
        assert_eq!("GRAYSCALE".parse::<DeficiencyType>(), Ok(DeficiencyType::Grayscale));
        assert_eq!("bw".parse::<DeficiencyType>(), Ok(DeficiencyType::Grayscale));
        assert!("red".parse::<DeficiencyType>().is_err());
    }

    #[test]
    fn grayscale_has_no_axis() {
        assert_eq!(DeficiencyType::Grayscale.axis(), None);
        assert_eq!(DeficiencyType::Tritan.axis(), Some(Deficiency::Tritan));
    }

    #[test]
    fn algorithm_parse_is_case_insensitive() {
        assert_eq!("machado_2009".parse::<Algorithm>(), Ok(Algorithm::Machado2009));
        assert_eq!("Vienot_1999".parse::<Algorithm>(), Ok(Algorithm::Vienot1999));
        let err = "brettel".parse::<Algorithm>().unwrap_err();
        assert_eq!(err.to_string(), "unknown algorithm: brettel");
    }

    #[test]
    fn output_format_accepts_extension() {
        assert_eq!("jpg".parse::<OutputFormat>(), Ok(OutputFormat::Jpeg));
        assert_eq!("jpeg".parse::<OutputFormat>(), Ok(OutputFormat::Jpeg));
        assert_eq!("PNG".parse::<OutputFormat>(), Ok(OutputFormat::Png));
        assert_eq!(OutputFormat::Tiff.extension(), "tiff");
    }

    #[test]
    fn only_jpeg_and_webp_are_lossy() {
        let lossy: Vec<OutputFormat> = OutputFormat::ALL
            .into_iter()
            .filter(|f| f.is_lossy())
            .collect();
        assert_eq!(lossy, vec![OutputFormat::Jpeg, OutputFormat::Webp]);
    }

    #[test]
    fn serde_uses_upper_case_names() {
        let json = serde_json::to_string(&Algorithm::Machado2009).unwrap();
        assert_eq!(json, "\"MACHADO_2009\"");
        let back: Algorithm = serde_json::from_str("\"machado_2009\"").unwrap();
        assert_eq!(back, Algorithm::Machado2009);
    }

    #[test]
    fn log_level_accepts_warn_alias() {
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!(LogLevel::Critical.tracing_level(), tracing::Level::ERROR);
    }

    #[test]
    fn log_level_converts_from_owned_string() {
        assert_eq!(LogLevel::try_from("error".to_string()), Ok(LogLevel::Error));
        assert!(LogLevel::try_from("loud".to_string()).is_err());
        let level: LogLevel = serde_json::from_str("\"ERROR\"").unwrap();
        assert_eq!(level, LogLevel::Error);
    }
}
