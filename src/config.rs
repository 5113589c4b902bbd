//! Simulation configuration.
//!
//! A [`SimulationConfig`] is resolved from layers, each overriding the one
//! before it:
//!
//! ```text
//! stock defaults             SimulationConfig::default()
//!   ← config file            --config cvd.toml
//!   ← environment            CVD_SIMULATOR_SEVERITY=0.7 ...
//!   ← preset                 --preset web_design   (applied by the CLI)
//!   ← explicit flags         -s 0.5 -f png ...     (applied by the CLI)
//! ```
//!
//! ## Config File
//!
//! ```toml
//! # All keys are optional - defaults shown below
//! algorithm = "BRETTEL_1997"     # brettel_1997 | vienot_1999 | machado_2009 | vischeck | auto
//! severity = 0.8                 # 0.0 (unchanged) ..= 1.0 (full dichromacy)
//! output_format = "JPEG"         # jpeg | png | webp | tiff | bmp
//! output_directory = "./outputs"
//! quality = 95                   # 1..=95, lossy formats only
//! optimize = true
//! log_level = "INFO"
//! # max_workers = 4              # omit for one worker per CPU
//! max_image_size = 104857600     # bytes
//! max_image_dimension = 10000    # pixels, per side
//! ```
//!
//! Enum values match case-insensitively. Unknown keys and unknown enum
//! names are rejected with [`ConfigError::UnknownKey`] /
//! [`ConfigError::UnknownValue`] before any value is deserialized.
//!
//! ## Validity
//!
//! [`SimulationConfig`] keeps its fields private. The only ways to obtain one
//! ([`SimulationConfig::new`], `TryFrom`, serde, [`resolve_config`]) run
//! [`ConfigValues::validate`] first, so every instance in circulation
//! satisfies the constraints below.
//!
//! | Field | Constraint |
//! |---|---|
//! | `severity` | `0.0 <= severity <= 1.0` |
//! | `quality` | `1 <= quality <= 95` |
//! | `max_workers` | `>= 1` when present |
//! | `max_image_size` | `> 0` |
//! | `max_image_dimension` | `> 0` |

use crate::types::{Algorithm, LogLevel, OutputFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "CVD_SIMULATOR_";

const DEFAULT_MAX_IMAGE_SIZE: u64 = 100 * 1024 * 1024;
const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 10_000;

/// A config value outside its documented range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {value} (must be {constraint})")]
pub struct ValidationError {
    pub field: &'static str,
    pub value: String,
    pub constraint: &'static str,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
    #[error("Unknown {key}: {value}")]
    UnknownValue { key: String, value: String },
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: String, value: String },
}

/// Raw, not-yet-validated configuration values.
///
/// This is the shape of the config file and of the `config` block in
/// metadata sidecars. Turn it into a [`SimulationConfig`] to use it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigValues {
    pub algorithm: Algorithm,
    pub severity: f64,
    pub output_format: OutputFormat,
    pub output_directory: PathBuf,
    pub quality: u32,
    pub optimize: bool,
    pub log_level: LogLevel,
    pub max_workers: Option<usize>,
    pub max_image_size: u64,
    pub max_image_dimension: u32,
}

/// Every key a config layer may set, in declaration order.
pub const CONFIG_KEYS: [&str; 10] = [
    "algorithm",
    "severity",
    "output_format",
    "output_directory",
    "quality",
    "optimize",
    "log_level",
    "max_workers",
    "max_image_size",
    "max_image_dimension",
];

impl Default for ConfigValues {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Brettel1997,
            severity: 0.8,
            output_format: OutputFormat::Jpeg,
            output_directory: PathBuf::from("./outputs"),
            quality: 95,
            optimize: true,
            log_level: LogLevel::Info,
            max_workers: None,
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
        }
    }
}

impl ConfigValues {
    /// Check every field against its constraint, reporting the first failure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.severity) {
            return Err(ValidationError {
                field: "severity",
                value: self.severity.to_string(),
                constraint: "0.0 <= severity <= 1.0",
            });
        }
        if !(1..=95).contains(&self.quality) {
            return Err(ValidationError {
                field: "quality",
                value: self.quality.to_string(),
                constraint: "1 <= quality <= 95",
            });
        }
        if self.max_workers == Some(0) {
            return Err(ValidationError {
                field: "max_workers",
                value: "0".into(),
                constraint: "max_workers >= 1",
            });
        }
        if self.max_image_size == 0 {
            return Err(ValidationError {
                field: "max_image_size",
                value: "0".into(),
                constraint: "max_image_size > 0",
            });
        }
        if self.max_image_dimension == 0 {
            return Err(ValidationError {
                field: "max_image_dimension",
                value: "0".into(),
                constraint: "max_image_dimension > 0",
            });
        }
        Ok(())
    }
}

/// Validated, immutable simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConfigValues", into = "ConfigValues")]
pub struct SimulationConfig {
    values: ConfigValues,
}

impl SimulationConfig {
    /// Validate `values` and wrap them. Fails without producing an instance
    /// if any single field is out of range.
    pub fn new(values: ConfigValues) -> Result<Self, ValidationError> {
        values.validate()?;
        Ok(Self { values })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.values.algorithm
    }

    pub fn severity(&self) -> f64 {
        self.values.severity
    }

    pub fn output_format(&self) -> OutputFormat {
        self.values.output_format
    }

    pub fn output_directory(&self) -> &Path {
        &self.values.output_directory
    }

    pub fn quality(&self) -> u32 {
        self.values.quality
    }

    pub fn optimize(&self) -> bool {
        self.values.optimize
    }

    pub fn log_level(&self) -> LogLevel {
        self.values.log_level
    }

    pub fn max_workers(&self) -> Option<usize> {
        self.values.max_workers
    }

    pub fn max_image_size(&self) -> u64 {
        self.values.max_image_size
    }

    pub fn max_image_dimension(&self) -> u32 {
        self.values.max_image_dimension
    }

    pub fn values(&self) -> &ConfigValues {
        &self.values
    }

    /// Same config writing into a different directory. The output directory
    /// carries no constraint, so this cannot fail.
    pub fn with_output_directory(&self, dir: impl Into<PathBuf>) -> Self {
        let mut values = self.values.clone();
        values.output_directory = dir.into();
        Self { values }
    }

    /// Flat `field → value` map, as recorded in metadata sidecars.
    pub fn to_map(&self) -> BTreeMap<String, serde_json::Value> {
        match serde_json::to_value(&self.values) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Rebuild a config from a flat map such as [`to_map`](Self::to_map)'s output.
    pub fn from_map(map: &BTreeMap<String, serde_json::Value>) -> Result<Self, ConfigError> {
        check_keys(map.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
        let object: serde_json::Map<String, serde_json::Value> =
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let values: ConfigValues = serde_json::from_value(serde_json::Value::Object(object))?;
        Ok(Self::new(values)?)
    }

    /// Defaults overridden by `CVD_SIMULATOR_*` variables from the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_config(None, std::env::vars())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            values: ConfigValues::default(),
        }
    }
}

impl TryFrom<ConfigValues> for SimulationConfig {
    type Error = ValidationError;

    fn try_from(values: ConfigValues) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<SimulationConfig> for ConfigValues {
    fn from(config: SimulationConfig) -> Self {
        config.values
    }
}

/// Resolve the worker count for a run of `item_count` units.
///
/// - `max_workers` from config wins, then `override_workers`, then the
///   number of available cores.
/// - Never more workers than items, never fewer than one.
pub fn effective_workers(
    config: &SimulationConfig,
    override_workers: Option<usize>,
    item_count: usize,
) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_workers()
        .or(override_workers)
        .unwrap_or(cores)
        .min(item_count)
        .max(1)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer that file and environment overlays merge onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(ConfigValues::default()).map_err(|e| {
        ConfigError::Io(std::io::Error::other(format!(
            "default config must serialize: {e}"
        )))
    })
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a TOML config file as a raw value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(value)
}

/// Build an overlay table from `CVD_SIMULATOR_*` variables.
///
/// Takes the variables as an iterator so callers (and tests) decide where
/// they come from. Variables without the prefix are ignored; prefixed
/// variables naming an unknown key become [`ConfigError::UnknownKey`].
pub fn env_overlay(
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<toml::Value, ConfigError> {
    let mut table = toml::map::Map::new();
    for (var, raw) in vars {
        let Some(suffix) = var.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let key = suffix.to_ascii_lowercase();
        let invalid = || ConfigError::InvalidEnv {
            var: var.clone(),
            value: raw.clone(),
        };
        let value = match key.as_str() {
            "severity" => toml::Value::Float(raw.trim().parse().map_err(|_| invalid())?),
            "quality" | "max_workers" | "max_image_size" | "max_image_dimension" => {
                toml::Value::Integer(raw.trim().parse().map_err(|_| invalid())?)
            }
            "optimize" => toml::Value::Boolean(matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            )),
            "algorithm" | "output_format" | "output_directory" | "log_level" => {
                toml::Value::String(raw.clone())
            }
            _ => return Err(ConfigError::UnknownKey(key)),
        };
        table.insert(key, value);
    }
    Ok(toml::Value::Table(table))
}

/// Reject unknown keys and unknown enum names.
///
/// Each entry is `(key, value-if-it-is-a-string)`.
fn check_keys<'a>(
    entries: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
) -> Result<(), ConfigError> {
    for (key, text) in entries {
        if !CONFIG_KEYS.contains(&key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }
        let Some(text) = text else { continue };
        let known = match key {
            "algorithm" => text.parse::<Algorithm>().is_ok(),
            "output_format" => text.parse::<OutputFormat>().is_ok(),
            "log_level" => text.parse::<LogLevel>().is_ok(),
            _ => true,
        };
        if !known {
            return Err(ConfigError::UnknownValue {
                key: key.to_string(),
                value: text.to_string(),
            });
        }
    }
    Ok(())
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SimulationConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    if let Some(table) = merged.as_table() {
        check_keys(table.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
    }
    let values: ConfigValues = merged.try_into()?;
    Ok(SimulationConfig::new(values)?)
}

/// Resolve defaults ← optional config file ← environment variables.
pub fn load_config(
    file: Option<&Path>,
    env: impl IntoIterator<Item = (String, String)>,
) -> Result<SimulationConfig, ConfigError> {
    let mut layered = stock_defaults_value()?;
    if let Some(path) = file {
        layered = merge_toml(layered, load_raw_config(path)?);
    }
    resolve_config(layered, Some(env_overlay(env)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // =========================================================================
    // Defaults and construction
    // =========================================================================

    #[test]
    fn default_config_values() {
        let config = SimulationConfig::default();
        assert_eq!(config.algorithm(), Algorithm::Brettel1997);
        assert_eq!(config.severity(), 0.8);
        assert_eq!(config.output_format(), OutputFormat::Jpeg);
        assert_eq!(config.output_directory(), Path::new("./outputs"));
        assert_eq!(config.quality(), 95);
        assert!(config.optimize());
        assert_eq!(config.max_workers(), None);
        assert_eq!(config.max_image_size(), 100 * 1024 * 1024);
        assert_eq!(config.max_image_dimension(), 10_000);
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(ConfigValues::default().validate().is_ok());
    }

    #[test]
    fn severity_boundaries_are_inclusive() {
        for severity in [0.0, 1.0] {
            let values = ConfigValues {
                severity,
                ..Default::default()
            };
            assert!(SimulationConfig::new(values).is_ok());
        }
    }

    #[test]
    fn each_out_of_range_field_fails_construction() {
        let cases = [
            ("severity", ConfigValues { severity: 1.5, ..Default::default() }),
            ("severity", ConfigValues { severity: -0.1, ..Default::default() }),
            ("severity", ConfigValues { severity: f64::NAN, ..Default::default() }),
            ("quality", ConfigValues { quality: 0, ..Default::default() }),
            ("quality", ConfigValues { quality: 96, ..Default::default() }),
            ("max_workers", ConfigValues { max_workers: Some(0), ..Default::default() }),
            ("max_image_size", ConfigValues { max_image_size: 0, ..Default::default() }),
            ("max_image_dimension", ConfigValues { max_image_dimension: 0, ..Default::default() }),
        ];
        for (field, values) in cases {
            let err = SimulationConfig::new(values).unwrap_err();
            assert_eq!(err.field, field);
        }
    }

    #[test]
    fn validation_error_message_names_constraint() {
        let err = SimulationConfig::new(ConfigValues {
            quality: 100,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "invalid quality: 100 (must be 1 <= quality <= 95)");
    }

    #[test]
    fn deserializing_invalid_values_is_rejected() {
        let result: Result<SimulationConfig, _> = serde_json::from_str(r#"{"severity": 2.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn with_output_directory_keeps_other_fields() {
        let config = SimulationConfig::default().with_output_directory("/tmp/elsewhere");
        assert_eq!(config.output_directory(), Path::new("/tmp/elsewhere"));
        assert_eq!(config.quality(), 95);
    }

    // =========================================================================
    // Flat map round trip
    // =========================================================================

    #[test]
    fn to_map_has_every_key() {
        let map = SimulationConfig::default().to_map();
        let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
        let mut expected = CONFIG_KEYS.to_vec();
        expected.sort_unstable();
        assert_eq!(keys, expected);
        assert_eq!(map["algorithm"], serde_json::json!("BRETTEL_1997"));
        assert_eq!(map["max_workers"], serde_json::Value::Null);
    }

    #[test]
    fn from_map_reproduces_config() {
        let config = SimulationConfig::new(ConfigValues {
            algorithm: Algorithm::Machado2009,
            severity: 0.25,
            max_workers: Some(3),
            ..Default::default()
        })
        .unwrap();
        let back = SimulationConfig::from_map(&config.to_map()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn from_map_unknown_key_is_configuration_error() {
        let mut map = SimulationConfig::default().to_map();
        map.insert("colour".into(), serde_json::json!("red"));
        let err = SimulationConfig::from_map(&map).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(k) if k == "colour"));
    }

    #[test]
    fn from_map_unknown_algorithm_is_configuration_error() {
        let mut map = BTreeMap::new();
        map.insert("algorithm".to_string(), serde_json::json!("ishihara"));
        let err = SimulationConfig::from_map(&map).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownValue { key, .. } if key == "algorithm"));
    }

    // =========================================================================
    // Layering
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("severity = 0.8\nquality = 95").unwrap();
        let overlay: toml::Value = toml::from_str("severity = 0.3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["severity"].as_float(), Some(0.3));
        assert_eq!(merged["quality"].as_integer(), Some(95));
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cvd.toml");
        fs::write(
            &path,
            r#"
algorithm = "vienot_1999"
severity = 0.5
output_format = "png"
"#,
        )
        .unwrap();

        let config = load_config(Some(&path), Vec::new()).unwrap();
        assert_eq!(config.algorithm(), Algorithm::Vienot1999);
        assert_eq!(config.severity(), 0.5);
        assert_eq!(config.output_format(), OutputFormat::Png);
        assert_eq!(config.quality(), 95);
    }

    #[test]
    fn env_overrides_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cvd.toml");
        fs::write(&path, "severity = 0.5\nquality = 80\n").unwrap();

        let config = load_config(
            Some(&path),
            env(&[
                ("CVD_SIMULATOR_SEVERITY", "0.7"),
                ("CVD_SIMULATOR_OPTIMIZE", "off"),
                ("CVD_SIMULATOR_MAX_WORKERS", "2"),
                ("HOME", "/root"),
            ]),
        )
        .unwrap();
        assert_eq!(config.severity(), 0.7);
        assert_eq!(config.quality(), 80);
        assert!(!config.optimize());
        assert_eq!(config.max_workers(), Some(2));
    }

    #[test]
    fn env_non_numeric_value_is_rejected() {
        let err = load_config(None, env(&[("CVD_SIMULATOR_QUALITY", "high")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var, .. } if var == "CVD_SIMULATOR_QUALITY"));
    }

    #[test]
    fn env_unknown_variable_is_rejected() {
        let err = load_config(None, env(&[("CVD_SIMULATOR_COLOUR", "red")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(k) if k == "colour"));
    }

    #[test]
    fn unknown_key_rejected_via_load_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cvd.toml");
        fs::write(&path, "qualty = 90\n").unwrap();

        let err = load_config(Some(&path), Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(k) if k == "qualty"));
    }

    #[test]
    fn unknown_format_rejected_via_load_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cvd.toml");
        fs::write(&path, "output_format = \"gif\"\n").unwrap();

        let err = load_config(Some(&path), Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownValue { key, .. } if key == "output_format"));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cvd.toml");
        fs::write(&path, "quality = 200\n").unwrap();

        let result = load_config(Some(&path), Vec::new());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cvd.toml");
        fs::write(&path, "severity = [").unwrap();

        let result = load_config(Some(&path), Vec::new());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // Worker resolution
    // =========================================================================

    fn cores() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    #[test]
    fn effective_workers_prefers_config() {
        let config = SimulationConfig::new(ConfigValues {
            max_workers: Some(3),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(effective_workers(&config, Some(8), 100), 3);
    }

    #[test]
    fn effective_workers_falls_back_to_override_then_cores() {
        let config = SimulationConfig::default();
        assert_eq!(effective_workers(&config, Some(2), 100), 2);
        assert_eq!(effective_workers(&config, None, 10_000), cores());
    }

    #[test]
    fn effective_workers_clamped_to_item_count() {
        let config = SimulationConfig::new(ConfigValues {
            max_workers: Some(16),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(effective_workers(&config, None, 3), 3);
        assert_eq!(effective_workers(&config, None, 0), 1);
    }
}
