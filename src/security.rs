//! Input validation and output-path sandboxing.
//!
//! Every input file passes through [`SecurityValidator::validate`] before the
//! pipeline decodes it for real. The checks run in a fixed order and stop at
//! the first failure:
//!
//! | # | Check | Violation |
//! |---|---|---|
//! | 1 | path exists, is a regular file | `FILE_NOT_FOUND`, `NOT_A_FILE` |
//! | 2 | `0 < size <= max_file_size` | `EMPTY_FILE`, `FILE_TOO_LARGE` |
//! | 3 | format sniffed from content is allowed | `UNKNOWN_FORMAT`, `DISALLOWED_FORMAT` |
//! | 4 | header readable, each side `<= max_dimension` | `CORRUPTED_FILE`, `DIMENSIONS_TOO_LARGE` |
//! | 5 | full decode succeeds | `CORRUPTED_FILE` |
//!
//! Validation is read-only and its decoded pixels are dropped; the processing
//! step opens the file again.
//!
//! Output names go through [`sanitize_filename`], and full output paths
//! through [`sanitize_output_path`], which refuses anything that does not
//! resolve to a strict descendant of the output directory.

use crate::config::{SimulationConfig, ValidationError};
use image::{ImageFormat, ImageReader, Limits};
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Name returned by [`sanitize_filename`] when nothing usable is left.
pub const FALLBACK_FILENAME: &str = "unnamed_file";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    FileNotFound,
    NotAFile,
    EmptyFile,
    FileTooLarge,
    UnknownFormat,
    DisallowedFormat,
    CorruptedFile,
    DimensionsTooLarge,
    PathTraversal,
}

impl ViolationKind {
    pub fn code(self) -> &'static str {
        match self {
            ViolationKind::FileNotFound => "FILE_NOT_FOUND",
            ViolationKind::NotAFile => "NOT_A_FILE",
            ViolationKind::EmptyFile => "EMPTY_FILE",
            ViolationKind::FileTooLarge => "FILE_TOO_LARGE",
            ViolationKind::UnknownFormat => "UNKNOWN_FORMAT",
            ViolationKind::DisallowedFormat => "DISALLOWED_FORMAT",
            ViolationKind::CorruptedFile => "CORRUPTED_FILE",
            ViolationKind::DimensionsTooLarge => "DIMENSIONS_TOO_LARGE",
            ViolationKind::PathTraversal => "PATH_TRAVERSAL",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} [{code}]", code = .kind.code())]
pub struct SecurityViolation {
    pub kind: ViolationKind,
    pub message: String,
    pub path: PathBuf,
}

impl SecurityViolation {
    fn new(kind: ViolationKind, path: &Path, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: path.to_path_buf(),
        }
    }
}

/// Checks candidate input files against size, format and dimension limits.
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    max_file_size: u64,
    max_dimension: u32,
    allowed_formats: Vec<ImageFormat>,
}

impl SecurityValidator {
    pub const ALLOWED_FORMATS: [ImageFormat; 6] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Gif,
        ImageFormat::Bmp,
        ImageFormat::Tiff,
        ImageFormat::WebP,
    ];

    pub fn new(max_file_size: u64, max_dimension: u32) -> Result<Self, ValidationError> {
        if max_file_size == 0 {
            return Err(ValidationError {
                field: "max_file_size",
                value: "0".into(),
                constraint: "max_file_size > 0",
            });
        }
        if max_dimension == 0 {
            return Err(ValidationError {
                field: "max_dimension",
                value: "0".into(),
                constraint: "max_dimension > 0",
            });
        }
        Ok(Self {
            max_file_size,
            max_dimension,
            allowed_formats: Self::ALLOWED_FORMATS.to_vec(),
        })
    }

    /// Limits taken from an already-validated config.
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            max_file_size: config.max_image_size(),
            max_dimension: config.max_image_dimension(),
            allowed_formats: Self::ALLOWED_FORMATS.to_vec(),
        }
    }

    pub fn with_allowed_formats(mut self, formats: &[ImageFormat]) -> Self {
        self.allowed_formats = formats.to_vec();
        self
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Run every check against `path`, failing on the first violation.
    pub fn validate(&self, path: &Path) -> Result<(), SecurityViolation> {
        use ViolationKind::*;

        let meta = std::fs::metadata(path).map_err(|_| {
            SecurityViolation::new(FileNotFound, path, format!("File not found: {}", path.display()))
        })?;
        if !meta.is_file() {
            return Err(SecurityViolation::new(
                NotAFile,
                path,
                format!("Path is not a file: {}", path.display()),
            ));
        }

        let size = meta.len();
        if size == 0 {
            return Err(SecurityViolation::new(
                EmptyFile,
                path,
                format!("File is empty: {}", path.display()),
            ));
        }
        if size > self.max_file_size {
            return Err(SecurityViolation::new(
                FileTooLarge,
                path,
                format!("File too large: {size} bytes (max: {})", self.max_file_size),
            ));
        }

        let format = sniff_format(path).ok_or_else(|| {
            SecurityViolation::new(
                UnknownFormat,
                path,
                format!("Cannot determine image type: {}", path.display()),
            )
        })?;
        if !self.allowed_formats.contains(&format) {
            return Err(SecurityViolation::new(
                DisallowedFormat,
                path,
                format!("Image format not allowed: {}", format_name(format)),
            ));
        }

        let corrupted = |e: &dyn std::fmt::Display| {
            SecurityViolation::new(
                CorruptedFile,
                path,
                format!("Invalid or corrupted image file: {e}"),
            )
        };

        let (width, height) = open_reader(path)
            .and_then(|r| r.into_dimensions().map_err(std::io::Error::other))
            .map_err(|e| corrupted(&e))?;
        if width > self.max_dimension || height > self.max_dimension {
            return Err(SecurityViolation::new(
                DimensionsTooLarge,
                path,
                format!(
                    "Image dimensions too large: {width}x{height} (max: {max}x{max})",
                    max = self.max_dimension
                ),
            ));
        }

        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        let mut reader = open_reader(path).map_err(|e| corrupted(&e))?;
        reader.limits(limits);
        reader.decode().map_err(|e| corrupted(&e))?;
        Ok(())
    }
}

fn open_reader(path: &Path) -> std::io::Result<ImageReader<BufReader<File>>> {
    ImageReader::new(BufReader::new(File::open(path)?)).with_guessed_format()
}

/// Format from magic bytes, ignoring the extension.
fn sniff_format(path: &Path) -> Option<ImageFormat> {
    open_reader(path).ok()?.format()
}

fn format_name(format: ImageFormat) -> String {
    format!("{format:?}").to_lowercase()
}

// =============================================================================
// Output sanitization
// =============================================================================

/// Make `name` safe to use as a single path component.
///
/// Separators, NUL and `..` become `_`, then anything outside
/// `[A-Za-z0-9._-]` becomes `_`. An empty or lone-`_` result falls back to
/// [`FALLBACK_FILENAME`].
pub fn sanitize_filename(name: &str) -> String {
    let mut result = name.to_string();
    for token in ["/", "\\", "\0", ".."] {
        result = result.replace(token, "_");
    }
    let result: String = result
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if result.is_empty() || result == "_" {
        FALLBACK_FILENAME.to_string()
    } else {
        result
    }
}

/// Absolute form of `path` with symlinks resolved as far as the path exists
/// and `.`/`..` folded lexically beyond that.
fn resolve(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    let base = loop {
        match existing.canonicalize() {
            Ok(p) => break p,
            Err(_) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    rest.push(name.to_os_string());
                    existing = parent;
                }
                _ => break existing.to_path_buf(),
            },
        }
    };

    let mut resolved = base;
    for name in rest.into_iter().rev() {
        match Path::new(&name).components().next() {
            Some(Component::ParentDir) => {
                resolved.pop();
            }
            Some(Component::CurDir) | None => {}
            _ => resolved.push(name),
        }
    }
    Ok(resolved)
}

/// Join a sanitized `filename` onto `base_dir` and verify the result stays
/// inside it.
pub fn sanitize_output_path(base_dir: &Path, filename: &str) -> Result<PathBuf, SecurityViolation> {
    let traversal = |detail: String| {
        SecurityViolation::new(
            ViolationKind::PathTraversal,
            base_dir,
            format!("Path traversal detected: {filename}{detail}"),
        )
    };

    let base = resolve(base_dir).map_err(|e| traversal(format!(" ({e})")))?;
    let target = resolve(&base.join(sanitize_filename(filename)))
        .map_err(|e| traversal(format!(" ({e})")))?;

    if target == base || !target.starts_with(&base) {
        return Err(traversal(format!(" (resolved to {})", target.display())));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use tempfile::TempDir;

    fn validator() -> SecurityValidator {
        SecurityValidator::new(100 * 1024 * 1024, 10_000).unwrap()
    }

    fn kind_of(result: Result<(), SecurityViolation>) -> ViolationKind {
        result.unwrap_err().kind
    }

    // =========================================================================
    // validate
    // =========================================================================

    #[test]
    fn valid_images_pass() {
        let tmp = TempDir::new().unwrap();
        let jpg = tmp.path().join("a.jpg");
        let png = tmp.path().join("b.png");
        let gif = tmp.path().join("c.gif");
        create_test_jpeg(&jpg, 40, 30);
        create_test_png(&png, 40, 30, [1, 2, 3]);
        create_test_gif(&gif, 16, 16);

        for path in [jpg, png, gif] {
            assert!(validator().validate(&path).is_ok(), "{}", path.display());
        }
    }

    #[test]
    fn missing_file() {
        let kind = kind_of(validator().validate(Path::new("/nonexistent/x.png")));
        assert_eq!(kind, ViolationKind::FileNotFound);
        assert_eq!(kind.code(), "FILE_NOT_FOUND");
    }

    #[test]
    fn directory_is_not_a_file() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(kind_of(validator().validate(tmp.path())), ViolationKind::NotAFile);
    }

    #[test]
    fn empty_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.png");
        write_bytes(&path, b"");
        assert_eq!(kind_of(validator().validate(&path)), ViolationKind::EmptyFile);
    }

    #[test]
    fn file_over_size_limit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.jpg");
        create_test_jpeg(&path, 64, 64);

        let small = SecurityValidator::new(16, 10_000).unwrap();
        let err = small.validate(&path).unwrap_err();
        assert_eq!(err.kind, ViolationKind::FileTooLarge);
        assert!(err.message.contains("max: 16"));
    }

    #[test]
    fn text_file_has_unknown_format() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.png");
        write_bytes(&path, b"definitely not pixels");
        assert_eq!(kind_of(validator().validate(&path)), ViolationKind::UnknownFormat);
    }

    #[test]
    fn sniffable_but_disallowed_format() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("frame.jpg");
        create_test_ppm(&path, 4, 4);

        let err = validator().validate(&path).unwrap_err();
        assert_eq!(err.kind, ViolationKind::DisallowedFormat);
        assert!(err.message.contains("pnm"));
    }

    #[test]
    fn custom_allow_list_narrows_formats() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        create_test_jpeg(&path, 8, 8);

        let png_only = validator().with_allowed_formats(&[ImageFormat::Png]);
        assert_eq!(kind_of(png_only.validate(&path)), ViolationKind::DisallowedFormat);
    }

    #[test]
    fn oversized_dimensions() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wide.png");
        create_test_png(&path, 300, 20, [0, 0, 0]);

        let narrow = SecurityValidator::new(1024 * 1024, 256).unwrap();
        let err = narrow.validate(&path).unwrap_err();
        assert_eq!(err.kind, ViolationKind::DimensionsTooLarge);
        assert!(err.message.contains("300x20"));
    }

    #[test]
    fn dimension_limit_is_inclusive() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("exact.png");
        create_test_png(&path, 256, 256, [0, 0, 0]);

        let exact = SecurityValidator::new(1024 * 1024, 256).unwrap();
        assert!(exact.validate(&path).is_ok());
    }

    #[test]
    fn truncated_image_is_corrupted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cut.png");
        create_truncated_png(&path, 64, 64);
        assert_eq!(kind_of(validator().validate(&path)), ViolationKind::CorruptedFile);
    }

    #[test]
    fn zero_limits_rejected_at_construction() {
        assert_eq!(SecurityValidator::new(0, 10).unwrap_err().field, "max_file_size");
        assert_eq!(SecurityValidator::new(10, 0).unwrap_err().field, "max_dimension");
    }

    #[test]
    fn violation_display_includes_code() {
        let err = validator().validate(Path::new("/nope.png")).unwrap_err();
        assert_eq!(err.to_string(), "File not found: /nope.png [FILE_NOT_FOUND]");
    }

    // =========================================================================
    // sanitize_filename
    // =========================================================================

    #[test]
    fn sanitize_keeps_safe_names() {
        assert_eq!(sanitize_filename("protan_image_20240101_120000.png"), "protan_image_20240101_120000.png");
    }

    #[test]
    fn sanitize_replaces_traversal_tokens() {
        assert_eq!(sanitize_filename("../../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize_filename("a\\b\0c"), "a_b_c");
    }

    #[test]
    fn sanitize_replaces_other_characters() {
        assert_eq!(sanitize_filename("my file:name?.jpg"), "my_file_name_.jpg");
        assert_eq!(sanitize_filename("café.png"), "caf_.png");
    }

    #[test]
    fn sanitize_falls_back_when_nothing_left() {
        assert_eq!(sanitize_filename(""), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("/"), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename(".."), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("?"), FALLBACK_FILENAME);
    }

    // =========================================================================
    // sanitize_output_path
    // =========================================================================

    #[test]
    fn output_path_lands_in_base_dir() {
        let tmp = TempDir::new().unwrap();
        let path = sanitize_output_path(tmp.path(), "image.jpg").unwrap();
        assert_eq!(path, tmp.path().canonicalize().unwrap().join("image.jpg"));
    }

    #[test]
    fn output_path_base_need_not_exist() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("not").join("yet");
        let path = sanitize_output_path(&base, "x.png").unwrap();
        assert!(path.starts_with(tmp.path().canonicalize().unwrap()));
        assert!(path.ends_with("not/yet/x.png"));
    }

    #[test]
    fn output_path_never_escapes_base() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("out");
        let resolved_base = tmp.path().canonicalize().unwrap().join("out");
        let hostile = [
            "../escape.png",
            "../../etc/passwd",
            "/etc/passwd",
            "..\\..\\win.ini",
            "a\0b",
            "....//....//x",
            "sub/../../x",
        ];
        for name in hostile {
            if let Ok(path) = sanitize_output_path(&base, name) {
                assert!(path.starts_with(&resolved_base), "{name} -> {}", path.display());
                assert_ne!(path, resolved_base);
            }
        }
    }

    #[test]
    fn output_path_dot_name_is_traversal() {
        let tmp = TempDir::new().unwrap();
        let err = sanitize_output_path(tmp.path(), ".").unwrap_err();
        assert_eq!(err.kind, ViolationKind::PathTraversal);
    }

    #[cfg(unix)]
    #[test]
    fn output_path_through_escaping_symlink_is_traversal() {
        let tmp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let base = tmp.path().join("out");
        std::fs::create_dir(&base).unwrap();
        std::os::unix::fs::symlink(outside.path().join("target.png"), base.join("link.png"))
            .unwrap();
        write_bytes(&outside.path().join("target.png"), b"x");

        let err = sanitize_output_path(&base, "link.png").unwrap_err();
        assert_eq!(err.kind, ViolationKind::PathTraversal);
    }
}
