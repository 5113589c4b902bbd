//! Image loading and writing.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (format sniffed from content) |
//! | **Encode** | per-format `image::codecs::*` encoders |
//!
//! The module is split into:
//! - **Parameters**: [`EncodeParams`] and [`Quality`], describing a write
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, ImageError};
pub use params::{EncodeParams, Quality};
pub use rust_backend::{RustBackend, has_supported_extension, supported_input_extensions};
