//! # cvd-sim
//!
//! Batch simulation of color vision deficiencies. Every input image is
//! rendered the way a viewer with protanopia, deuteranopia or tritanopia
//! would see it, plus a grayscale (achromatopsia) rendering, and each
//! rendering is written to the output directory.
//!
//! # Architecture: One Unit of Work, Fanned Out
//!
//! ```text
//! inputs ──▶ batch ──▶ Processor::process_image (one per path, in parallel)
//!                         │
//!                         ├─ security::SecurityValidator::validate
//!                         ├─ ImageBackend::decode
//!                         ├─ Simulator::simulate   × 4 types
//!                         ├─ security::sanitize_output_path
//!                         ├─ ImageBackend::encode  × 4 types
//!                         └─ [metadata sidecar]
//! ```
//!
//! The unit of work is all-or-nothing: a path either yields every requested
//! output or fails. The batch layer isolates failures per path and only
//! fails as a whole when nothing succeeded.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`batch`] | Parallel coordinator: rayon pool, chunking, progress, failure aggregation |
//! | [`process`] | The per-image unit of work |
//! | [`security`] | Input validation (size, format, dimensions, integrity) and output path sandboxing |
//! | [`simulate`] | `CvdTransform` seam and the built-in Brettel / Viénot / Machado transforms |
//! | [`imaging`] | `ImageBackend` seam and the `image`-crate codec |
//! | [`config`] | Validated `SimulationConfig` and its layered loading |
//! | [`types`] | Closed enums: deficiency types, algorithms, formats, log levels |
//! | [`naming`] | Output file names and timestamps |
//! | [`metadata`] | Provenance sidecars, checksums, reproducibility checks |
//! | [`presets`] | Named configuration profiles |
//! | [`profiling`] | Optional per-stage timing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`output`] | CLI output formatting |
//! | `video` | FFmpeg frame pipeline (feature `video`) |
//!
//! # Design Decisions
//!
//! ## Threads, Not Processes
//!
//! Workers are rayon threads sharing one read-only [`process::Processor`].
//! Nothing is copied per worker and results come back over a channel to the
//! calling thread, which is also where the progress callback runs.
//!
//! ## Validate Everything Before Decoding
//!
//! The validator sniffs the real format from magic bytes, reads dimensions
//! from the header and only then decodes under explicit limits. A 100 000 ×
//! 100 000 PNG is rejected from its header without allocating pixels.
//!
//! ## Compile-Time Optional Pieces
//!
//! Video support is a cargo feature. Profiling and metadata are plain values
//! passed to the processor, so there is no runtime probing for what exists.

pub mod batch;
pub mod config;
#[cfg(feature = "video")]
pub mod ffmpeg;
pub mod imaging;
pub mod logging;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod presets;
pub mod process;
pub mod profiling;
pub mod security;
pub mod simulate;
pub mod types;
#[cfg(feature = "video")]
pub mod video;

#[cfg(test)]
pub(crate) mod test_helpers;
