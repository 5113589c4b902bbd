//! Video simulation through FFmpeg.
//!
//! ```text
//! video ──ffprobe──▶ VideoMetadata
//!       ──ffmpeg──▶ frames/frame_000001.png …         (temp dir)
//!                     │ per deficiency type
//!                     ▼
//!                   simulate each frame ──▶ <type>/frame_000001.png …
//!                     │
//!                     ▼
//!                   ffmpeg libx264 ──▶ {stem}_{type}{.ext}
//! ```
//!
//! Frames are decoded, simulated and written with the same backend and
//! [`Simulator`] the still-image path uses. Intermediate frames always go
//! through PNG regardless of the configured output format.

use crate::ffmpeg::{self, FfmpegCommand, FfmpegError};
use crate::imaging::{BackendError, EncodeParams, ImageBackend, Quality};
use crate::simulate::{SimulationError, Simulator};
use crate::types::{DeficiencyType, OutputFormat};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const FRAME_PATTERN: &str = "frame_%06d.png";
const DEFAULT_FPS: f64 = 30.0;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("Video file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error(transparent)]
    Ffmpeg(#[from] FfmpegError),
    #[error("Failed to extract video metadata: {0}")]
    Metadata(String),
    #[error("Frame {}: {source}", path.display())]
    Frame {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub duration: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub total_frames: u64,
    pub codec: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    codec_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// `"30000/1001"` or `"25"` as frames per second. A zero denominator
/// falls back to 30.
pub fn parse_frame_rate(rate: &str) -> Result<f64, VideoError> {
    let bad = || VideoError::Metadata(format!("invalid frame rate: {rate}"));
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().map_err(|_| bad())?;
            let den: f64 = den.trim().parse().map_err(|_| bad())?;
            Ok(if den == 0.0 { DEFAULT_FPS } else { num / den })
        }
        None => rate.trim().parse().map_err(|_| bad()),
    }
}

/// Parse `ffprobe -of json` output.
pub fn parse_probe_output(json: &str) -> Result<VideoMetadata, VideoError> {
    let probe: ProbeOutput =
        serde_json::from_str(json).map_err(|e| VideoError::Metadata(e.to_string()))?;
    let stream = probe.streams.into_iter().next().unwrap_or_default();

    let fps = match stream.r_frame_rate.as_deref() {
        Some(rate) => parse_frame_rate(rate)?,
        None => DEFAULT_FPS,
    };
    let duration = match probe.format.duration.as_deref() {
        Some(d) => d
            .trim()
            .parse()
            .map_err(|_| VideoError::Metadata(format!("invalid duration: {d}")))?,
        None => 0.0,
    };

    Ok(VideoMetadata {
        duration,
        fps,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        total_frames: (duration * fps) as u64,
        codec: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
    })
}

/// `{stem}_{type}{.ext}` next to `output`.
pub fn video_output_path(output: &Path, deficiency: DeficiencyType) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = output
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let name = format!("{stem}_{}{suffix}", deficiency.name().to_ascii_lowercase());
    output.with_file_name(name)
}

pub struct VideoProcessor {
    ffmpeg: String,
    ffprobe: String,
}

impl VideoProcessor {
    /// Uses `ffmpeg` from PATH unless a path is given. Fails when the
    /// binary cannot be run.
    pub fn new(ffmpeg_path: Option<&str>) -> Result<Self, VideoError> {
        let processor = Self::with_program(ffmpeg_path.unwrap_or("ffmpeg"));
        let version = ffmpeg::version(&processor.ffmpeg)?;
        info!("FFmpeg found: {version}");
        Ok(processor)
    }

    fn with_program(ffmpeg: &str) -> Self {
        Self {
            ffmpeg: ffmpeg.to_string(),
            ffprobe: ffmpeg::ffprobe_for(ffmpeg),
        }
    }

    fn probe_command(&self, video: &Path) -> FfmpegCommand {
        FfmpegCommand::new(&self.ffprobe)
            .args(&[
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,codec_name",
                "-show_entries",
                "format=duration",
                "-of",
                "json",
            ])
            .output(video)
    }

    fn extract_command(&self, video: &Path, out_dir: &Path, fps: Option<f64>) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(&self.ffmpeg)
            .input(video)
            .args(&["-vsync", "0"]);
        if let Some(fps) = fps {
            cmd = cmd.arg("-vf").arg(format!("fps={fps}"));
        }
        cmd.args(&["-q:v", "2"]).output(out_dir.join(FRAME_PATTERN))
    }

    fn assemble_command(&self, frames_dir: &Path, output: &Path, fps: f64) -> FfmpegCommand {
        FfmpegCommand::new(&self.ffmpeg)
            .arg("-framerate")
            .arg(fps.to_string())
            .input(frames_dir.join(FRAME_PATTERN))
            .args(&["-c:v", "libx264", "-pix_fmt", "yuv420p", "-crf", "18", "-y"])
            .output(output)
    }

    pub fn get_metadata(&self, video: &Path) -> Result<VideoMetadata, VideoError> {
        if !video.exists() {
            return Err(VideoError::NotFound(video.to_path_buf()));
        }
        let output = self.probe_command(video).execute()?;
        let metadata = parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Video metadata: {metadata:?}");
        Ok(metadata)
    }

    /// Extract frames into `out_dir`, returning them in frame order.
    /// `fps: None` keeps every frame.
    pub fn extract_frames(
        &self,
        video: &Path,
        out_dir: &Path,
        fps: Option<f64>,
    ) -> Result<Vec<PathBuf>, VideoError> {
        if !video.exists() {
            return Err(VideoError::NotFound(video.to_path_buf()));
        }
        fs::create_dir_all(out_dir)?;
        info!("Extracting frames from {} to {}", video.display(), out_dir.display());
        self.extract_command(video, out_dir, fps).execute()?;

        let frames = list_frames(out_dir)?;
        info!("Extracted {} frames to {}", frames.len(), out_dir.display());
        Ok(frames)
    }

    /// Simulate every type in `types` over the whole video.
    ///
    /// `progress(done, total)` is called after each frame of each type.
    #[allow(clippy::too_many_arguments)]
    pub fn process_video<B: ImageBackend>(
        &self,
        video: &Path,
        backend: &B,
        simulator: &Simulator,
        output: &Path,
        types: &[DeficiencyType],
        fps: Option<f64>,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<BTreeMap<DeficiencyType, PathBuf>, VideoError> {
        let metadata = self.get_metadata(video)?;
        let fps = fps.unwrap_or(metadata.fps);

        let work = tempfile::tempdir()?;
        let frames = self.extract_frames(video, &work.path().join("frames"), Some(fps))?;

        let mut results = BTreeMap::new();
        for &ty in types {
            let type_dir = work.path().join(ty.value());
            fs::create_dir_all(&type_dir)?;
            info!("Processing {} simulation...", ty.name());

            for (i, frame) in frames.iter().enumerate() {
                let image = backend.decode(frame).map_err(|source| VideoError::Frame {
                    path: frame.clone(),
                    source,
                })?;
                let simulated = simulator.simulate(&image, ty)?;
                let target = type_dir.join(format!("frame_{:06}.png", i + 1));
                let params = EncodeParams {
                    output: target.clone(),
                    format: OutputFormat::Png,
                    quality: Quality::default(),
                    optimize: false,
                };
                backend
                    .encode(&simulated, &params)
                    .map_err(|source| VideoError::Frame {
                        path: target,
                        source,
                    })?;
                progress(i + 1, frames.len());
            }

            let out = video_output_path(output, ty);
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            info!("Assembling video: {}", out.display());
            self.assemble_command(&type_dir, &out, fps).execute()?;
            info!("Video saved: {}", out.display());
            results.insert(ty, out);
        }
        Ok(results)
    }
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, VideoError> {
    let mut frames: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("frame_") && n.ends_with(".png"))
        })
        .collect();
    frames.sort();
    Ok(frames)
}
