//! FFmpeg / ffprobe command wrapper.

use std::path::Path;
use std::process::{Command, Output};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("{0} not found. Install FFmpeg and make sure it is on PATH")]
    NotInstalled(String),

    #[error("{program} failed: {stderr}")]
    ExecutionFailed { program: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Argument list for one `ffmpeg` or `ffprobe` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegCommand {
    program: String,
    args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push("-i".to_string());
        self.args.push(path.as_ref().display().to_string());
        self
    }

    pub fn output(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().display().to_string());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Run to completion, failing on a non-zero exit status.
    pub fn execute(self) -> Result<Output, FfmpegError> {
        debug!("Running {} {}", self.program, self.args.join(" "));
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FfmpegError::NotInstalled(self.program.clone()),
                _ => FfmpegError::Io(e),
            })?;

        if !output.status.success() {
            return Err(FfmpegError::ExecutionFailed {
                program: self.program,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

/// First line of `{program} -version`, or `NotInstalled`.
pub fn version(program: &str) -> Result<String, FfmpegError> {
    let output = FfmpegCommand::new(program).arg("-version").execute()?;
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string())
}

/// The `ffprobe` that ships next to `ffmpeg_path`.
pub fn ffprobe_for(ffmpeg_path: &str) -> String {
    match ffmpeg_path.rfind("ffmpeg") {
        Some(at) => format!("{}ffprobe{}", &ffmpeg_path[..at], &ffmpeg_path[at + 6..]),
        None => "ffprobe".to_string(),
    }
}
