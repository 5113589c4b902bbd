//! Tracing subscriber setup for the binary.
//!
//! `RUST_LOG`, when set, wins over the level from config or flags, e.g.
//! `RUST_LOG=cvd_sim::batch=debug`. With a log file, lines are written there
//! without ANSI colors instead of to stderr.

use crate::types::LogLevel;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Cannot open log file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Logger already initialized: {0}")]
    Init(String),
}

/// Filter directive for a configured level.
pub fn directive(level: LogLevel) -> String {
    level.tracing_level().as_str().to_ascii_lowercase()
}

fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(level)))
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init(level: LogLevel, log_file: Option<&Path>) -> Result<(), LoggingError> {
    let builder = fmt().with_env_filter(filter(level)).with_target(true);

    let result = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    result.map_err(|e| LoggingError::Init(e.to_string()))
}

/// Debug-level logging routed through the test harness.
#[cfg(test)]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
