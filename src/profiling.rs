//! Optional timing of pipeline stages.
//!
//! A [`Profiler`] is passed explicitly to whatever wants timing. The CLI
//! builds a [`TimingProfiler`] when `--profile` is set and a
//! [`NoopProfiler`] otherwise, so the processing code never checks a flag.
//!
//! ```text
//! Performance Profile Summary
//! ======================================================================
//! Operation                 Calls    Total (ms)   Avg (ms)
//! ----------------------------------------------------------------------
//! simulate                  8        412.33       51.54
//! encode                    8        97.10        12.14
//! ----------------------------------------------------------------------
//! TOTAL                              509.43
//! ```

use crate::types::DeficiencyType;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sink for timing measurements. Shared across worker threads.
pub trait Profiler: Sync {
    fn record(&self, operation: &str, elapsed: Duration);
}

/// Run `f`, recording its wall time under `operation`.
pub fn timed<T>(profiler: &dyn Profiler, operation: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    profiler.record(operation, start.elapsed());
    out
}

/// Discards every measurement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProfiler;

impl Profiler for NoopProfiler {
    fn record(&self, _operation: &str, _elapsed: Duration) {}
}

/// Aggregate statistics for one operation name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingReport {
    pub operation: String,
    pub total_ms: f64,
    pub calls: u64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl TimingReport {
    fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            total_ms: 0.0,
            calls: 0,
            min_ms: f64::INFINITY,
            max_ms: 0.0,
        }
    }

    fn add(&mut self, ms: f64) {
        self.total_ms += ms;
        self.calls += 1;
        self.min_ms = self.min_ms.min(ms);
        self.max_ms = self.max_ms.max(ms);
    }

    pub fn avg_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_ms / self.calls as f64
        }
    }
}

/// Collects per-operation timings behind a mutex.
#[derive(Debug, Default)]
pub struct TimingProfiler {
    timings: Mutex<BTreeMap<String, TimingReport>>,
}

impl TimingProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, TimingReport>> {
        self.timings.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn report(&self, operation: &str) -> Option<TimingReport> {
        self.lock().get(operation).cloned()
    }

    /// All reports, largest total time first.
    pub fn reports(&self) -> Vec<TimingReport> {
        let mut reports: Vec<TimingReport> = self.lock().values().cloned().collect();
        reports.sort_by(|a, b| b.total_ms.total_cmp(&a.total_ms));
        reports
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    pub fn summary(&self) -> String {
        let reports = self.reports();
        if reports.is_empty() {
            return "No timing data recorded.".to_string();
        }

        let mut lines = vec![
            "Performance Profile Summary".to_string(),
            "=".repeat(70),
            format!("{:<25} {:<8} {:<12} {:<12}", "Operation", "Calls", "Total (ms)", "Avg (ms)"),
            "-".repeat(70),
        ];
        for r in &reports {
            lines.push(format!(
                "{:<25} {:<8} {:<12.2} {:<12.2}",
                r.operation,
                r.calls,
                r.total_ms,
                r.avg_ms()
            ));
        }
        let total: f64 = reports.iter().map(|r| r.total_ms).sum();
        lines.push("-".repeat(70));
        lines.push(format!("{:<25} {:<8} {:<12.2}", "TOTAL", "", total));
        lines.join("\n")
    }
}

impl Profiler for TimingProfiler {
    fn record(&self, operation: &str, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.lock()
            .entry(operation.to_string())
            .or_insert_with(|| TimingReport::new(operation))
            .add(ms);
    }
}

/// Rough wall-time projection for a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchEstimate {
    pub per_image_ms: f64,
    pub total_ms: f64,
}

impl BatchEstimate {
    pub fn total_seconds(&self) -> f64 {
        self.total_ms / 1000.0
    }

    pub fn total_minutes(&self) -> f64 {
        self.total_ms / 60_000.0
    }
}

/// Every image is simulated once per deficiency type.
pub fn estimate_batch_time(image_count: usize, avg_ms_per_type: f64) -> BatchEstimate {
    let per_image_ms = avg_ms_per_type * DeficiencyType::ALL.len() as f64;
    BatchEstimate {
        per_image_ms,
        total_ms: per_image_ms * image_count as f64,
    }
}
