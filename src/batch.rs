//! Parallel batch coordinator.
//!
//! Fans one [`Processor`] unit of work per input path out over a rayon
//! thread pool and gathers the outcomes into a [`BatchResult`] keyed by
//! input path.
//!
//! ```text
//! paths ──dedupe──▶ chunk 1 ──spawn N units──▶ pool ──mpsc──▶ collector ──▶ results
//!                   chunk 2 ──spawn N units──▶ pool ──mpsc──▶ collector ──▶ results
//!                   …                                             │
//!                                                                 └─▶ progress(completed, total)
//! ```
//!
//! ## Semantics
//!
//! - **One entry per distinct path.** Duplicates in the input are processed
//!   once. Completion order never matters; the map is keyed by path.
//! - **Per-item isolation.** A unit that fails (or panics) is recorded as
//!   [`ItemResult::Failed`]. The remaining units keep running.
//! - **Aggregate failure only when nothing succeeded.** If every unit failed
//!   the whole call returns [`BatchError::AllFailed`] with the full failed
//!   list. Partial failure is a normal return.
//! - **Chunking** bounds peak memory: chunks run one after another, each to
//!   completion. The final map is the same with or without chunking.
//! - **Workers** come from [`effective_workers`]: config `max_workers`, else
//!   the caller's override, else the core count, clamped to
//!   `1..=distinct paths`.
//!
//! Workers are threads in one process. The collector runs on the calling
//! thread (via `in_place_scope`), so a one-thread pool still makes progress.

use crate::config::effective_workers;
use crate::imaging::{ImageBackend, has_supported_extension};
use crate::process::Processor;
use crate::types::DeficiencyType;
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use thiserror::Error;
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Outcome for one input path.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemResult {
    /// Every deficiency type was written.
    All(BTreeMap<DeficiencyType, PathBuf>),
    /// The single requested type was written.
    Single(PathBuf),
    /// Nothing recorded for this path.
    Failed(String),
}

impl ItemResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, ItemResult::Failed(_))
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            ItemResult::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

pub type BatchResult = BTreeMap<PathBuf, ItemResult>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("All images failed to process ({} of {} failed)", failed.len(), failed.len() + success_count)]
    AllFailed {
        failed: Vec<FailedItem>,
        success_count: usize,
    },
    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Knobs for one batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Only this type per path, instead of all of them.
    pub deficiency: Option<DeficiencyType>,
    /// Used when the config does not set `max_workers`.
    pub workers: Option<usize>,
    /// Process this many paths at a time.
    pub chunk_size: Option<NonZeroUsize>,
}

/// Delivered to the progress callback after every completed unit.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'r> {
    pub completed: usize,
    pub total: usize,
    pub path: &'r Path,
    pub result: &'r ItemResult,
}

/// Process `paths` without progress reporting.
pub fn process_batch<B: ImageBackend>(
    processor: &Processor<'_, B>,
    paths: &[PathBuf],
    options: &BatchOptions,
) -> Result<BatchResult, BatchError> {
    process_batch_with_progress(processor, paths, options, |_| {})
}

/// Process `paths`, calling `progress` on the calling thread after each
/// unit completes.
pub fn process_batch_with_progress<B: ImageBackend>(
    processor: &Processor<'_, B>,
    paths: &[PathBuf],
    options: &BatchOptions,
    mut progress: impl FnMut(Progress<'_>),
) -> Result<BatchResult, BatchError> {
    let distinct = dedupe(paths);
    if distinct.is_empty() {
        warn!("No images to process");
        return Ok(BatchResult::new());
    }

    let total = distinct.len();
    let workers = effective_workers(processor.config(), options.workers, total);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("cvd-worker-{i}"))
        .build()?;
    let chunk_size = options.chunk_size.map_or(total, NonZeroUsize::get);
    info!(
        "Batch processing {total} images (workers: {workers}, chunk size: {chunk_size})"
    );

    let mut results = BatchResult::new();
    let mut completed = 0;

    for chunk in distinct.chunks(chunk_size) {
        let (tx, rx) = mpsc::channel::<(&Path, ItemResult)>();
        pool.in_place_scope(|scope| {
            for path in chunk {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let outcome = run_unit(processor, path, options.deficiency);
                    // Receiver outlives every sender in this scope.
                    let _ = tx.send((path.as_path(), outcome));
                });
            }
            drop(tx);

            for (path, outcome) in rx {
                completed += 1;
                progress(Progress {
                    completed,
                    total,
                    path,
                    result: &outcome,
                });
                results.insert(path.to_path_buf(), outcome);
            }
        });
    }

    finalize(&distinct, results)
}

/// Input paths in first-seen order, each once.
fn dedupe(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = BTreeSet::new();
    paths
        .iter()
        .filter(|p| seen.insert(p.as_path()))
        .cloned()
        .collect()
}

/// One unit of work. Never fails the batch: errors and panics become
/// [`ItemResult::Failed`].
fn run_unit<B: ImageBackend>(
    processor: &Processor<'_, B>,
    path: &Path,
    deficiency: Option<DeficiencyType>,
) -> ItemResult {
    let attempt = catch_unwind(AssertUnwindSafe(|| match deficiency {
        Some(ty) => processor.process_image_type(path, ty).map(ItemResult::Single),
        None => processor.process_image(path).map(ItemResult::All),
    }));

    match attempt {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!("Failed to process {}: {e}", path.display());
            ItemResult::Failed(e.to_string())
        }
        Err(_) => {
            error!("Worker panicked while processing {}", path.display());
            ItemResult::Failed("worker panicked".to_string())
        }
    }
}

fn finalize(order: &[PathBuf], results: BatchResult) -> Result<BatchResult, BatchError> {
    let failed: Vec<FailedItem> = order
        .iter()
        .filter_map(|p| {
            results.get(p).and_then(ItemResult::failure).map(|reason| FailedItem {
                path: p.clone(),
                reason: reason.to_string(),
            })
        })
        .collect();
    let success_count = results.len() - failed.len();

    if failed.is_empty() {
        info!("Batch complete: all {success_count} images processed successfully");
    } else {
        warn!(
            "Batch complete: {success_count} succeeded, {} failed",
            failed.len()
        );
        if success_count == 0 {
            return Err(BatchError::AllFailed {
                failed,
                success_count: 0,
            });
        }
    }
    Ok(results)
}

/// Replace directory inputs with the supported images beneath them.
///
/// Without `recursive`, inputs pass through untouched and a directory will
/// fail validation as `NOT_A_FILE`.
pub fn expand_inputs(inputs: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for input in inputs {
        if recursive && input.is_dir() {
            let found = WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| has_supported_extension(p));
            paths.extend(found);
        } else {
            paths.push(input.clone());
        }
    }
    paths
}

/// Number of entries that succeeded.
pub fn success_count(results: &BatchResult) -> usize {
    results.values().filter(|r| r.is_success()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigValues, SimulationConfig};
    use crate::imaging::backend::tests::MockBackend;
    use crate::naming::OutputNaming;
    use crate::simulate::tests::FailingTransform;
    use crate::simulate::Simulator;
    use crate::test_helpers::*;
    use tempfile::TempDir;

    fn config(dir: &Path, max_workers: Option<usize>) -> SimulationConfig {
        SimulationConfig::new(ConfigValues {
            output_directory: dir.join("out"),
            max_workers,
            ..Default::default()
        })
        .unwrap()
    }

    fn valid_inputs(dir: &Path, n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| {
                let p = dir.join(format!("img{i}.png"));
                create_test_png(&p, 6, 6, [i as u8, 50, 100]);
                p
            })
            .collect()
    }

    // =========================================================================
    // Result shape
    // =========================================================================

    #[test]
    fn one_entry_per_distinct_path() {
        let tmp = TempDir::new().unwrap();
        let inputs = valid_inputs(tmp.path(), 5);
        let backend = MockBackend::new();
        let processor = Processor::new(&backend, config(tmp.path(), None))
            .with_naming(OutputNaming::InputStem);

        let results = process_batch(&processor, &inputs, &BatchOptions::default()).unwrap();
        assert_eq!(results.len(), 5);
        for p in &inputs {
            assert!(matches!(&results[p], ItemResult::All(m) if m.len() == 4));
        }
    }

    #[test]
    fn duplicate_paths_processed_once() {
        let tmp = TempDir::new().unwrap();
        let inputs = valid_inputs(tmp.path(), 2);
        let doubled = vec![
            inputs[0].clone(),
            inputs[1].clone(),
            inputs[0].clone(),
        ];
        let backend = MockBackend::new();
        let processor = Processor::new(&backend, config(tmp.path(), None));

        let results = process_batch(&processor, &doubled, &BatchOptions::default()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(backend.encode_count(), 8);
    }

    #[test]
    fn single_type_requested() {
        let tmp = TempDir::new().unwrap();
        let inputs = valid_inputs(tmp.path(), 3);
        let backend = MockBackend::new();
        let processor = Processor::new(&backend, config(tmp.path(), None))
            .with_naming(OutputNaming::InputStem);
        let options = BatchOptions {
            deficiency: Some(DeficiencyType::Deutan),
            ..Default::default()
        };

        let results = process_batch(&processor, &inputs, &options).unwrap();
        for p in &inputs {
            assert!(matches!(&results[p], ItemResult::Single(out)
                if out.to_string_lossy().contains("_deutan_image_")));
        }
        assert_eq!(backend.encode_count(), 3);
    }

    #[test]
    fn empty_input_is_empty_result() {
        let tmp = TempDir::new().unwrap();
        let backend = MockBackend::new();
        let processor = Processor::new(&backend, config(tmp.path(), None));
        let results = process_batch(&processor, &[], &BatchOptions::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn same_stem_in_different_directories_keeps_both_outputs() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        for dir in ["a", "b"] {
            std::fs::create_dir_all(src.join(dir)).unwrap();
            create_test_png(&src.join(dir).join("img.png"), 6, 6, [10, 20, 30]);
        }
        let inputs = expand_inputs(&[src], true);
        assert_eq!(inputs.len(), 2);

        let backend = crate::imaging::RustBackend::new();
        let processor = Processor::new(&backend, config(tmp.path(), None))
            .with_naming(OutputNaming::InputStem)
            .with_metadata(true)
            .with_timestamp("T");
        let options = BatchOptions {
            deficiency: Some(DeficiencyType::Protan),
            ..Default::default()
        };

        let results = process_batch(&processor, &inputs, &options).unwrap();
        let outputs: Vec<&PathBuf> = results
            .values()
            .map(|r| match r {
                ItemResult::Single(out) => out,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_ne!(outputs[0], outputs[1]);
        assert!(outputs.iter().all(|p| p.exists()));

        let sidecars = std::fs::read_dir(tmp.path().join("out"))
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with("_metadata.json")
            })
            .count();
        assert_eq!(sidecars, 2);
    }

    // =========================================================================
    // Failure aggregation
    // =========================================================================

    #[test]
    fn all_invalid_is_aggregate_failure() {
        let tmp = TempDir::new().unwrap();
        let inputs: Vec<PathBuf> = (0..4)
            .map(|i| tmp.path().join(format!("missing{i}.png")))
            .collect();
        let backend = MockBackend::new();
        let processor = Processor::new(&backend, config(tmp.path(), None));

        let err = process_batch(&processor, &inputs, &BatchOptions::default()).unwrap_err();
        match err {
            BatchError::AllFailed {
                failed,
                success_count,
            } => {
                assert_eq!(success_count, 0);
                assert_eq!(failed.len(), 4);
                let paths: Vec<PathBuf> = failed.into_iter().map(|f| f.path).collect();
                assert_eq!(paths, inputs);
            }
            other => panic!("expected AllFailed, got {other}"),
        }
    }

    #[test]
    fn partial_failure_returns_normally() {
        let tmp = TempDir::new().unwrap();
        let good = valid_inputs(tmp.path(), 1).remove(0);
        let missing = tmp.path().join("missing.png");
        let garbage = tmp.path().join("garbage.png");
        write_bytes(&garbage, b"not an image");
        let backend = MockBackend::new();
        let processor = Processor::new(&backend, config(tmp.path(), None));

        let inputs = vec![missing.clone(), good.clone(), garbage.clone()];
        let results = process_batch(&processor, &inputs, &BatchOptions::default()).unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[&good].is_success());
        assert!(results[&missing].failure().unwrap().contains("FILE_NOT_FOUND"));
        assert!(results[&garbage].failure().unwrap().contains("UNKNOWN_FORMAT"));
        assert_eq!(success_count(&results), 1);
    }

    #[test]
    fn mid_unit_failure_records_no_partial_outputs() {
        let tmp = TempDir::new().unwrap();
        let inputs = valid_inputs(tmp.path(), 2);
        let backend = MockBackend::new();
        let processor = Processor::new(&backend, config(tmp.path(), None))
            .with_simulator(Simulator::with_transform(Box::new(FailingTransform), 1.0));

        let err = process_batch(&processor, &inputs, &BatchOptions::default()).unwrap_err();
        assert!(matches!(err, BatchError::AllFailed { ref failed, .. } if failed.len() == 2));
    }

    // =========================================================================
    // Workers, chunking, progress
    // =========================================================================

    #[test]
    fn chunking_and_worker_count_do_not_change_results() {
        let tmp = TempDir::new().unwrap();
        let mut inputs = valid_inputs(tmp.path(), 7);
        inputs.push(tmp.path().join("missing.png"));

        let baseline = {
            let backend = MockBackend::new();
            let processor = Processor::new(&backend, config(tmp.path(), Some(1)))
                .with_naming(OutputNaming::InputStem)
                .with_timestamp("T");
            process_batch(&processor, &inputs, &BatchOptions::default()).unwrap()
        };

        for (workers, chunk) in [(Some(1), Some(3)), (Some(4), None), (Some(3), Some(1)), (None, Some(5))] {
            let backend = MockBackend::new();
            let processor = Processor::new(&backend, config(tmp.path(), workers))
                .with_naming(OutputNaming::InputStem)
                .with_timestamp("T");
            let options = BatchOptions {
                chunk_size: chunk.and_then(NonZeroUsize::new),
                ..Default::default()
            };
            let results = process_batch(&processor, &inputs, &options).unwrap();
            assert_eq!(results, baseline, "workers={workers:?} chunk={chunk:?}");
        }
    }

    #[test]
    fn progress_called_once_per_item_across_chunks() {
        let tmp = TempDir::new().unwrap();
        let inputs = valid_inputs(tmp.path(), 5);
        let backend = MockBackend::new();
        let processor = Processor::new(&backend, config(tmp.path(), Some(2)));
        let options = BatchOptions {
            chunk_size: NonZeroUsize::new(2),
            ..Default::default()
        };

        let mut seen = Vec::new();
        process_batch_with_progress(&processor, &inputs, &options, |p| {
            seen.push((p.completed, p.total));
        })
        .unwrap();

        assert_eq!(seen, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
    }

    #[test]
    fn dedupe_keeps_first_seen_order() {
        let paths: Vec<PathBuf> = ["b", "a", "b", "c", "a"].iter().map(PathBuf::from).collect();
        assert_eq!(
            dedupe(&paths),
            vec![PathBuf::from("b"), PathBuf::from("a"), PathBuf::from("c")]
        );
    }

    #[test]
    fn recursive_expansion_finds_supported_images() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        create_test_png(&tmp.path().join("a/one.png"), 2, 2, [0, 0, 0]);
        create_test_jpeg(&nested.join("two.JPG"), 2, 2);
        write_bytes(&nested.join("notes.txt"), b"hi");
        let file = tmp.path().join("loose.png");
        create_test_png(&file, 2, 2, [0, 0, 0]);

        let inputs = vec![tmp.path().join("a"), file.clone()];
        let expanded = expand_inputs(&inputs, true);
        assert_eq!(
            expanded,
            vec![
                tmp.path().join("a/b/two.JPG"),
                tmp.path().join("a/one.png"),
                file.clone(),
            ]
        );

        assert_eq!(expand_inputs(&inputs, false), inputs);
    }

    #[test]
    fn aggregate_error_message() {
        let err = BatchError::AllFailed {
            failed: vec![FailedItem {
                path: "x".into(),
                reason: "bad".into(),
            }],
            success_count: 0,
        };
        assert_eq!(err.to_string(), "All images failed to process (1 of 1 failed)");
    }
}
