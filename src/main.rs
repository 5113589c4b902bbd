use clap::Parser;
use cvd_sim::batch::{self, BatchError, BatchOptions};
use cvd_sim::config::{self, ConfigValues, SimulationConfig};
use cvd_sim::imaging::RustBackend;
use cvd_sim::naming::OutputNaming;
use cvd_sim::presets::PresetKind;
use cvd_sim::process::Processor;
use cvd_sim::profiling::TimingProfiler;
use cvd_sim::types::{Algorithm, DeficiencyType, LogLevel, OutputFormat};
use cvd_sim::{logging, output};
use std::error::Error;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "cvd-sim")]
#[command(about = "Simulate color vision deficiencies in images")]
#[command(long_about = "\
Simulate color vision deficiencies in images

Every input image is simulated for protanopia, deuteranopia, tritanopia and
grayscale (or one type with -t) and written to the output directory as

  {base}_image_{YYYYmmdd_HHMMSS}.{ext}

Inputs are processed in parallel. A bad input is reported and skipped; the
exit code is 0 only when every input succeeded.

Settings are layered, later layers win:

  defaults ← --config FILE ← CVD_SIMULATOR_* env ← --preset ← flags

Examples:
  cvd-sim input.jpg
  cvd-sim input.jpg -a machado_2009 -s 0.7
  cvd-sim img1.jpg img2.jpg img3.jpg --progress
  cvd-sim photos/ -r -j 4 -f png -o ./out
  cvd-sim input.jpg --preset web_design --metadata")]
#[command(version = version_string())]
struct Cli {
    /// Input images (or directories with -r, or videos with --video)
    inputs: Vec<PathBuf>,

    /// Simulation algorithm
    #[arg(short, long)]
    algorithm: Option<Algorithm>,

    /// Severity of the deficiency, 0.0-1.0
    #[arg(short, long)]
    severity: Option<f64>,

    /// Output image format
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JPEG quality, 1-95
    #[arg(short, long)]
    quality: Option<u32>,

    /// Use default PNG compression instead of best
    #[arg(long)]
    no_optimize: bool,

    /// Simulate only this type (protan, deutan, tritan, grayscale)
    #[arg(short = 't', long = "type")]
    deficiency: Option<DeficiencyType>,

    /// Print a line as each input finishes
    #[arg(long)]
    progress: bool,

    /// Apply a named preset (see --list-presets)
    #[arg(long)]
    preset: Option<PresetKind>,

    /// Write a JSON provenance sidecar per input
    #[arg(long, alias = "export-metadata")]
    metadata: bool,

    /// Print a timing summary at the end
    #[arg(long)]
    profile: bool,

    /// Log level (debug, info, warning, error, critical)
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the resolved configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// List available algorithms and exit
    #[arg(long)]
    list_algorithms: bool,

    /// List deficiency types and exit
    #[arg(long)]
    list_types: bool,

    /// List presets and exit
    #[arg(long)]
    list_presets: bool,

    /// Worker threads, used when the config does not set max_workers
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Process inputs in chunks of this many to bound memory
    #[arg(long)]
    chunk_size: Option<NonZeroUsize>,

    /// Expand directory inputs to the images beneath them
    #[arg(short, long)]
    recursive: bool,

    /// Treat inputs as videos (needs ffmpeg and ffprobe)
    #[arg(long)]
    video: bool,

    /// Frames per second to sample from videos
    #[arg(long)]
    video_fps: Option<f64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.list_algorithms {
        output::print_lines(&output::format_algorithm_list());
        return ExitCode::SUCCESS;
    }
    if cli.list_types {
        output::print_lines(&output::format_type_list());
        return ExitCode::SUCCESS;
    }
    if cli.list_presets {
        output::print_lines(&output::format_preset_list());
        return ExitCode::SUCCESS;
    }

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.print_config {
        return match toml::to_string_pretty(config.values()) {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        };
    }

    if cli.inputs.is_empty() {
        eprintln!("Error: no input images given (see --help)");
        return ExitCode::FAILURE;
    }

    if let Err(e) = logging::init(config.log_level(), cli.log_file.as_deref()) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }
    info!("cvd-sim {} starting", version_string());
    debug!("Configuration: {:?}", config.to_map());

    if let Some(kind) = cli.preset {
        println!("Using preset: {}", kind.preset().name);
    }

    let outcome = if cli.video {
        run_video(&cli, &config)
    } else {
        run_images(&cli, config)
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Layer config file and environment, then preset, then explicit flags.
fn resolve_config(cli: &Cli) -> Result<SimulationConfig, Box<dyn Error>> {
    let layered = config::load_config(cli.config.as_deref(), std::env::vars())?;
    let mut values = ConfigValues::from(layered);

    if let Some(kind) = cli.preset {
        values = kind.preset().overlay(&values);
    }
    if let Some(algorithm) = cli.algorithm {
        values.algorithm = algorithm;
    }
    if let Some(severity) = cli.severity {
        values.severity = severity;
    }
    if let Some(format) = cli.format {
        values.output_format = format;
    }
    if let Some(dir) = &cli.output {
        values.output_directory = dir.clone();
    }
    if let Some(quality) = cli.quality {
        values.quality = quality;
    }
    if cli.no_optimize {
        values.optimize = false;
    }
    if let Some(level) = cli.log_level {
        values.log_level = level;
    }
    if cli.verbose {
        values.log_level = LogLevel::Debug;
    }
    Ok(SimulationConfig::new(values)?)
}

/// Returns whether every input succeeded.
fn run_images(cli: &Cli, config: SimulationConfig) -> Result<bool, Box<dyn Error>> {
    let inputs = batch::expand_inputs(&cli.inputs, cli.recursive);
    let naming = if inputs.len() > 1 {
        OutputNaming::InputStem
    } else {
        OutputNaming::Deficiency
    };

    let backend = RustBackend::new();
    let timing = TimingProfiler::new();
    let mut processor = Processor::new(&backend, config)
        .with_naming(naming)
        .with_metadata(cli.metadata);
    if cli.profile {
        processor = processor.with_profiler(&timing);
    }

    let options = BatchOptions {
        deficiency: cli.deficiency,
        workers: cli.workers,
        chunk_size: cli.chunk_size,
    };
    if inputs.len() > 1 {
        println!("Processing {} images...", inputs.len());
    }
    let show_progress = cli.progress;
    let outcome = batch::process_batch_with_progress(&processor, &inputs, &options, |p| {
        if show_progress {
            eprintln!("{}", output::format_progress(&p));
        }
    });

    let (success, total) = match outcome {
        Ok(results) => {
            output::print_batch_results(&inputs, &results);
            (batch::success_count(&results), results.len())
        }
        Err(BatchError::AllFailed {
            failed,
            success_count,
        }) => {
            for item in &failed {
                eprintln!("{}", output::format_item_error(&item.path, &item.reason));
            }
            (success_count, success_count + failed.len())
        }
        Err(e) => return Err(e.into()),
    };

    println!();
    println!("{}", output::format_summary(success, total));
    if cli.profile {
        println!();
        println!("{}", timing.summary());
    }
    Ok(total > 0 && success == total)
}

#[cfg(feature = "video")]
fn run_video(cli: &Cli, config: &SimulationConfig) -> Result<bool, Box<dyn Error>> {
    use cvd_sim::simulate::Simulator;
    use cvd_sim::video::VideoProcessor;

    let videos = VideoProcessor::new(None)?;
    let backend = RustBackend::new();
    let simulator = Simulator::from_config(config);
    let types: Vec<DeficiencyType> = match cli.deficiency {
        Some(ty) => vec![ty],
        None => DeficiencyType::ALL.to_vec(),
    };

    let mut success = 0;
    for input in &cli.inputs {
        let Some(name) = input.file_name() else {
            eprintln!("{}", output::format_item_error(input, "not a file"));
            continue;
        };
        let target = config.output_directory().join(name);
        let show_progress = cli.progress;
        let result = videos.process_video(
            input,
            &backend,
            &simulator,
            &target,
            &types,
            cli.video_fps,
            |done, total| {
                if show_progress {
                    eprint!("\r  frame {done}/{total}");
                }
            },
        );
        if show_progress {
            eprintln!();
        }
        match result {
            Ok(outputs) => {
                output::print_lines(&output::format_video_result(input, &outputs));
                success += 1;
            }
            Err(e) => eprintln!("{}", output::format_item_error(input, &e.to_string())),
        }
    }

    println!();
    println!("Complete: {success}/{} videos processed successfully", cli.inputs.len());
    Ok(success == cli.inputs.len())
}

#[cfg(not(feature = "video"))]
fn run_video(_cli: &Cli, _config: &SimulationConfig) -> Result<bool, Box<dyn Error>> {
    Err("this build has no video support (enable the `video` feature)".into())
}
