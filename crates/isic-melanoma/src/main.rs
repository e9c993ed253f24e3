//! Prepares the ISIC 2020 dermoscopy images for binary melanoma classification.
//!
//! Dataset from: https://challenge2020.isic-archive.com/
use crate::config::{PrepareConfig, StratifyKey};
use crate::error::PrepError;
use crate::pipeline::Pipeline;
use burn::backend::NdArray;
use burn::config::Config;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;

mod acquire;
mod augment;
mod config;
mod data;
mod error;
mod materialize;
mod metadata;
mod pipeline;
mod report;
mod split;

#[derive(Parser)]
#[command(name = "isic-melanoma")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Download, split and stream the ISIC 2020 melanoma dataset", long_about = None)]
struct Cli {
    /// JSON config written by `init-config`
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the data folder of the config
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Overrides the split seed of the config
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Overrides the column used to stratify the split.
    ///
    /// The full ISIC 2020 table has raw diagnoses with a single image, so the
    /// default `raw-diagnosis` key only splits it with `drop_singleton_classes`
    /// set in the config. `collapsed-diagnosis` works without it.
    #[arg(long, global = true, value_enum)]
    stratify_key: Option<StratifyKey>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole preparation: download, split, copy and build the batch streams
    Run {
        /// Use whatever is already in the data folder instead of downloading
        #[arg(long)]
        skip_download: bool,

        /// Pull this many batches from each stream once everything is in place
        #[arg(long, default_value_t = 0)]
        steps: usize,
    },

    /// Print the folder tree of a directory with per-folder file counts
    Report {
        path: PathBuf,

        /// Also descend into dot-prefixed folders
        #[arg(long)]
        all: bool,
    },

    /// Write the default config to a JSON file
    InitConfig {
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    SimpleLogger::new().with_level(level).init().ok();

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<(), PrepError> {
    let mut config = match &cli.config {
        Some(path) => PrepareConfig::from_file(path)?,
        None => PrepareConfig::new(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(stratify_key) = cli.stratify_key {
        config.stratify_key = stratify_key;
    }

    match cli.command {
        Commands::Run { skip_download, steps } => run(config, skip_download, steps),
        Commands::Report { path, all } => report::print_directory_summary(path, !all),
        Commands::InitConfig { path } => {
            config.save(&path)?;
            println!("Wrote default config to {}", path.display());
            Ok(())
        }
    }
}

fn run(config: PrepareConfig, skip_download: bool, steps: usize) -> Result<(), PrepError> {
    let time = SystemTime::now();

    let prepared = Pipeline::new(config)
        .with_skip_download(skip_download)
        .run::<NdArray>(Default::default())?;

    let positives = prepared.records.iter().filter(|record| record.melanoma).count();
    log::info!("{positives} of {} metadata rows are labelled melanoma", prepared.records.len());
    log::info!(
        "Copied {} of {} images into {} ({} missing)",
        prepared.copy_report.copied,
        prepared.assignment.len(),
        prepared.layout.root.display(),
        prepared.copy_report.missing.len()
    );

    if steps > 0 {
        for (name, stream) in [("training", &prepared.train), ("validation", &prepared.validation)] {
            for (step, batch) in stream.steps(steps).enumerate() {
                println!("{name} step {step}: images {:?}, targets {:?}", batch.images.dims(), batch.targets.dims());
            }
        }
    }

    println!("Time to prepare: {}", time.elapsed().map(|elapsed| elapsed.as_millis()).unwrap_or_default() as f64 / 1000.0);

    Ok(())
}
