//! buccotiles CLI - Command-line interface
//!
//! Runs the building tiles pipeline, or any of its stages, and the
//! geospatial format benchmark.

mod commands;
mod context;
mod error;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::bench::BenchArgs;
use commands::pipeline::RunArgs;
use commands::storage::StorageAction;
use context::{CliContext, GlobalArgs};
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "buccotiles")]
#[command(version, about = "Building footprint tiles and geospatial format benchmarks")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the whole pipeline: download, convert, tile, join and upload
    Run {
        /// Keep the merged archive local
        #[arg(long)]
        no_upload: bool,
    },

    /// Download administrative boundaries and building footprints
    Download,

    /// Convert downloaded footprints to FlatGeobuf
    Convert,

    /// Generate one PMTiles archive per country layer
    Tiles,

    /// Join layers per country, then all countries into one archive
    Join,

    /// Show how far each downloaded country has got
    Status,

    /// Object storage operations
    Storage {
        #[command(subcommand)]
        action: StorageAction,
    },

    /// Compare read performance of GeoPackage, FlatGeobuf and GeoParquet
    Bench {
        /// File to benchmark as name=path; repeat for each file (first is the baseline)
        #[arg(long = "file")]
        files: Vec<String>,

        /// Side length of the bbox filter boxes; repeat for each size
        #[arg(long = "bbox-size")]
        bbox_sizes: Vec<f64>,

        /// Random boxes per size
        #[arg(long)]
        iterations: Option<usize>,

        /// Seed for the random boxes
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Convert a GeoPackage (plain or zipped) to GeoParquet
    ToParquet {
        /// Input .gpkg or .gpkg.zip
        input: PathBuf,

        /// Output .parquet (default: next to the input)
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    let ctx = CliContext::new(&cli.global)?;

    match cli.command {
        Commands::Run { no_upload } => commands::pipeline::run(&ctx, RunArgs { no_upload }),
        Commands::Download => commands::pipeline::download(&ctx),
        Commands::Convert => commands::pipeline::convert(&ctx),
        Commands::Tiles => commands::pipeline::tiles(&ctx),
        Commands::Join => commands::pipeline::join(&ctx),
        Commands::Status => commands::pipeline::status(&ctx),
        Commands::Storage { action } => commands::storage::run(&ctx, action),
        Commands::Bench {
            files,
            bbox_sizes,
            iterations,
            seed,
        } => commands::bench::run(
            &ctx,
            BenchArgs {
                files,
                bbox_sizes,
                iterations,
                seed,
            },
        ),
        Commands::ToParquet { input, output } => commands::bench::to_parquet(&ctx, input, output),
    }
}
