//! Per-invocation setup shared by every command.

use std::path::PathBuf;

use buccotiles::config::{default_config_path, parse_max_zoom, ConfigFile, DataLayout};
use buccotiles::logging::{self, WorkerGuard};
use clap::Args;
use tokio::runtime::Runtime;
use tracing::info;

use crate::error::CliError;
use crate::progress::TerminalProgress;

/// Options accepted by every command. They override `config.ini`.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Configuration file (default: ~/.buccotiles/config.ini)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Root of the data directory tree
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Worker threads for subprocess stages
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Produce outputs again even if they exist
    #[arg(long, global = true)]
    pub overwrite: bool,

    /// Only process these country codes (comma separated)
    #[arg(long, global = true, value_delimiter = ',')]
    pub countries: Vec<String>,

    /// Maximum zoom of the building layer, or 'g' to let tippecanoe guess
    #[arg(long, global = true)]
    pub max_zoom: Option<String>,
}

impl GlobalArgs {
    /// Filter directive implied by `-v`/`-q`, if any.
    pub fn log_level(&self) -> Option<&'static str> {
        match (self.quiet, self.verbose) {
            (true, _) => Some("warn"),
            (false, 0) => None,
            (false, 1) => Some("debug"),
            (false, _) => Some("trace"),
        }
    }

    /// Apply command line values on top of the file.
    pub fn apply(&self, config: &mut ConfigFile) -> Result<(), CliError> {
        if let Some(dir) = &self.data_dir {
            config.layout = DataLayout::new(dir);
        }
        if let Some(workers) = self.workers {
            if workers == 0 {
                return Err(CliError::Config("--workers must be at least 1".to_string()));
            }
            config.pipeline.workers = Some(workers);
        }
        if self.overwrite {
            config.pipeline.overwrite = true;
        }
        if !self.countries.is_empty() {
            config.pipeline.countries = self
                .countries
                .iter()
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Some(zoom) = &self.max_zoom {
            config.pipeline.buildings_max_zoom = parse_max_zoom(zoom)?;
        }
        Ok(())
    }
}

/// Loaded configuration, logging and progress display for one command.
pub struct CliContext {
    config_path: PathBuf,
    config: ConfigFile,
    progress: TerminalProgress,
    _log_guard: Option<WorkerGuard>,
}

impl CliContext {
    /// Load the configuration and install logging.
    pub fn new(args: &GlobalArgs) -> Result<Self, CliError> {
        let config_path = match &args.config {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };
        let mut config = ConfigFile::load(&config_path)?;
        args.apply(&mut config)?;

        let progress = TerminalProgress::new();
        let log_guard = logging::init(&config.logging, args.log_level(), progress.log_writer())?;

        Ok(Self {
            config_path,
            config,
            progress,
            _log_guard: log_guard,
        })
    }

    /// Log what this invocation is about to do.
    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = env!("CARGO_PKG_VERSION"),
            config = %self.config_path.display(),
            data_dir = %self.config.layout.data_dir.display(),
            "buccotiles starting"
        );
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn progress(&self) -> &TerminalProgress {
        &self.progress
    }

    /// Runtime for commands that talk to the network.
    pub fn runtime(&self) -> Result<Runtime, CliError> {
        Runtime::new().map_err(|e| CliError::RuntimeCreation(e.to_string()))
    }
}
