//! CLI error type.

use std::fmt;

use buccotiles::command::CommandError;
use buccotiles::config::ConfigError;
use buccotiles::logging::LoggingError;
use buccotiles::pipeline::PipelineError;
use buccotiles::upload::UploadError;

/// Errors that end a command with a non-zero exit code.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or is inconsistent.
    Config(String),

    /// Logging could not be installed.
    Logging(LoggingError),

    /// Failed to create the Tokio runtime.
    RuntimeCreation(String),

    /// A pipeline run or stage stopped.
    Pipeline(PipelineError),

    /// An external tool failed outright.
    Tool(CommandError),

    /// Object storage could not be used.
    Upload(UploadError),

    /// The command finished, but some items failed.
    Incomplete(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "Failed to set up logging: {}", e),
            CliError::RuntimeCreation(msg) => write!(f, "Failed to create Tokio runtime: {}", msg),
            CliError::Pipeline(e) => write!(f, "Pipeline failed: {}", e),
            CliError::Tool(e) => write!(f, "Tool failed: {}", e),
            CliError::Upload(e) => write!(f, "Storage error: {}", e),
            CliError::Incomplete(msg) => write!(f, "Finished with failures: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Logging(e) => Some(e),
            CliError::Pipeline(e) => Some(e),
            CliError::Tool(e) => Some(e),
            CliError::Upload(e) => Some(e),
            CliError::Config(_) | CliError::RuntimeCreation(_) | CliError::Incomplete(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        CliError::Pipeline(e)
    }
}

impl From<CommandError> for CliError {
    fn from(e: CommandError) -> Self {
        CliError::Tool(e)
    }
}

impl From<UploadError> for CliError {
    fn from(e: UploadError) -> Self {
        CliError::Upload(e)
    }
}
