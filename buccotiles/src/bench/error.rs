//! Error types for the format benchmark.

use std::path::PathBuf;

use thiserror::Error;

use crate::command::CommandError;

/// Result type for benchmark operations.
pub type BenchResult<T> = Result<T, BenchError>;

/// Errors that can occur while benchmarking a file.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("unsupported file format for {}: expected .gpkg, .fgb, .parquet or .zip", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("no geometry column found in {} (columns: {})", path.display(), columns.join(", "))]
    NoGeometryColumn { path: PathBuf, columns: Vec<String> },

    #[error("query returned no usable value: {0}")]
    EmptyResult(String),

    #[error("unreadable duckdb output: {0}")]
    Output(String),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Command(#[from] CommandError),
}
