//! Error types for the downloader.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::area::AreaError;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while fetching boundaries or building footprints.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The HTTP client could not be built.
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    /// The boundary metadata lookup failed.
    #[error(
        "failed to fetch boundary metadata from {url}: {reason}. This probably means that \
         the country code ({country}) or the administrative level ({level}) doesn't exist"
    )]
    AdminMetadata {
        country: String,
        level: String,
        url: String,
        reason: String,
    },

    /// The boundary metadata did not name a file to download.
    #[error("no GeoJSON download URL in the metadata for {country} {level}")]
    MissingUrl { country: String, level: String },

    /// The building dataset listing could not be fetched or parsed.
    #[error("failed to fetch the building dataset listing from {url}: {reason}")]
    Listing { url: String, reason: String },

    /// Transfer of a data file failed.
    #[error("failed to download {url} ({context}): {reason}")]
    Transfer {
        context: String,
        url: String,
        reason: String,
    },

    /// Network timeout while transferring a data file.
    #[error("request to {url} ({context}) timed out after {timeout_secs}s without data")]
    Timeout {
        context: String,
        url: String,
        timeout_secs: u64,
    },

    /// Failed to create an output directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    /// Failed to write a downloaded file.
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    /// The mean area of a downloaded boundary file could not be computed.
    #[error("failed to measure boundaries for {country} {level}: {source}")]
    Area {
        country: String,
        level: String,
        source: AreaError,
    },

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_metadata_error_names_country_and_level() {
        let err = DownloadError::AdminMetadata {
            country: "XYZ".to_string(),
            level: "ADM2".to_string(),
            url: "https://example.com/XYZ/ADM2".to_string(),
            reason: "HTTP status 404 Not Found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("country code (XYZ)"));
        assert!(msg.contains("administrative level (ADM2)"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn test_transfer_error_display() {
        let err = DownloadError::Transfer {
            context: "CYP buildings".to_string(),
            url: "https://example.com/CYP.gpkg.zip".to_string(),
            reason: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to download https://example.com/CYP.gpkg.zip (CYP buildings): connection reset"
        );
    }
}
