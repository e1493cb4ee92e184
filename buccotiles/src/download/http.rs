//! Async HTTP fetching with streaming to disk.
//!
//! One [`HttpFetcher`] is shared by every concurrent transfer of a stage.
//! Only connect and per-read timeouts are set; a large file may take as long
//! as it needs as long as bytes keep arriving.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use super::error::{DownloadError, DownloadResult};
use super::progress::ProgressReporter;
use crate::config::SourcesConfig;

/// Buffer size for writing downloads (64KB).
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Suffix of in-flight downloads; renamed away on completion.
const PARTIAL_SUFFIX: &str = "part";

/// Shared HTTP session for one download stage.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    read_timeout: Duration,
}

impl HttpFetcher {
    /// Session for bulk transfers: connect and read timeouts, no total timeout.
    pub fn for_downloads(sources: &SourcesConfig) -> DownloadResult<Self> {
        let client = Client::builder()
            .connect_timeout(sources.connect_timeout)
            .read_timeout(sources.read_timeout)
            .build()
            .map_err(|e| DownloadError::Client(e.to_string()))?;

        Ok(Self {
            client,
            read_timeout: sources.read_timeout,
        })
    }

    /// Session for small metadata calls with a total timeout.
    pub fn for_metadata(timeout: Duration) -> DownloadResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DownloadError::Client(e.to_string()))?;

        Ok(Self {
            client,
            read_timeout: timeout,
        })
    }

    /// GET a JSON document. Non-2xx statuses are errors.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await
    }

    /// Stream `url` into `dest`, reporting progress under `label`.
    ///
    /// The body is written to `dest.part` and renamed once complete, so an
    /// interrupted transfer never looks like a finished file. The `.part` file
    /// is removed when the transfer fails or is cancelled.
    pub async fn download_to(
        &self,
        url: &str,
        dest: &Path,
        label: &str,
        progress: &dyn ProgressReporter,
    ) -> DownloadResult<u64> {
        let transfer_error = |e: reqwest::Error| {
            if e.is_timeout() {
                DownloadError::Timeout {
                    context: label.to_string(),
                    url: url.to_string(),
                    timeout_secs: self.read_timeout.as_secs(),
                }
            } else {
                DownloadError::Transfer {
                    context: label.to_string(),
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(transfer_error)?;

        let total_bytes = response.content_length().unwrap_or(0);
        let partial = PartialFile::new(partial_path(dest));

        let file = fs::File::create(partial.path())
            .await
            .map_err(|e| DownloadError::Write {
                path: partial.path().to_path_buf(),
                source: e,
            })?;
        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
        let mut tracker = progress.start(label, total_bytes);
        let mut downloaded = 0u64;

        while let Some(chunk) = response.chunk().await.map_err(transfer_error)? {
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::Write {
                    path: partial.path().to_path_buf(),
                    source: e,
                })?;
            downloaded += chunk.len() as u64;
            tracker.advance(chunk.len() as u64);
        }

        writer.flush().await.map_err(|e| DownloadError::Write {
            path: partial.path().to_path_buf(),
            source: e,
        })?;
        drop(writer);
        tracker.finish();

        fs::rename(partial.path(), dest)
            .await
            .map_err(|e| DownloadError::Write {
                path: dest.to_path_buf(),
                source: e,
            })?;
        partial.keep();

        debug!(url, bytes = downloaded, "download complete");
        Ok(downloaded)
    }
}

/// `CYP.gpkg.zip` → `CYP.gpkg.zip.part`.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// An in-flight `.part` file, deleted on drop unless kept.
///
/// Also runs when the download future is dropped mid-transfer.
struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// The file was renamed into place; nothing to clean up.
    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed partial download"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not remove partial download"),
        }
    }
}

/// Create `dir` and its parents.
pub async fn ensure_dir(dir: &Path) -> DownloadResult<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| DownloadError::CreateDir {
            path: dir.to_path_buf(),
            source: e,
        })
}
