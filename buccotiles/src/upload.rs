//! Upload of the final archive to S3-compatible object storage.
//!
//! Endpoint, bucket and region come from the `[storage]` config section,
//! the keys from a dotenv-style credentials file:
//!
//! ```text
//! ACCESS_KEY=...
//! SECRET_KEY=...
//! ```
//!
//! Each artifact is sent as one multipart upload without retries.

use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ini::Ini;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, RetryConfig, WriteMultipart};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::download::ProgressReporter;

/// Result type for storage operations.
pub type UploadResult<T> = Result<T, UploadError>;

/// Bytes read from disk per multipart write.
const READ_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Parts in flight at once.
const MAX_CONCURRENT_PARTS: usize = 4;

/// Credentials file keys.
const ACCESS_KEY: &str = "ACCESS_KEY";
const SECRET_KEY: &str = "SECRET_KEY";

/// Errors talking to object storage.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read credentials file {}: {reason}", path.display())]
    Credentials { path: PathBuf, reason: String },

    #[error("credentials file {} has no {key}", path.display())]
    MissingCredential { path: PathBuf, key: &'static str },

    #[error("invalid storage configuration: {0}")]
    Build(String),

    #[error("storage endpoint {endpoint} is unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("access denied to bucket {bucket}: {reason}. Check the keys in the credentials file")]
    AccessDenied { bucket: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Object storage access keys.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn load(path: &Path) -> UploadResult<Self> {
        let ini = Ini::load_from_file(path).map_err(|e| UploadError::Credentials {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini, path)
    }

    pub fn parse(text: &str, origin: &Path) -> UploadResult<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| UploadError::Credentials {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini, origin)
    }

    fn from_ini(ini: &Ini, origin: &Path) -> UploadResult<Self> {
        let section = ini.general_section();
        let get = |key: &'static str| {
            section
                .get(key)
                .map(unquote)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| UploadError::MissingCredential {
                    path: origin.to_path_buf(),
                    key,
                })
        };
        Ok(Self {
            access_key: get(ACCESS_KEY)?,
            secret_key: get(SECRET_KEY)?,
        })
    }
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
            return inner.to_string();
        }
    }
    value.to_string()
}

/// Sends local files to one bucket.
#[derive(Debug, Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    endpoint: String,
    bucket: String,
}

impl Uploader {
    /// Connect with the configured endpoint and the credentials file.
    pub fn connect(storage: &StorageConfig) -> UploadResult<Self> {
        let credentials = Credentials::load(&storage.credentials_file)?;
        Self::with_credentials(storage, &credentials)
    }

    pub fn with_credentials(storage: &StorageConfig, credentials: &Credentials) -> UploadResult<Self> {
        let store = AmazonS3Builder::new()
            .with_endpoint(&storage.endpoint)
            .with_bucket_name(&storage.bucket)
            .with_region(&storage.region)
            .with_access_key_id(&credentials.access_key)
            .with_secret_access_key(&credentials.secret_key)
            .with_allow_http(storage.endpoint.starts_with("http://"))
            .with_retry(RetryConfig {
                max_retries: 0,
                ..Default::default()
            })
            .build()
            .map_err(|e| UploadError::Build(e.to_string()))?;

        Ok(Self::from_store(Arc::new(store), &storage.endpoint, &storage.bucket))
    }

    /// Wrap an existing store.
    pub fn from_store(store: Arc<dyn ObjectStore>, endpoint: &str, bucket: &str) -> Self {
        Self {
            store,
            endpoint: endpoint.to_string(),
            bucket: bucket.to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload `local_path` as `key`, returning the bytes sent.
    pub async fn upload_file(
        &self,
        local_path: &Path,
        key: &str,
        progress: &dyn ProgressReporter,
    ) -> UploadResult<u64> {
        info!("Pushing {} to s3://{}/{}...", local_path.display(), self.bucket, key);
        let read_error = |e| UploadError::Read {
            path: local_path.to_path_buf(),
            source: e,
        };

        let mut file = tokio::fs::File::open(local_path).await.map_err(read_error)?;
        let total = file.metadata().await.map_err(read_error)?.len();

        let location = ObjectPath::from(key);
        let upload = self
            .store
            .put_multipart(&location)
            .await
            .map_err(|e| self.classify(e))?;
        let mut writer = WriteMultipart::new(upload);
        let mut tracker = progress.start(key, total);
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let mut sent = 0u64;

        loop {
            let n = match file.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(read_error(e));
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = writer.wait_for_capacity(MAX_CONCURRENT_PARTS).await {
                let _ = writer.abort().await;
                return Err(self.classify(e));
            }
            writer.write(&buf[..n]);
            sent += n as u64;
            tracker.advance(n as u64);
        }

        writer.finish().await.map_err(|e| self.classify(e))?;
        tracker.finish();
        info!(bytes = sent, "Done pushing the PMTiles to S3 storage.");
        Ok(sent)
    }

    /// Check that the endpoint answers and the keys can list the bucket.
    ///
    /// Returns the number of top-level entries.
    pub async fn check(&self) -> UploadResult<usize> {
        let listing = self
            .store
            .list_with_delimiter(None)
            .await
            .map_err(|e| self.classify(e))?;
        let entries = listing.objects.len() + listing.common_prefixes.len();
        debug!(bucket = %self.bucket, entries, "bucket listed");
        Ok(entries)
    }

    fn classify(&self, err: object_store::Error) -> UploadError {
        classify_error(&err, &self.endpoint, &self.bucket)
    }
}

/// Sort a storage error into unreachable, access denied or other.
pub fn classify_error(err: &object_store::Error, endpoint: &str, bucket: &str) -> UploadError {
    let reason = err.to_string();

    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(http) = e.downcast_ref::<reqwest::Error>() {
            if http.is_connect() || http.is_timeout() {
                return UploadError::Unreachable {
                    endpoint: endpoint.to_string(),
                    reason,
                };
            }
            if let Some(status) = http.status() {
                if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED {
                    return UploadError::AccessDenied {
                        bucket: bucket.to_string(),
                        reason,
                    };
                }
            }
        }
        source = e.source();
    }

    if is_access_denied_message(&reason) {
        UploadError::AccessDenied {
            bucket: bucket.to_string(),
            reason,
        }
    } else if is_unreachable_message(&reason) {
        UploadError::Unreachable {
            endpoint: endpoint.to_string(),
            reason,
        }
    } else {
        UploadError::Storage(reason)
    }
}

fn is_access_denied_message(message: &str) -> bool {
    [
        "AccessDenied",
        "InvalidAccessKeyId",
        "SignatureDoesNotMatch",
        "403 Forbidden",
        "401 Unauthorized",
    ]
    .iter()
    .any(|marker| message.contains(marker))
}

fn is_unreachable_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["error sending request", "dns error", "connection refused", "timed out"]
        .iter()
        .any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::ByteCounter;
    use object_store::memory::InMemory;
    use tempfile::TempDir;

    fn generic(message: &str) -> object_store::Error {
        object_store::Error::Generic {
            store: "S3",
            source: message.to_string().into(),
        }
    }

    #[test]
    fn test_credentials_from_dotenv() {
        let creds = Credentials::parse(
            "ACCESS_KEY=abc\nSECRET_KEY=\"s3cr3t\"\n",
            Path::new(".env"),
        )
        .unwrap();
        assert_eq!(creds.access_key, "abc");
        assert_eq!(creds.secret_key, "s3cr3t");
        assert!(!format!("{:?}", creds).contains("s3cr3t"));
    }

    #[test]
    fn test_missing_secret_is_named() {
        let err = Credentials::parse("ACCESS_KEY=abc\n", Path::new(".env")).unwrap_err();
        assert!(matches!(err, UploadError::MissingCredential { key: "SECRET_KEY", .. }));
    }

    #[test]
    fn test_missing_credentials_file() {
        let temp = TempDir::new().unwrap();
        let err = Credentials::load(&temp.path().join(".env")).unwrap_err();
        assert!(matches!(err, UploadError::Credentials { .. }));
    }

    #[test]
    fn test_classify_access_denied() {
        let err = classify_error(&generic("Error performing put request: 403 Forbidden <Code>AccessDenied</Code>"), "e", "b");
        assert!(matches!(err, UploadError::AccessDenied { ref bucket, .. } if bucket == "b"));
    }

    #[test]
    fn test_classify_unreachable() {
        let err = classify_error(&generic("error sending request for url (https://nowhere)"), "https://nowhere", "b");
        assert!(matches!(err, UploadError::Unreachable { ref endpoint, .. } if endpoint == "https://nowhere"));
    }

    #[test]
    fn test_classify_other() {
        let err = classify_error(&generic("something odd"), "e", "b");
        assert!(matches!(err, UploadError::Storage(_)));
    }

    #[test]
    fn test_builder_accepts_config() {
        let storage = StorageConfig::default();
        let creds = Credentials {
            access_key: "a".to_string(),
            secret_key: "b".to_string(),
        };
        let uploader = Uploader::with_credentials(&storage, &creds).unwrap();
        assert_eq!(uploader.bucket(), "eubuccodissemination");
    }

    #[tokio::test]
    async fn test_upload_to_memory_store() {
        let temp = TempDir::new().unwrap();
        let local = temp.path().join("all_countries.pmtiles");
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&local, &body).unwrap();

        let store = Arc::new(InMemory::new());
        let uploader = Uploader::from_store(store.clone(), "memory", "bucket");
        let counter = ByteCounter::default();

        let sent = uploader
            .upload_file(&local, "all_countries.pmtiles", &counter)
            .await
            .unwrap();

        assert_eq!(sent, body.len() as u64);
        let stored = store
            .get(&ObjectPath::from("all_countries.pmtiles"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(stored.as_ref(), body.as_slice());
        assert_eq!(counter.total_bytes(), body.len() as u64);
        assert_eq!(uploader.check().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let temp = TempDir::new().unwrap();
        let uploader = Uploader::from_store(Arc::new(InMemory::new()), "memory", "bucket");
        let err = uploader
            .upload_file(&temp.path().join("nope.pmtiles"), "k", &ByteCounter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Read { .. }));
    }
}
