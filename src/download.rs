//! Model artifact downloading
//!
//! Fetches the single ONNX file behind a [`ModelDescriptor`] into the model
//! cache. The body is streamed into a temporary file inside the cache home and
//! hashed while it is written, then persisted to `{cache_home}/{name}.onnx`
//! with an atomic rename. A failed or rejected download never leaves a file at
//! the final path.

use crate::cache::ModelCache;
use crate::error::{RemovalError, Result};
use crate::models::ModelDescriptor;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

const DOWNLOAD_BUFFER_SIZE: usize = 8192;

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
    show_progress: bool,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

impl ModelDownloader {
    /// Create a downloader writing into an existing cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            cache,
            show_progress: false,
        })
    }

    /// Show a progress bar while downloading (only rendered with the `cli` feature)
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Ensure the artifact of `descriptor` is in the cache and return its path
    ///
    /// An existing artifact is returned without network access. When checksum
    /// verification is enabled and a digest is known, an existing artifact that
    /// fails verification is fetched again.
    ///
    /// # Errors
    /// - Network errors or a non-success HTTP status
    /// - Downloaded content does not match the expected digest
    /// - File system errors in the cache home
    pub async fn download_model(&self, descriptor: &ModelDescriptor) -> Result<PathBuf> {
        let final_path = self.cache.model_path(descriptor);

        if self.cache.is_model_cached(descriptor) {
            match descriptor.expected_digest() {
                None => {
                    log::debug!(
                        "Model '{}' already cached at {}",
                        descriptor.name(),
                        final_path.display()
                    );
                    return Ok(final_path);
                },
                Some(expected) => {
                    if Self::verify_file_integrity(&final_path, Some(expected))? {
                        log::debug!("Model '{}' already cached and verified", descriptor.name());
                        return Ok(final_path);
                    }
                    log::warn!(
                        "Cached model '{}' failed checksum verification, downloading again",
                        descriptor.name()
                    );
                },
            }
        }

        log::info!(
            "Downloading model '{}' from {}",
            descriptor.name(),
            descriptor.url()
        );

        let progress = if self.show_progress {
            Some(Self::create_progress_indicator())
        } else {
            None
        };

        match self
            .download_file(descriptor, &final_path, progress.as_ref())
            .await
        {
            Ok(()) => {
                if let Some(pb) = progress {
                    pb.finish_with_message(format!("✅ Downloaded {}", descriptor.name()));
                }
                log::info!(
                    "Model '{}' stored at {}",
                    descriptor.name(),
                    final_path.display()
                );
                Ok(final_path)
            },
            Err(e) => {
                if let Some(pb) = progress {
                    pb.finish_with_message("❌ Download failed".to_string());
                }
                Err(e)
            },
        }
    }

    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    /// Stream one artifact into a temporary file and persist it to `final_path`
    async fn download_file(
        &self,
        descriptor: &ModelDescriptor,
        final_path: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        let url = descriptor.url();
        let cache_dir = self.cache.dir();

        // Removed on drop unless persisted
        let temp_file = tempfile::Builder::new()
            .prefix(&format!(".{}-", descriptor.name()))
            .suffix(".part")
            .tempfile_in(cache_dir)
            .map_err(|e| RemovalError::file_io_error("create temporary file in", cache_dir, &e))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RemovalError::network_error(format!("Failed to download {url}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemovalError::network_error(
                format!("Failed to download {url}"),
                format!("HTTP status {status}"),
            ));
        }

        let total_size = response.content_length();
        if let (Some(pb), Some(total)) = (progress, total_size) {
            pb.set_length(total);
        }
        if let Some(pb) = progress {
            pb.set_message(format!("Downloading {}", descriptor.name()));
        }

        let mut file = tokio::fs::File::from_std(temp_file.reopen().map_err(|e| {
            RemovalError::file_io_error("open temporary file", temp_file.path(), &e)
        })?);

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; DOWNLOAD_BUFFER_SIZE];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| RemovalError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| RemovalError::file_io_error("write to", temp_file.path(), &e))?;

            downloaded += bytes_read as u64;
            if let Some(pb) = progress {
                pb.set_position(downloaded);
            }
        }

        file.flush()
            .await
            .map_err(|e| RemovalError::file_io_error("flush", temp_file.path(), &e))?;
        drop(file);

        if let Some(total) = total_size {
            if downloaded != total {
                return Err(RemovalError::network_error(
                    format!("Incomplete download of {url}"),
                    format!("received {downloaded} of {total} bytes"),
                ));
            }
        }

        let actual = format!("{:x}", hasher.finalize());
        if let Some(expected) = descriptor.expected_digest() {
            if actual != expected {
                log::warn!(
                    "Checksum mismatch for {}: expected {}, got {}",
                    descriptor.file_name(),
                    expected,
                    actual
                );
                return Err(RemovalError::ChecksumMismatch {
                    file: descriptor.file_name(),
                    expected: expected.to_string(),
                    actual,
                });
            }
            log::debug!("Checksum verified for {}", descriptor.file_name());
        }

        temp_file
            .persist(final_path)
            .map_err(|e| RemovalError::file_io_error("move downloaded model to", final_path, &e.error))?;

        log::debug!(
            "Downloaded {} bytes to {} (sha256 {})",
            downloaded,
            final_path.display(),
            actual
        );
        Ok(())
    }

    /// Verify the integrity of a file using SHA-256
    ///
    /// Returns `true` when no digest is supplied.
    ///
    /// # Errors
    /// - Failed to read the file
    pub fn verify_file_integrity(file_path: &Path, expected_hash: Option<&str>) -> Result<bool> {
        let Some(expected) = expected_hash else {
            return Ok(true);
        };

        let actual = sha256_file(file_path)?;
        if actual.eq_ignore_ascii_case(expected) {
            Ok(true)
        } else {
            log::warn!(
                "File integrity check failed for {}: expected {}, got {}",
                file_path.display(),
                expected,
                actual
            );
            Ok(false)
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

/// Lowercase hex SHA-256 digest of a file
///
/// # Errors
/// - Failed to open or read the file
pub fn sha256_file(file_path: &Path) -> Result<String> {
    let mut file = fs::File::open(file_path)
        .map_err(|e| RemovalError::file_io_error("read file for verification", file_path, &e))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 64 * 1024];
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| RemovalError::file_io_error("read file for verification", file_path, &e))?;
        if n == 0 {
            break;
        }
        hasher.update(buffer.get(..n).unwrap_or(&[]));
    }

    Ok(format!("{:x}", hasher.finalize()))
}
