//! HTTP transport
//!
//! Thin abstraction over the blocking HTTP client so every network access of
//! the crate goes through one seam: plain text fetches for API and page
//! requests, and streamed file downloads with progress reporting.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

const USER_AGENT: &str = concat!("episode-courier/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while talking to upstream servers
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The request could not be sent or the body could not be read
    #[error("Request to {url} failed: {source}")]
    RequestFailed { url: String, source: reqwest::Error },

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Failed to read the response stream of a download
    #[error("Failed to read download stream from {url}: {source}")]
    StreamFailed { url: String, source: std::io::Error },

    /// Failed to write the downloaded file
    #[error("Failed to write download to {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Snapshot of an ongoing transfer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    /// Bytes received so far
    pub transferred: u64,
    /// Announced size of the payload, if the server sent one
    pub total: Option<u64>,
    /// Average speed since the transfer started
    pub bytes_per_second: f64,
    /// Estimated time until completion
    pub eta: Option<Duration>,
}

impl TransferProgress {
    /// Computes speed and remaining time from the elapsed transfer time
    pub fn measure(transferred: u64, total: Option<u64>, elapsed: Duration) -> Self {
        let seconds = elapsed.as_secs_f64();
        let bytes_per_second = if seconds > 0.0 {
            transferred as f64 / seconds
        } else {
            0.0
        };

        let eta = match total {
            Some(total) if bytes_per_second > 0.0 => {
                let remaining = total.saturating_sub(transferred) as f64;
                // Out of range for a stalled transfer with a huge total
                Duration::try_from_secs_f64(remaining / bytes_per_second).ok()
            }
            _ => None,
        };

        Self {
            transferred,
            total,
            bytes_per_second,
            eta,
        }
    }
}

/// Network access used by metadata sources, video providers and the pipeline
pub trait Transport {
    /// Fetches `url` and returns the body as text
    fn get_text(&self, url: &str) -> Result<String, TransportError>;

    /// Streams `url` into `target`, truncating it first
    ///
    /// Returns the number of bytes written.
    fn download(
        &self,
        url: &str,
        target: &Path,
        on_progress: &mut dyn FnMut(TransferProgress),
    ) -> Result<u64, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get_text(&self, url: &str) -> Result<String, TransportError> {
        (**self).get_text(url)
    }

    fn download(
        &self,
        url: &str,
        target: &Path,
        on_progress: &mut dyn FnMut(TransferProgress),
    ) -> Result<u64, TransportError> {
        (**self).download(url, target, on_progress)
    }
}

/// [`Transport`] backed by a blocking reqwest client
///
/// Redirects are followed. No request timeout is applied, a stalled server
/// blocks the run.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(None::<Duration>)
            .build()
            .map_err(TransportError::ClientBuild)?;

        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, TransportError> {
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| TransportError::RequestFailed {
                url: url.to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(TransportError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &str) -> Result<String, TransportError> {
        self.get(url)?
            .text()
            .map_err(|e| TransportError::RequestFailed {
                url: url.to_string(),
                source: e,
            })
    }

    fn download(
        &self,
        url: &str,
        target: &Path,
        on_progress: &mut dyn FnMut(TransferProgress),
    ) -> Result<u64, TransportError> {
        let mut response = self.get(url)?;
        let total_size = response.content_length();

        let mut file = fs::File::create(target).map_err(|e| TransportError::WriteFailed {
            path: target.to_path_buf(),
            source: e,
        })?;

        let started = Instant::now();
        let mut downloaded: u64 = 0;
        let mut buffer = [0; 8192]; // 8KB buffer

        on_progress(TransferProgress::measure(0, total_size, Duration::ZERO));

        loop {
            let bytes_read = response
                .read(&mut buffer)
                .map_err(|e| TransportError::StreamFailed {
                    url: url.to_string(),
                    source: e,
                })?;

            if bytes_read == 0 {
                break; // EOF
            }

            file.write_all(&buffer[..bytes_read])
                .map_err(|e| TransportError::WriteFailed {
                    path: target.to_path_buf(),
                    source: e,
                })?;

            downloaded += bytes_read as u64;
            on_progress(TransferProgress::measure(
                downloaded,
                total_size,
                started.elapsed(),
            ));
        }

        file.sync_all().map_err(|e| TransportError::WriteFailed {
            path: target.to_path_buf(),
            source: e,
        })?;

        Ok(downloaded)
    }
}
