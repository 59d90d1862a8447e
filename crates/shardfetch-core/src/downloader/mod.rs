//! Shard downloader: streaming HTTP GET with fixed-delay retry.
//!
//! Each attempt re-downloads from offset zero into a truncated destination;
//! there is no byte-range resume. Transient failures (timeouts, connection
//! errors, 5xx, 429) are retried up to `max_retries` times, permanent ones
//! (bad URL, other 4xx, local write errors) fail immediately.

mod attempt;
mod response;
mod sink;

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::Settings;
use crate::retry::{self, FetchError, RetryPolicy};

/// Everything needed to fetch one shard. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
    /// Maximum bytes per write to the destination file.
    pub chunk_size: usize,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Per-attempt connect timeout, and how long a transfer may stall below
    /// 1 KiB/s before the attempt is abandoned. A steadily progressing transfer
    /// has no time limit, and there is no overall deadline across attempts.
    pub timeout: Duration,
}

impl DownloadRequest {
    /// Request with the built-in defaults for everything but URL and destination.
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs_f64(crate::config::DEFAULT_RETRY_DELAY_SECS),
            timeout: Duration::from_secs_f64(crate::config::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn from_settings(
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
        settings: &Settings,
    ) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            chunk_size: settings.chunk_size,
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay,
            timeout: settings.timeout,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }

    /// Reject bad parameters and malformed URLs before any network activity.
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.chunk_size == 0 {
            return Err(DownloadError::InvalidRequest(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(DownloadError::InvalidRequest(
                "timeout must be greater than zero".into(),
            ));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(DownloadError::InvalidRequest(
                "destination path is empty".into(),
            ));
        }
        let invalid = |reason: String| DownloadError::InvalidUrl {
            url: self.url.clone(),
            reason,
        };
        let parsed = url::Url::parse(&self.url).map_err(|e| invalid(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme {:?}", other))),
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host".into()));
        }
        Ok(())
    }
}

/// Successful download summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    pub bytes: u64,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid download request: {0}")]
    InvalidRequest(String),
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// Not retried: client error or request curl refuses outright.
    #[error("request for {url} failed permanently on attempt {attempts}: {source}")]
    Permanent {
        url: String,
        attempts: u32,
        #[source]
        source: FetchError,
    },
    /// Transient failures persisted through every allowed attempt.
    #[error("download of {url} failed after {attempts} attempts: {source}")]
    DownloadFailure {
        url: String,
        attempts: u32,
        #[source]
        source: FetchError,
    },
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Attempts made before giving up (0 when rejected up front).
    pub fn attempts(&self) -> u32 {
        match self {
            DownloadError::Permanent { attempts, .. }
            | DownloadError::DownloadFailure { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    fn from_failure(failure: retry::RetryFailure, request: &DownloadRequest) -> Self {
        let url = request.url.clone();
        let attempts = failure.attempts;
        match failure.error {
            FetchError::Storage(source) => DownloadError::Filesystem {
                path: request.destination.clone(),
                source,
            },
            source if failure.kind.is_transient() => DownloadError::DownloadFailure {
                url,
                attempts,
                source,
            },
            source => DownloadError::Permanent {
                url,
                attempts,
                source,
            },
        }
    }
}

/// Download `request.url` to `request.destination`, retrying transient failures.
///
/// The destination's parent directory must already exist.
pub fn download(request: &DownloadRequest) -> Result<DownloadReport, DownloadError> {
    if let Err(e) = request.validate() {
        tracing::error!("download rejected: {}", e);
        return Err(e);
    }

    let policy = request.retry_policy();
    tracing::info!(
        "download started: {} -> {} (chunk_size {}, max_retries {}, retry_delay {:.1}s, timeout {:.1}s)",
        request.url,
        request.destination.display(),
        request.chunk_size,
        request.max_retries,
        request.retry_delay.as_secs_f64(),
        request.timeout.as_secs_f64()
    );

    let result = retry::run_with_retry(&policy, |attempt| {
        tracing::info!(
            "attempt {}/{}: GET {}",
            attempt,
            policy.max_attempts(),
            request.url
        );
        attempt::fetch_once(request)
    });

    match result {
        Ok((bytes, attempts)) => {
            tracing::info!(
                "download complete: {} ({} bytes, {} attempt(s))",
                request.destination.display(),
                bytes,
                attempts
            );
            Ok(DownloadReport { bytes, attempts })
        }
        Err(failure) => {
            let err = DownloadError::from_failure(failure, request);
            tracing::error!("download terminated: {}", err);
            Err(err)
        }
    }
}

/// Remove a leftover destination file after a failed download. Missing files are fine.
pub fn discard_partial(destination: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(destination) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
