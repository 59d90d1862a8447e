//! SHA-256 verification of downloaded files.
//!
//! Digests are computed on demand after the download, never inline with the
//! transfer. The expected value is either given literally or fetched from a
//! reference URL (plain digest or git-lfs pointer file).

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str;
use std::time::Duration;
use thiserror::Error;

const BUF_SIZE: usize = 64 * 1024;
/// Reference bodies are tiny; anything larger is not a digest file.
const MAX_REFERENCE_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to fetch reference checksum from {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("reference checksum from {origin} is not a SHA-256 hex digest: {value:?}")]
    BadReference { origin: String, value: String },
}

/// Where the expected digest comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumSource {
    /// Hex digest given directly.
    Digest(String),
    /// URL whose body contains the digest.
    Url(String),
}

impl ChecksumSource {
    /// `http://` and `https://` values are URLs, anything else is a literal digest.
    pub fn parse(value: &str) -> ChecksumSource {
        let value = value.trim();
        let lower = value.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ChecksumSource::Url(value.to_string())
        } else {
            ChecksumSource::Digest(value.to_string())
        }
    }
}

/// Outcome of one verification. A mismatch is a result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumResult {
    pub computed: String,
    pub expected: String,
    pub matched: bool,
}

/// Compute SHA-256 of in-memory bytes as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute SHA-256 of a file and return the digest as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for multi-gigabyte shards.
pub fn sha256_path(path: &Path) -> Result<String, ChecksumError> {
    let mut f = File::open(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ChecksumError::FileNotFound(path.to_path_buf())
        } else {
            ChecksumError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f.read(&mut buf).map_err(|source| ChecksumError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Extract the digest from a reference body.
///
/// A git-lfs pointer (`oid sha256:<hex>` line) wins; otherwise the first
/// whitespace-delimited token (the `sha256sum` output format).
pub fn parse_reference(body: &str) -> Option<String> {
    let from_pointer = body
        .lines()
        .find_map(|line| line.trim().strip_prefix("oid sha256:"))
        .map(|hex| hex.trim().to_string());
    from_pointer.or_else(|| body.split_whitespace().next().map(str::to_string))
}

/// Turn a `.../resolve/...` download URL into the `.../raw/...` URL of its
/// git-lfs pointer file, dropping the query string.
pub fn raw_pointer_url(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or(url);
    without_query.replacen("/resolve/", "/raw/", 1)
}

/// GET `url` and return the digest it holds.
pub fn fetch_reference(url: &str, timeout: Duration) -> Result<String, ChecksumError> {
    let fetch_err = |reason: String| ChecksumError::Fetch {
        url: url.to_string(),
        reason,
    };

    let mut body: Vec<u8> = Vec::new();
    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(|e| fetch_err(e.to_string()))?;
    easy.follow_location(true)
        .map_err(|e| fetch_err(e.to_string()))?;
    easy.timeout(timeout).map_err(|e| fetch_err(e.to_string()))?;
    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                if body.len() + data.len() > MAX_REFERENCE_BYTES {
                    return Ok(0);
                }
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(|e| fetch_err(e.to_string()))?;
        transfer.perform().map_err(|e| {
            if e.is_write_error() {
                fetch_err(format!("reference body larger than {} bytes", MAX_REFERENCE_BYTES))
            } else {
                fetch_err(e.to_string())
            }
        })?;
    }

    let code = easy.response_code().map_err(|e| fetch_err(e.to_string()))?;
    if !(200..300).contains(&code) {
        return Err(fetch_err(format!("HTTP {}", code)));
    }

    let text = String::from_utf8_lossy(&body);
    parse_reference(&text).ok_or_else(|| ChecksumError::BadReference {
        origin: url.to_string(),
        value: text.trim().to_string(),
    })
}

/// Resolve `source` to a validated lowercase hex digest.
pub fn resolve_expected(source: &ChecksumSource, timeout: Duration) -> Result<String, ChecksumError> {
    let (origin, value) = match source {
        ChecksumSource::Digest(d) => ("argument".to_string(), d.trim().to_string()),
        ChecksumSource::Url(url) => {
            tracing::info!("requesting reference checksum from {}", url);
            (url.clone(), fetch_reference(url, timeout)?)
        }
    };
    if !is_sha256_hex(&value) {
        return Err(ChecksumError::BadReference { origin, value });
    }
    Ok(value.to_ascii_lowercase())
}

/// Hash `path` and compare against an already-known digest (case-insensitive).
pub fn compare(path: &Path, expected: &str) -> Result<ChecksumResult, ChecksumError> {
    tracing::info!("calculating SHA-256 of {}", path.display());
    let computed = sha256_path(path)?;
    let matched = computed.eq_ignore_ascii_case(expected.trim());
    let result = ChecksumResult {
        computed,
        expected: expected.trim().to_ascii_lowercase(),
        matched,
    };
    if result.matched {
        tracing::info!(
            "checksum match for {} (computed {}, expected {})",
            path.display(),
            result.computed,
            result.expected
        );
    } else {
        tracing::warn!(
            "checksum mismatch for {} (computed {}, expected {})",
            path.display(),
            result.computed,
            result.expected
        );
    }
    Ok(result)
}

/// Verify `path` against the digest named by `source`.
pub fn verify(
    path: &Path,
    source: &ChecksumSource,
    timeout: Duration,
) -> Result<ChecksumResult, ChecksumError> {
    if !path.exists() {
        let err = ChecksumError::FileNotFound(path.to_path_buf());
        tracing::error!("checksum verification failed: {}", err);
        return Err(err);
    }
    let result = resolve_expected(source, timeout).and_then(|expected| compare(path, &expected));
    if let Err(e) = &result {
        tracing::error!("checksum verification of {} failed: {}", path.display(), e);
    }
    result
}
