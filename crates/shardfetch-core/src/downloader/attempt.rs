//! One download attempt: a single GET streamed into a freshly truncated destination file.

use std::cell::RefCell;
use std::fs::File;
use std::str;
use std::time::Duration;

use super::response::ResponseHead;
use super::sink::ChunkSink;
use super::DownloadRequest;
use crate::retry::FetchError;

/// An attempt is abandoned when throughput stays below this many bytes/s for
/// the whole request timeout.
const LOW_SPEED_LIMIT: u32 = 1024;

/// libcurl clamps its receive buffer to this range.
const CURL_MIN_BUFFER: usize = 1024;
const CURL_MAX_BUFFER: usize = 512 * 1024;

/// `timeout` rounded up to whole seconds, at least one.
fn low_speed_window(timeout: Duration) -> Duration {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    Duration::from_secs(secs.max(1))
}

/// Downloads `request.url` into `request.destination` from offset zero.
/// Returns the number of body bytes written.
///
/// Error response bodies are discarded, so a failed attempt leaves an empty file.
pub(super) fn fetch_once(request: &DownloadRequest) -> Result<u64, FetchError> {
    let file = File::create(&request.destination).map_err(FetchError::Storage)?;
    let sink = RefCell::new(ChunkSink::new(
        file,
        request.chunk_size,
        request.destination.clone(),
    ));
    let head = RefCell::new(ResponseHead::default());
    let storage_error: RefCell<Option<std::io::Error>> = RefCell::new(None);

    let mut easy = curl::easy::Easy::new();
    easy.url(&request.url).map_err(FetchError::Curl)?;
    easy.follow_location(true).map_err(FetchError::Curl)?;
    easy.max_redirections(10).map_err(FetchError::Curl)?;
    easy.connect_timeout(request.timeout)
        .map_err(FetchError::Curl)?;
    // No wall-clock limit: a large shard may take far longer than `timeout`
    // as long as data keeps arriving. libcurl counts low-speed time in whole seconds.
    easy.low_speed_limit(LOW_SPEED_LIMIT)
        .map_err(FetchError::Curl)?;
    easy.low_speed_time(low_speed_window(request.timeout))
        .map_err(FetchError::Curl)?;
    easy.buffer_size(request.chunk_size.clamp(CURL_MIN_BUFFER, CURL_MAX_BUFFER))
        .map_err(FetchError::Curl)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(line) = str::from_utf8(data) {
                    head.borrow_mut().observe(line);
                }
                true
            })
            .map_err(FetchError::Curl)?;
        transfer
            .write_function(|data| {
                let head = head.borrow();
                if !head.is_success() {
                    return Ok(data.len());
                }
                let mut sink = sink.borrow_mut();
                sink.expect_total(head.content_length);
                match sink.write(data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        tracing::warn!(
                            "write to {} failed: {}",
                            request.destination.display(),
                            e
                        );
                        storage_error.replace(Some(e));
                        Ok(0) // abort transfer
                    }
                }
            })
            .map_err(FetchError::Curl)?;
        if let Err(e) = transfer.perform() {
            if e.is_write_error() {
                if let Some(io_err) = storage_error.take() {
                    return Err(FetchError::Storage(io_err));
                }
            }
            return Err(FetchError::Curl(e));
        }
    }

    let code = easy.response_code().map_err(FetchError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(FetchError::Http(code));
    }

    sink.into_inner().finish().map_err(FetchError::Storage)
}
