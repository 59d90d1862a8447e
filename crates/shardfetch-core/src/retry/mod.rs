//! Retry policy for shard downloads.
//!
//! Classifies per-attempt failures (timeouts, throttling, connection
//! failures, client errors) and drives a fixed-delay retry loop as an
//! explicit state machine, so the downloader only deals with single attempts.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::FetchError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, run_with_retry_and_sleep, RetryFailure, RetryPhase, RetryState};
