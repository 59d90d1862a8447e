//! Retry loop: run an attempt until success or the policy says stop.
//!
//! The loop is an explicit state machine:
//! `Idle -> Attempting(1) -> Waiting(1) -> Attempting(2) -> ... -> Succeeded(n) | Failed(n)`.

use std::fmt;
use std::time::Duration;

use super::classify;
use super::error::FetchError;
use super::policy::{ErrorKind, RetryDecision, RetryPolicy};

/// Phase of a retry loop. The payload is the 1-based attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Idle,
    Attempting(u32),
    Waiting(u32),
    Succeeded(u32),
    Failed(u32),
}

/// Mutable state of one retry loop: current phase and the last attempt error.
#[derive(Debug)]
pub struct RetryState {
    phase: RetryPhase,
    last_error: Option<FetchError>,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            phase: RetryPhase::Idle,
            last_error: None,
        }
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    /// Number of attempts started so far.
    pub fn attempts(&self) -> u32 {
        match self.phase {
            RetryPhase::Idle => 0,
            RetryPhase::Attempting(n)
            | RetryPhase::Waiting(n)
            | RetryPhase::Succeeded(n)
            | RetryPhase::Failed(n) => n,
        }
    }

    /// `Idle | Waiting(n) -> Attempting(n + 1)`. Returns the new attempt number.
    ///
    /// # Panics
    /// If called from a terminal phase or while an attempt is already running.
    pub fn begin_attempt(&mut self) -> u32 {
        let next = match self.phase {
            RetryPhase::Idle => 1,
            RetryPhase::Waiting(n) => n + 1,
            other => panic!("begin_attempt called in phase {:?}", other),
        };
        self.phase = RetryPhase::Attempting(next);
        next
    }

    /// `Attempting(n) -> Waiting(n)`, remembering the error that caused the wait.
    pub fn wait(&mut self, error: FetchError) {
        self.phase = RetryPhase::Waiting(self.expect_attempting("wait"));
        self.last_error = Some(error);
    }

    /// `Attempting(n) -> Succeeded(n)`.
    pub fn succeed(&mut self) {
        self.phase = RetryPhase::Succeeded(self.expect_attempting("succeed"));
    }

    /// `Attempting(n) -> Failed(n)`. The final error is handed to the caller, not kept.
    pub fn fail(&mut self) {
        self.phase = RetryPhase::Failed(self.expect_attempting("fail"));
    }

    fn expect_attempting(&self, transition: &str) -> u32 {
        match self.phase {
            RetryPhase::Attempting(n) => n,
            other => panic!("{} called in phase {:?}", transition, other),
        }
    }
}

/// Terminal failure of a retry loop: the final error, its classification and
/// how many attempts were made.
#[derive(Debug)]
pub struct RetryFailure {
    pub attempts: u32,
    pub kind: ErrorKind,
    pub error: FetchError,
}

impl fmt::Display for RetryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} attempt(s))", self.error, self.attempts)
    }
}

impl std::error::Error for RetryFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Runs `f` until it succeeds or the retry policy says to stop, sleeping the
/// calling thread between attempts. Returns the value and the attempt count.
pub fn run_with_retry<T, F>(policy: &RetryPolicy, f: F) -> Result<(T, u32), RetryFailure>
where
    F: FnMut(u32) -> Result<T, FetchError>,
{
    run_with_retry_and_sleep(policy, std::thread::sleep, f)
}

/// Like `run_with_retry` but with a caller-provided sleep, so waits can be
/// observed or skipped.
pub fn run_with_retry_and_sleep<T, F, S>(
    policy: &RetryPolicy,
    mut sleep: S,
    mut f: F,
) -> Result<(T, u32), RetryFailure>
where
    F: FnMut(u32) -> Result<T, FetchError>,
    S: FnMut(Duration),
{
    let mut state = RetryState::new();
    loop {
        let attempt = state.begin_attempt();
        match f(attempt) {
            Ok(value) => {
                state.succeed();
                return Ok((value, attempt));
            }
            Err(e) => {
                let kind = classify::classify(&e);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts(),
                    ?kind,
                    "attempt failed: {}",
                    e
                );
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => {
                        state.fail();
                        return Err(RetryFailure {
                            attempts: state.attempts(),
                            kind,
                            error: e,
                        });
                    }
                    RetryDecision::RetryAfter(d) => {
                        state.wait(e);
                        tracing::warn!("retrying in {:.1}s", d.as_secs_f64());
                        sleep(d);
                    }
                }
            }
        }
    }
}
