//! Retry policy: deciding when to retry and how long to back off.
//!
//! The policy is pure decision logic. The client core owns the attempt loop
//! and the sleeps; this module only answers "retry this outcome?" and
//! "wait how long before attempt N?".

use http::{HeaderMap, StatusCode};
use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::Error;

/// Error substrings that indicate a transient network condition.
///
/// Matched case-insensitively against the full source chain of a transport
/// error, so wrapped connector errors (e.g. "tcp connect error: Connection
/// refused") still match.
const TRANSIENT_ERRORS: &[&str] = &[
    "connection refused",
    "no such host",
    "timed out",
    "connection reset",
    "unexpected end of file",
];

/// Configuration for retry behavior.
///
/// Set once at client construction and overridable per request via
/// [`RequestOptions::with_retry`](crate::RequestOptions::with_retry).
///
/// # Examples
///
/// ```
/// use forgevoyer::RetryConfig;
/// use std::time::Duration;
///
/// let retry = RetryConfig::default()
///     .with_max_retries(5)
///     .with_base_delay(Duration::from_millis(250))
///     .with_retryable_status(503);
/// assert!(retry.retryable_statuses.contains(&503));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,

    /// Base delay; attempt `n` waits `base_delay * 1.5^n` before jitter.
    pub base_delay: Duration,

    /// Upper bound on any single backoff delay, including a server-supplied
    /// `Retry-After`.
    pub max_delay: Duration,

    /// HTTP status codes that trigger a retry.
    pub retryable_statuses: HashSet<u16>,

    /// Caller-supplied error signatures (substrings) considered transient,
    /// in addition to the built-in network signatures.
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            retryable_statuses: HashSet::from([429]),
            retryable_errors: Vec::new(),
        }
    }
}

impl RetryConfig {
    /// Disables retries entirely.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Sets the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base backoff delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sets the backoff delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Adds a status code to the retryable set.
    pub fn with_retryable_status(mut self, status: u16) -> Self {
        self.retryable_statuses.insert(status);
        self
    }

    /// Replaces the retryable status set.
    pub fn with_retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Adds a custom retryable error signature (substring match).
    pub fn with_retryable_error(mut self, signature: impl Into<String>) -> Self {
        self.retryable_errors.push(signature.into());
        self
    }

    /// Decides whether an attempt's outcome should be retried.
    ///
    /// `attempt` is 0-indexed: the initial attempt is 0, so retries stop
    /// once `attempt >= max_retries`. Status-based matches win; otherwise
    /// the error's source chain is checked against the transient network
    /// signatures and any custom signatures. Cancellation and serialization
    /// errors are never retried.
    pub fn should_retry(
        &self,
        error: Option<&Error>,
        status: Option<StatusCode>,
        attempt: u32,
    ) -> bool {
        if attempt >= self.max_retries {
            return false;
        }

        if let Some(status) = status {
            if self.retryable_statuses.contains(&status.as_u16()) {
                return true;
            }
        }

        if let Some(error) = error {
            match error {
                Error::Cancelled | Error::Serialization(_) | Error::Configuration(_) => {
                    return false
                }
                Error::Transport(e) if e.is_timeout() || e.is_connect() => return true,
                _ => {}
            }

            let text = source_chain_text(error).to_lowercase();
            return TRANSIENT_ERRORS.iter().any(|sig| text.contains(sig))
                || self
                    .retryable_errors
                    .iter()
                    .any(|sig| text.contains(&sig.to_lowercase()));
        }

        false
    }

    /// Computes the jittered backoff delay before retrying attempt `attempt`.
    ///
    /// Exponential growth from `base_delay` with symmetric jitter of roughly
    /// ±5% of the computed delay, clamped to `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.base_backoff(attempt);

        // ~10% magnitude scaled into a signed range gives ±5% jitter. The
        // subsecond clock reading is enough entropy to break up retry storms
        // without blocking on an external randomness source.
        let range = (delay.as_nanos() / 10).max(1);
        let offset = (clock_nanos() as u128 % range) as i128 - (range / 2) as i128;

        let jittered = delay.as_nanos() as i128 + offset;
        let jittered = Duration::from_nanos(jittered.max(0) as u64);
        jittered.min(self.max_delay)
    }

    /// The unjittered delay before retrying attempt `attempt`:
    /// `base_delay * 1.5^attempt`, clamped to `max_delay`.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let secs = self.base_delay.as_secs_f64() * 1.5_f64.powi(attempt as i32);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Subsecond nanoseconds of the wall clock, used as the jitter source.
fn clock_nanos() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0)
}

/// Flattens an error and its source chain into one searchable string.
fn source_chain_text(error: &Error) -> String {
    let mut text = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = std::error::Error::source(inner);
    }
    text
}

/// Parses a `Retry-After` header into a wait duration.
///
/// Supports both delay-seconds and HTTP-date formats; returns `None` when
/// the header is absent or unparseable, in which case the computed backoff
/// applies instead.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?;

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = httpdate::parse_http_date(value) {
        if let Ok(until) = date.duration_since(SystemTime::now()) {
            return Some(until);
        }
    }

    None
}
