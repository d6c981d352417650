//! Per-call request options.
//!
//! [`RequestOptions`] is an explicit configuration struct constructed fresh
//! for each call. The client merges its own defaults with these overrides;
//! anything set here always wins.

use http::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{retry::RetryConfig, Error, Result};

/// Desired shape of the response body, driving the `Accept` header and the
/// cache key tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// `Accept: application/json`.
    #[default]
    Json,
    /// `Accept: text/plain`.
    Text,
    /// `Accept: */*`.
    Raw,
}

impl ResponseFormat {
    /// The `Accept` header value for this format.
    pub fn accept(&self) -> &'static str {
        match self {
            ResponseFormat::Json => "application/json",
            ResponseFormat::Text => "text/plain",
            ResponseFormat::Raw => "*/*",
        }
    }

    /// The tag used in cache keys.
    pub(crate) fn tag(&self) -> &'static str {
        match self {
            ResponseFormat::Json => "json",
            ResponseFormat::Text => "text",
            ResponseFormat::Raw => "raw",
        }
    }
}

/// Options for a single request, merged over the client defaults.
///
/// # Examples
///
/// ```no_run
/// use forgevoyer::{ForgeClient, RequestOptions};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), forgevoyer::Error> {
/// let client = ForgeClient::new("token")?;
///
/// // Bypass the cache for this one read, but still refresh it.
/// let opts = RequestOptions::new()
///     .force_refresh()
///     .with_cache_ttl(Duration::from_secs(30));
/// let response = client.get_with("/servers", opts).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Desired response format.
    pub format: ResponseFormat,

    /// Extra headers, overriding the standard ones on name collision.
    pub headers: HeaderMap,

    /// Retry configuration override for this call.
    pub retry: Option<RetryConfig>,

    /// Caching override for this call.
    pub cache_enabled: Option<bool>,

    /// TTL override for entries written by this call.
    pub cache_ttl: Option<Duration>,

    /// Error-caching override for this call.
    pub cache_error_responses: Option<bool>,

    /// Skip the cache read (a successful response is still written back).
    pub force_refresh: bool,

    /// Log request/response metadata at debug level for this call.
    pub debug: bool,

    /// Cancellation signal honored during network waits and backoff sleeps.
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    /// Creates options with no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the desired response format.
    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    /// Adds an extra header for this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Overrides the retry configuration for this call.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Enables or disables caching for this call.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = Some(enabled);
        self
    }

    /// Overrides the cache TTL for this call.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Overrides error-response caching for this call.
    pub fn with_cache_error_responses(mut self, enabled: bool) -> Self {
        self.cache_error_responses = Some(enabled);
        self
    }

    /// Bypasses the cache read for this call while still permitting the
    /// cache write.
    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    /// Enables debug logging of request/response metadata for this call.
    pub fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Attaches a cancellation token to this call.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}
