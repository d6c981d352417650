//! Error types for Forge and Envoyer API calls.
//!
//! Every failure mode is a distinct variant so callers can branch on an
//! explicit tag instead of matching on error text. The most common check is
//! [`Error::is_not_found`], which distinguishes "the resource does not exist"
//! from every other failure.

use http::{Method, StatusCode};

/// The error type shared by both API clients.
///
/// HTTP failures carry the status code, the request method/URL, and the raw
/// response body so the resource layer above can interpret API error
/// envelopes (`{"message": ..., "errors": ...}`) itself.
///
/// # Examples
///
/// ```no_run
/// use forgevoyer::{Error, ForgeClient};
///
/// # async fn example() -> Result<(), Error> {
/// let client = ForgeClient::new("token")?;
///
/// match client.get_json::<serde_json::Value>("/servers/42").await {
///     Ok(server) => println!("found: {server}"),
///     Err(e) if e.is_not_found() => println!("server 42 does not exist"),
///     Err(e) => return Err(e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A connection-level failure before any HTTP response was obtained
    /// (connection refused, DNS failure, timeout, reset mid-stream).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The caller's cancellation token fired while waiting for the network
    /// or sleeping between retry attempts.
    #[error("request cancelled")]
    Cancelled,

    /// The server returned 404 for the requested resource.
    ///
    /// Distinguished from other HTTP errors so callers can test for
    /// "does not exist" without inspecting the body.
    #[error("{method} {url} returned 404: resource not found")]
    NotFound {
        /// The HTTP method of the request.
        method: Method,
        /// The full request URL.
        url: String,
        /// The raw response body.
        body: String,
    },

    /// The server returned a non-2xx status other than 404.
    ///
    /// Rate-limit exhaustion surfaces here with `status` 429.
    #[error("{method} {url} returned {status}: {body}")]
    Http {
        /// The HTTP status code.
        status: StatusCode,
        /// The HTTP method of the request.
        method: Method,
        /// The full request URL.
        url: String,
        /// The raw response body.
        body: String,
        /// The serialized request body, when one was sent.
        request_body: Option<String>,
    },

    /// The request body could not be encoded, or a response body could not
    /// be decoded into the caller's target type (including an empty body
    /// when decoding was requested). Never retried.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid client or request configuration (bad header name, missing
    /// token, and so on).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was produced from the base URL and request path.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns `true` if this is the distinguished not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Returns `true` if the caller's cancellation signal produced this error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns the HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body carried by this error, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            Error::NotFound { body, .. } => Some(body),
            Error::Http { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// A specialized `Result` for API calls.
pub type Result<T> = std::result::Result<T, Error>;
