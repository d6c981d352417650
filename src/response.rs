//! Raw HTTP response wrapper with lazy decoding.
//!
//! [`ApiResponse`] carries the status, headers, and the fully-read body of
//! the final attempt of a call. Decoding is opt-in: the body stays raw until
//! the caller asks for JSON, text, or bytes.

use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::borrow::Cow;

use crate::{Error, Result};

/// A raw API response: status code, headers, and the complete body.
///
/// Both clients are resource-agnostic and only guarantee raw-body delivery;
/// use [`ApiResponse::json`] to decode into a caller-provided shape.
///
/// # Examples
///
/// ```no_run
/// use forgevoyer::ForgeClient;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct ServerEnvelope {
///     server: serde_json::Value,
/// }
///
/// # async fn example() -> Result<(), forgevoyer::Error> {
/// let client = ForgeClient::new("token")?;
///
/// let response = client.get("/servers/42").await?;
/// assert!(response.is_success());
/// let envelope: ServerEnvelope = response.json()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// The HTTP status code.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The raw response body, read eagerly and in full.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Creates a response from its parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns `true` if the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decodes the body as JSON into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the body is empty or is not valid
    /// JSON for the target type.
    pub fn json<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        if self.body.is_empty() {
            return Err(Error::Serialization(
                "cannot decode empty response body".to_string(),
            ));
        }
        serde_json::from_slice(&self.body).map_err(|e| {
            Error::Serialization(format!(
                "failed to decode response body (status {}): {}",
                self.status, e
            ))
        })
    }

    /// Returns the body as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Returns the raw body bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}
