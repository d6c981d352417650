//! Laravel Forge client: the engine with Forge's defaults.
//!
//! Forge rate-limits aggressively, so the default policy retries only 429
//! with a generous attempt budget and a long base delay.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    cache::{CacheConfig, CacheStore},
    client::{Client, ClientBuilder},
    retry::RetryConfig,
    Result,
};

/// The default Forge API base URL.
pub const DEFAULT_BASE_URL: &str = "https://forge.laravel.com/api/v1";

/// Forge's default retry policy: 429 only, six retries, 10s base delay.
pub fn retry_defaults() -> RetryConfig {
    RetryConfig::default()
        .with_max_retries(6)
        .with_base_delay(Duration::from_secs(10))
        .with_retryable_statuses([429])
}

/// A client for the Laravel Forge API.
///
/// Dereferences to [`Client`], so the full engine surface (`get`, `post`,
/// per-call options, cache management) is available directly.
///
/// # Examples
///
/// ```no_run
/// use forgevoyer::ForgeClient;
///
/// #[derive(serde::Deserialize)]
/// struct ServerList { servers: Vec<serde_json::Value> }
///
/// # async fn example() -> Result<(), forgevoyer::Error> {
/// let forge = ForgeClient::new("forge-api-token")?;
/// let list: ServerList = forge.get_json("/servers").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ForgeClient {
    client: Client,
}

impl ForgeClient {
    /// Creates a Forge client with the default base URL, retry policy, and
    /// caching disabled.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::builder(token).build()
    }

    /// Creates a builder seeded with Forge's defaults.
    pub fn builder(token: impl Into<String>) -> ForgeClientBuilder {
        ForgeClientBuilder {
            inner: Client::builder()
                .token(token)
                .base_url(DEFAULT_BASE_URL)
                .expect("default Forge base URL is valid")
                .retry(retry_defaults()),
        }
    }

    /// The underlying engine client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Deref for ForgeClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// Builder for [`ForgeClient`].
pub struct ForgeClientBuilder {
    inner: ClientBuilder,
}

impl ForgeClientBuilder {
    /// Overrides the API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.inner = self.inner.base_url(url)?;
        Ok(self)
    }

    /// Overrides the retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.inner = self.inner.retry(retry);
        self
    }

    /// Sets the caching configuration.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.inner = self.inner.cache(config);
        self
    }

    /// Supplies a custom cache store and enables caching.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.inner = self.inner.cache_store(store);
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.timeout(timeout);
        self
    }

    /// Adds a header sent on every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self> {
        self.inner = self.inner.default_header(name, value)?;
        Ok(self)
    }

    /// Builds the [`ForgeClient`].
    pub fn build(self) -> Result<ForgeClient> {
        Ok(ForgeClient {
            client: self.inner.build()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let forge = ForgeClient::new("token").unwrap();
        assert_eq!(forge.base_url(), DEFAULT_BASE_URL);

        let retry = retry_defaults();
        assert_eq!(retry.max_retries, 6);
        assert_eq!(retry.base_delay, Duration::from_secs(10));
        assert!(retry.retryable_statuses.contains(&429));
        assert!(!retry.retryable_statuses.contains(&503));
    }
}
