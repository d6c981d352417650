//! Envoyer client: the engine with Envoyer's defaults.
//!
//! Envoyer deployments tolerate brief upstream hiccups, so the default
//! policy retries the common transient statuses with short exponential
//! backoff. The client also carries the optional environment encryption
//! key used by environment read/write endpoints.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    cache::{CacheConfig, CacheStore},
    client::{Client, ClientBuilder},
    retry::RetryConfig,
    Result,
};

/// The default Envoyer API base URL.
pub const DEFAULT_BASE_URL: &str = "https://envoyer.io/api";

/// Envoyer's default retry policy: transient statuses with short backoff.
pub fn retry_defaults() -> RetryConfig {
    RetryConfig::default()
        .with_max_retries(3)
        .with_base_delay(Duration::from_millis(500))
        .with_retryable_statuses([408, 429, 500, 502, 503, 504])
}

/// A client for the Envoyer API.
///
/// Dereferences to [`Client`], so the full engine surface is available
/// directly.
///
/// # Examples
///
/// ```no_run
/// use forgevoyer::EnvoyerClient;
///
/// #[derive(serde::Deserialize)]
/// struct ProjectList { projects: Vec<serde_json::Value> }
///
/// # async fn example() -> Result<(), forgevoyer::Error> {
/// let envoyer = EnvoyerClient::builder("envoyer-api-token")
///     .env_key("environment-key")
///     .build()?;
/// let list: ProjectList = envoyer.get_json("/projects").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EnvoyerClient {
    client: Client,
    env_key: Option<String>,
}

impl EnvoyerClient {
    /// Creates an Envoyer client with the default base URL and retry
    /// policy, caching disabled, and no environment key.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::builder(token).build()
    }

    /// Creates a builder seeded with Envoyer's defaults.
    pub fn builder(token: impl Into<String>) -> EnvoyerClientBuilder {
        EnvoyerClientBuilder {
            inner: Client::builder()
                .token(token)
                .base_url(DEFAULT_BASE_URL)
                .expect("default Envoyer base URL is valid")
                .retry(retry_defaults()),
            env_key: None,
        }
    }

    /// The environment encryption key, if configured.
    pub fn env_key(&self) -> Option<&str> {
        self.env_key.as_deref()
    }

    /// The underlying engine client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Deref for EnvoyerClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// Builder for [`EnvoyerClient`].
pub struct EnvoyerClientBuilder {
    inner: ClientBuilder,
    env_key: Option<String>,
}

impl EnvoyerClientBuilder {
    /// Overrides the API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.inner = self.inner.base_url(url)?;
        Ok(self)
    }

    /// Sets the environment encryption key used by environment endpoints.
    pub fn env_key(mut self, key: impl Into<String>) -> Self {
        self.env_key = Some(key.into());
        self
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

    /// Builds the [`EnvoyerClient`].
    pub fn build(self) -> Result<EnvoyerClient> {
        Ok(EnvoyerClient {
            client: self.inner.build()?,
            env_key: self.env_key,
        })
    }
}
