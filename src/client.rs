//! The shared request/retry/cache engine behind both API clients.
//!
//! [`Client`] performs one logical call as: merge options, probe the cache
//! (idempotent GETs only), loop single attempts under the retry policy, and
//! write the final outcome back to the cache. Backend-specific defaults live
//! in [`crate::forge`] and [`crate::envoyer`]; this engine is parameterized
//! by them rather than duplicated per backend.

use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    cache::{CacheConfig, CacheEntry, CacheStats, CacheStore, MemoryCache},
    options::{RequestOptions, ResponseFormat},
    retry::{self, RetryConfig},
    ApiResponse, Error, Result,
};

/// An API client with retries, rate-limit handling, and response caching.
///
/// Cloning is cheap and clones share the connection pool, configuration,
/// and cache. Construct one via [`Client::builder`] or through the backend
/// wrappers [`ForgeClient`](crate::ForgeClient) and
/// [`EnvoyerClient`](crate::EnvoyerClient).
///
/// # Examples
///
/// ```no_run
/// use forgevoyer::{CacheConfig, Client, RetryConfig};
/// use std::time::Duration;
///
/// #[derive(serde::Deserialize)]
/// struct Server { id: u64 }
///
/// # async fn example() -> Result<(), forgevoyer::Error> {
/// let client = Client::builder()
///     .token("api-token")
///     .base_url("https://forge.laravel.com/api/v1")?
///     .timeout(Duration::from_secs(30))
///     .retry(RetryConfig::default().with_max_retries(6))
///     .cache(CacheConfig::enabled().with_ttl(Duration::from_secs(60)))
///     .build()?;
///
/// let server: Server = client.get_json("/servers/42").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    auth: HeaderValue,
    default_headers: HeaderMap,
    retry: RetryConfig,
    cache_config: CacheConfig,
    cache: Option<Arc<dyn CacheStore>>,
    timeout: Option<Duration>,
    sweep_cancel: Option<CancellationToken>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(cancel) = &self.sweep_cancel {
            cancel.cancel();
        }
    }
}

// Manual impl: the cache store is a trait object and the bearer token must
// never show up in debug output.
impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .field("cache_enabled", &self.inner.cache_config.enabled)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new [`ClientBuilder`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The base URL all request paths are appended to.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Makes a request with full control over method, body, and options.
    ///
    /// This is the method every convenience wrapper funnels into. The body,
    /// when present, is serialized to JSON exactly once (it also feeds the
    /// cache key).
    pub async fn request<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        opts: RequestOptions,
    ) -> Result<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        let body_bytes = match body {
            Some(body) => Some(serde_json::to_vec(body).map_err(|e| {
                Error::Serialization(format!("failed to encode request body: {}", e))
            })?),
            None => None,
        };
        self.execute(method, path, body_bytes, opts).await
    }

    /// One logical call: cache probe, then the attempt loop.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body_bytes: Option<Vec<u8>>,
        opts: RequestOptions,
    ) -> Result<ApiResponse> {
        let inner = &self.inner;

        // Per-call overrides win over client defaults.
        let retry = opts.retry.as_ref().unwrap_or(&inner.retry);
        let cache_enabled = opts.cache_enabled.unwrap_or(inner.cache_config.enabled);
        let cache_errors = opts
            .cache_error_responses
            .unwrap_or(inner.cache_config.cache_error_responses);
        let ttl = opts.cache_ttl.unwrap_or(inner.cache_config.ttl);
        let max_entries = inner.cache_config.max_entries;
        let cancel = opts.cancel.clone().unwrap_or_default();

        // Only idempotent reads are ever served from or written to cache.
        let cacheable = cache_enabled && inner.cache.is_some() && method == Method::GET;

        let url = Url::parse(&format!("{}{}", inner.base_url, path))?;
        let key = cache_key(&method, path, body_bytes.as_deref(), opts.format);

        // One header map for the whole call. Insert order matters: client
        // defaults first, then the standard auth/accept/content-type, then
        // per-call extras last so they replace on key collision.
        let mut request_headers = inner.default_headers.clone();
        request_headers.insert(header::AUTHORIZATION, inner.auth.clone());
        request_headers.insert(header::ACCEPT, HeaderValue::from_static(opts.format.accept()));
        if body_bytes.is_some() {
            request_headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
        for (name, value) in &opts.headers {
            request_headers.insert(name.clone(), value.clone());
        }

        if cacheable && !opts.force_refresh {
            if let Some(entry) = inner.cache.as_ref().and_then(|store| store.get(&key)) {
                tracing::debug!(key = %key, "cache hit");
                if !entry.status.is_success() {
                    // A cached terminal failure keeps its classification.
                    return Err(classify_error(
                        entry.status,
                        &method,
                        &url,
                        String::from_utf8_lossy(&entry.body).into_owned(),
                        request_body_text(body_bytes.as_deref()),
                    ));
                }
                return Ok(ApiResponse::new(entry.status, entry.headers, entry.body));
            }
        }

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let mut request = inner
                .http
                .request(method.clone(), url.clone())
                .headers(request_headers.clone());
            if let Some(bytes) = &body_bytes {
                request = request.body(bytes.clone());
            }
            if let Some(timeout) = inner.timeout {
                request = request.timeout(timeout);
            }

            if opts.debug {
                tracing::debug!(method = %method, url = %url, attempt, "sending request");
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                outcome = request.send() => outcome,
            };

            let response = match outcome {
                Ok(response) => response,
                Err(e) => {
                    if cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    let error = Error::Transport(e);
                    if retry.should_retry(Some(&error), None, attempt) {
                        let delay = retry.backoff(attempt);
                        tracing::warn!(
                            error = %error,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            method = %method,
                            url = %url,
                            "transport error, retrying"
                        );
                        sleep_or_cancel(delay, &cancel).await?;
                        attempt += 1;
                        continue;
                    }
                    return Err(error);
                }
            };

            let status = response.status();
            let headers = response.headers().clone();
            // Read the body in full before any branching; dropping the
            // response returns the connection to the pool promptly.
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                body = response.bytes() => body.map_err(Error::Transport)?,
            };

            if opts.debug {
                tracing::debug!(
                    status = status.as_u16(),
                    bytes = body.len(),
                    attempt,
                    "received response"
                );
            }

            if !status.is_success() {
                if retry.should_retry(None, Some(status), attempt) {
                    let delay = if status == StatusCode::TOO_MANY_REQUESTS {
                        retry::retry_after(&headers)
                            .map(|d| d.min(retry.max_delay))
                            .unwrap_or_else(|| retry.backoff(attempt))
                    } else {
                        retry.backoff(attempt)
                    };
                    tracing::info!(
                        status = status.as_u16(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retryable status, backing off"
                    );
                    sleep_or_cancel(delay, &cancel).await?;
                    attempt += 1;
                    continue;
                }

                // Only the terminal failure ever reaches the cache, never
                // an intermediate retried attempt. Cache writes are a
                // best-effort side channel.
                if cacheable && cache_errors {
                    if let Some(store) = &inner.cache {
                        cache_put(
                            store.as_ref(),
                            &key,
                            CacheEntry::new(body.to_vec(), ttl, status, headers.clone()),
                            max_entries,
                        );
                    }
                }

                let body_text = String::from_utf8_lossy(&body).into_owned();
                tracing::warn!(
                    status = status.as_u16(),
                    method = %method,
                    url = %url,
                    attempts = attempt + 1,
                    "request failed"
                );
                return Err(classify_error(
                    status,
                    &method,
                    &url,
                    body_text,
                    request_body_text(body_bytes.as_deref()),
                ));
            }

            if cacheable {
                if let Some(store) = &inner.cache {
                    cache_put(
                        store.as_ref(),
                        &key,
                        CacheEntry::new(body.to_vec(), ttl, status, headers.clone()),
                        max_entries,
                    );
                }
            }

            return Ok(ApiResponse::new(status, headers, body.to_vec()));
        }
    }

    /// Makes a GET request.
    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.get_with(path, RequestOptions::new()).await
    }

    /// Makes a GET request with per-call options.
    pub async fn get_with(&self, path: &str, opts: RequestOptions) -> Result<ApiResponse> {
        self.request::<()>(Method::GET, path, None, opts).await
    }

    /// Makes a GET request and decodes the JSON body into `T`.
    pub async fn get_json<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.get_json_with(path, RequestOptions::new()).await
    }

    /// Makes a GET request with per-call options and decodes the JSON body
    /// into `T`.
    pub async fn get_json_with<T>(&self, path: &str, opts: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let opts = opts.with_format(ResponseFormat::Json);
        self.get_with(path, opts).await?.json()
    }

    /// Makes a GET request and returns the body as text.
    pub async fn get_text(&self, path: &str) -> Result<String> {
        self.get_text_with(path, RequestOptions::new()).await
    }

    /// Makes a GET request with per-call options and returns the body as
    /// text.
    pub async fn get_text_with(&self, path: &str, opts: RequestOptions) -> Result<String> {
        let opts = opts.with_format(ResponseFormat::Text);
        Ok(self.get_with(path, opts).await?.text().into_owned())
    }

    /// Makes a GET request and returns the raw body bytes.
    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        self.get_bytes_with(path, RequestOptions::new()).await
    }

    /// Makes a GET request with per-call options and returns the raw body
    /// bytes.
    pub async fn get_bytes_with(&self, path: &str, opts: RequestOptions) -> Result<Vec<u8>> {
        let opts = opts.with_format(ResponseFormat::Raw);
        Ok(self.get_with(path, opts).await?.body)
    }

    /// Makes a POST request with a JSON body.
    pub async fn post<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        self.post_with(path, body, RequestOptions::new()).await
    }

    /// Makes a POST request with a JSON body and per-call options.
    pub async fn post_with<B>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOptions,
    ) -> Result<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body), opts).await
    }

    /// Makes a POST request and decodes the JSON response into `T`.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.post(path, body).await?.json()
    }

    /// Makes a PUT request with a JSON body.
    pub async fn put<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        self.put_with(path, body, RequestOptions::new()).await
    }

    /// Makes a PUT request with a JSON body and per-call options.
    pub async fn put_with<B>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOptions,
    ) -> Result<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, path, Some(body), opts).await
    }

    /// Makes a PUT request and decodes the JSON response into `T`.
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.put(path, body).await?.json()
    }

    /// Makes a DELETE request.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.delete_with(path, RequestOptions::new()).await
    }

    /// Makes a DELETE request with per-call options.
    pub async fn delete_with(&self, path: &str, opts: RequestOptions) -> Result<ApiResponse> {
        self.request::<()>(Method::DELETE, path, None, opts).await
    }

    /// Computes the cache key used for a request, for targeted
    /// invalidation.
    pub fn cache_key(
        method: &Method,
        path: &str,
        body: Option<&[u8]>,
        format: ResponseFormat,
    ) -> String {
        cache_key(method, path, body, format)
    }

    /// Removes a single cache entry.
    pub fn invalidate(&self, key: &str) {
        if let Some(store) = &self.inner.cache {
            store.remove(key);
        }
    }

    /// Removes every cache entry whose key starts with `prefix` and returns
    /// how many were removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let Some(store) = &self.inner.cache else {
            return 0;
        };
        let mut removed = 0;
        for key in store.keys() {
            if key.starts_with(prefix) {
                store.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    /// Removes all cache entries.
    pub fn clear_cache(&self) {
        if let Some(store) = &self.inner.cache {
            store.clear();
        }
    }

    /// Returns a snapshot of the cache state.
    pub fn cache_stats(&self) -> CacheStats {
        let keys = self
            .inner
            .cache
            .as_ref()
            .map(|store| store.keys())
            .unwrap_or_default();
        CacheStats {
            entry_count: keys.len(),
            keys,
        }
    }

    /// Stops the background cache sweep.
    ///
    /// Clones share the sweep task, so closing any clone stops it for all.
    /// Dropping the last clone stops it as well; `close` exists for callers
    /// that want the task gone deterministically before that.
    pub fn close(&self) {
        if let Some(cancel) = &self.inner.sweep_cancel {
            cancel.cancel();
        }
    }
}

/// Deterministic cache key: method, path, hex of the serialized body, and
/// the response format tag.
fn cache_key(method: &Method, path: &str, body: Option<&[u8]>, format: ResponseFormat) -> String {
    let mut key = format!("{}:{}:", method, path);
    if let Some(body) = body {
        for byte in body {
            let _ = write!(key, "{:02x}", byte);
        }
    }
    key.push(':');
    key.push_str(format.tag());
    key
}

/// Tags a terminal non-2xx response: 404 gets its own kind.
fn classify_error(
    status: StatusCode,
    method: &Method,
    url: &Url,
    body: String,
    request_body: Option<String>,
) -> Error {
    if status == StatusCode::NOT_FOUND {
        Error::NotFound {
            method: method.clone(),
            url: url.to_string(),
            body,
        }
    } else {
        Error::Http {
            status,
            method: method.clone(),
            url: url.to_string(),
            body,
            request_body,
        }
    }
}

/// Stores an entry unless the cache is at its configured capacity.
/// Overwrites of an existing key always go through; zero means unbounded.
fn cache_put(store: &dyn CacheStore, key: &str, entry: CacheEntry, max_entries: usize) {
    if max_entries > 0 {
        let keys = store.keys();
        if keys.len() >= max_entries && !keys.iter().any(|k| k == key) {
            tracing::debug!(key = %key, max_entries, "cache at capacity, skipping write");
            return;
        }
    }
    store.set(key, entry);
}

fn request_body_text(body: Option<&[u8]>) -> Option<String> {
    body.map(|b| String::from_utf8_lossy(b).into_owned())
}

/// Sleeps for `delay` unless the cancellation token fires first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder {
    token: Option<String>,
    base_url: Option<String>,
    default_headers: HeaderMap,
    retry: RetryConfig,
    cache_config: CacheConfig,
    cache_store: Option<Arc<dyn CacheStore>>,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Creates a builder with caching disabled and the default retry
    /// policy.
    pub fn new() -> Self {
        Self {
            token: None,
            base_url: None,
            default_headers: HeaderMap::new(),
            retry: RetryConfig::default(),
            cache_config: CacheConfig::default(),
            cache_store: None,
            timeout: None,
        }
    }

    /// Sets the bearer token sent on every request. Required.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the base URL. A trailing slash is trimmed so paths can always
    /// start with `/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        let trimmed = url.as_ref().trim_end_matches('/');
        Url::parse(trimmed)?;
        self.base_url = Some(trimmed.to_string());
        Ok(self)
    }

    /// Adds a header sent on every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the client-level retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the caching configuration.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Supplies a custom cache store and enables caching.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self.cache_config.enabled = true;
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the configured [`Client`].
    ///
    /// When caching is enabled with a nonzero cleanup interval, a background
    /// sweep task is spawned on the current Tokio runtime (skipped with a
    /// warning when no runtime is running).
    ///
    /// # Errors
    ///
    /// Returns an error if the token or base URL is missing, or the HTTP
    /// transport cannot be constructed.
    pub fn build(self) -> Result<Client> {
        let token = self
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Configuration("API token is required".to_string()))?;
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Configuration("base URL is required".to_string()))?;

        let mut auth = HeaderValue::try_from(format!("Bearer {}", token))
            .map_err(|e| Error::Configuration(format!("invalid API token: {}", e)))?;
        auth.set_sensitive(true);

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP transport: {}", e)))?;

        let cache: Option<Arc<dyn CacheStore>> = match self.cache_store {
            Some(store) => Some(store),
            None if self.cache_config.enabled => Some(Arc::new(MemoryCache::new())),
            None => None,
        };

        let sweep_cancel = match (&cache, &self.cache_config) {
            (Some(store), config) if config.enabled && !config.cleanup_interval.is_zero() => {
                spawn_sweep(Arc::clone(store), config.cleanup_interval)
            }
            _ => None,
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                auth,
                default_headers: self.default_headers,
                retry: self.retry,
                cache_config: self.cache_config,
                cache,
                timeout: self.timeout,
                sweep_cancel,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the periodic cache sweep, returning the token that stops it.
fn spawn_sweep(store: Arc<dyn CacheStore>, interval: Duration) -> Option<CancellationToken> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("no Tokio runtime running, cache sweep disabled");
        return None;
    };

    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    handle.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a Tokio interval fires immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = task_cancel.cancelled() => {
                    tracing::debug!("cache sweep stopped");
                    return;
                }
                _ = ticker.tick() => {
                    store.sweep();
                }
            }
        }
    });
    Some(cancel)
}
