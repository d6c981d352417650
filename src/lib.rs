//! # forgevoyer - Resilient API clients for Laravel Forge and Envoyer
//!
//! forgevoyer wraps the Forge and Envoyer REST APIs in async clients built
//! on `reqwest`, sharing one request engine that handles bearer-token auth,
//! retries with exponential backoff and jitter, `Retry-After`-aware
//! rate-limit handling, and an optional in-memory response cache with
//! TTL-based expiry.
//!
//! ## Quick Start
//!
//! ```no_run
//! use forgevoyer::ForgeClient;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Server {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct ServerEnvelope {
//!     server: Server,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), forgevoyer::Error> {
//!     let forge = ForgeClient::new("forge-api-token")?;
//!
//!     let envelope: ServerEnvelope = forge.get_json("/servers/42").await?;
//!     println!("server: {}", envelope.server.name);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Caching
//!
//! Caching applies to GET requests only and is disabled by default. When
//! enabled, repeat reads within the TTL are served from memory without any
//! network activity; a background sweep drops expired entries.
//!
//! ```no_run
//! use forgevoyer::{CacheConfig, ForgeClient, RequestOptions};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), forgevoyer::Error> {
//! let forge = ForgeClient::builder("forge-api-token")
//!     .cache(CacheConfig::enabled().with_ttl(Duration::from_secs(60)))
//!     .build()?;
//!
//! // First call hits the network, second is served from cache.
//! let a = forge.get("/servers").await?;
//! let b = forge.get("/servers").await?;
//!
//! // Bypass the cache read when freshness matters.
//! let fresh = forge
//!     .get_with("/servers", RequestOptions::new().force_refresh())
//!     .await?;
//!
//! // Drop everything cached under /servers after a mutation.
//! forge.invalidate_prefix("GET:/servers");
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Errors are tagged variants; the one most callers branch on is the
//! distinguished not-found kind:
//!
//! ```no_run
//! use forgevoyer::{Error, ForgeClient};
//!
//! # async fn example() -> Result<(), Error> {
//! # let forge = ForgeClient::new("token")?;
//! match forge.get_json::<serde_json::Value>("/servers/42").await {
//!     Ok(server) => println!("{server}"),
//!     Err(e) if e.is_not_found() => println!("server gone, recreate it"),
//!     Err(Error::Http { status, body, .. }) => {
//!         eprintln!("API error {status}: {body}");
//!     }
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retries and Cancellation
//!
//! Each backend ships its own retry defaults (Forge retries only 429 with
//! long delays; Envoyer retries the usual transient statuses with short
//! backoff). Both are overridable at construction or per call. A
//! [`CancellationToken`] attached to a call aborts it during network waits
//! and backoff sleeps:
//!
//! ```no_run
//! use forgevoyer::{CancellationToken, EnvoyerClient, RequestOptions, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), forgevoyer::Error> {
//! let envoyer = EnvoyerClient::new("envoyer-api-token")?;
//!
//! let cancel = CancellationToken::new();
//! let opts = RequestOptions::new()
//!     .with_retry(RetryConfig::default().with_max_retries(5))
//!     .with_cancel(cancel.clone());
//!
//! // Elsewhere: cancel.cancel() aborts the call with Error::Cancelled.
//! let deployments = envoyer.get_with("/projects/1/deployments", opts).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod response;

pub mod cache;
pub mod envoyer;
pub mod forge;
pub mod options;
pub mod retry;

pub use cache::{CacheConfig, CacheEntry, CacheStats, CacheStore, MemoryCache};
pub use client::{Client, ClientBuilder};
pub use envoyer::EnvoyerClient;
pub use error::{Error, Result};
pub use forge::ForgeClient;
pub use options::{RequestOptions, ResponseFormat};
pub use response::ApiResponse;
pub use retry::RetryConfig;

pub use tokio_util::sync::CancellationToken;
