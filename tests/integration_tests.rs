//! Integration tests using wiremock to simulate the Forge and Envoyer APIs.

use forgevoyer::{
    CacheConfig, CancellationToken, Client, Error, RequestOptions, ResponseFormat, RetryConfig,
};
use http::Method;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Thing {
    id: u32,
}

fn client(server: &MockServer) -> Client {
    Client::builder()
        .token("test-token")
        .base_url(server.uri())
        .unwrap()
        .build()
        .unwrap()
}

fn caching_client(server: &MockServer, ttl: Duration) -> Client {
    Client::builder()
        .token("test-token")
        .base_url(server.uri())
        .unwrap()
        .cache(
            CacheConfig::enabled()
                .with_ttl(ttl)
                .with_cleanup_interval(Duration::ZERO),
        )
        .build()
        .unwrap()
}

/// Mounts a mock that counts how many requests actually reach the server.
async fn counting_mock(
    server: &MockServer,
    http_method: &str,
    route: &str,
    respond: impl Fn(usize) -> ResponseTemplate + Send + Sync + 'static,
) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let mock_hits = hits.clone();
    Mock::given(method(http_method))
        .and(path(route))
        .respond_with(move |_req: &wiremock::Request| {
            let count = mock_hits.fetch_add(1, Ordering::SeqCst);
            respond(count)
        })
        .mount(server)
        .await;
    hits
}

#[tokio::test]
async fn get_sends_auth_and_accept_headers_and_decodes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/servers/1"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&Thing { id: 1 }))
        .mount(&server)
        .await;

    let thing: Thing = client(&server).get_json("/servers/1").await.unwrap();
    assert_eq!(thing, Thing { id: 1 });
}

#[tokio::test]
async fn post_sends_json_body_and_content_type() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/servers"))
        .and(header("content-type", "application/json"))
        .and(wiremock::matchers::body_json(&Thing { id: 9 }))
        .respond_with(ResponseTemplate::new(201).set_body_json(&Thing { id: 9 }))
        .mount(&server)
        .await;

    let created: Thing = client(&server)
        .post_json("/servers", &Thing { id: 9 })
        .await
        .unwrap();
    assert_eq!(created.id, 9);
}

#[tokio::test]
async fn text_format_sets_plain_accept_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/servers/1/logs"))
        .and(header("accept", "text/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("log line"))
        .mount(&server)
        .await;

    let text = client(&server).get_text("/servers/1/logs").await.unwrap();
    assert_eq!(text, "log line");
}

#[tokio::test]
async fn per_call_accept_header_replaces_the_standard_one() {
    let server = MockServer::start().await;

    // Echo back every Accept value the server actually received.
    Mock::given(method("GET"))
        .and(path("/servers/1/report"))
        .respond_with(|req: &wiremock::Request| {
            let accepts: Vec<&str> = req
                .headers
                .get_all("accept")
                .iter()
                .map(|v| v.to_str().unwrap_or(""))
                .collect();
            ResponseTemplate::new(200).set_body_string(accepts.join(","))
        })
        .mount(&server)
        .await;

    let opts = RequestOptions::new()
        .with_header("accept", "application/x-yaml")
        .unwrap();
    let response = client(&server)
        .get_with("/servers/1/report", opts)
        .await
        .unwrap();

    assert_eq!(
        response.text(),
        "application/x-yaml",
        "caller Accept must replace the default, not be sent alongside it"
    );
}

#[tokio::test]
async fn not_found_is_distinguished_from_other_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/servers/404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&server)
        .await;
    for status in [400u16, 500, 503] {
        Mock::given(method("GET"))
            .and(path(format!("/servers/{status}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    let client = client(&server);

    let err = client.get("/servers/404").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.body(), Some("gone"));

    for status in [400u16, 500, 503] {
        let err = client.get(&format!("/servers/{status}")).await.unwrap_err();
        assert!(!err.is_not_found(), "{status} must not be not-found");
        assert_eq!(err.status().map(|s| s.as_u16()), Some(status));
    }
}

#[tokio::test]
async fn rate_limit_exhaustion_makes_exactly_max_retries_plus_one_attempts() {
    let server = MockServer::start().await;
    let hits = counting_mock(&server, "GET", "/servers", |_| {
        ResponseTemplate::new(429).set_body_string("slow down")
    })
    .await;

    let client = Client::builder()
        .token("test-token")
        .base_url(server.uri())
        .unwrap()
        .retry(
            RetryConfig::default()
                .with_max_retries(2)
                .with_base_delay(Duration::from_millis(10)),
        )
        .build()
        .unwrap();

    let err = client.get("/servers").await.unwrap_err();

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    match err {
        Error::Http { status, body, .. } => {
            assert_eq!(status.as_u16(), 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_503s_are_retried_until_success() {
    let server = MockServer::start().await;
    let hits = counting_mock(&server, "GET", "/things/7", |count| {
        if count < 2 {
            ResponseTemplate::new(503).set_body_string("unavailable")
        } else {
            ResponseTemplate::new(200).set_body_string(r#"{"id":7}"#)
        }
    })
    .await;

    let client = Client::builder()
        .token("test-token")
        .base_url(server.uri())
        .unwrap()
        .retry(
            RetryConfig::default()
                .with_max_retries(2)
                .with_base_delay(Duration::from_millis(10))
                .with_retryable_status(503),
        )
        .build()
        .unwrap();

    let thing: Thing = client.get_json("/things/7").await.unwrap();

    assert_eq!(thing.id, 7);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn per_call_retry_override_wins_over_client_default() {
    let server = MockServer::start().await;
    let hits = counting_mock(&server, "GET", "/flaky", |count| {
        if count == 0 {
            ResponseTemplate::new(503)
        } else {
            ResponseTemplate::new(200).set_body_json(&Thing { id: 1 })
        }
    })
    .await;

    // Client-level policy would never retry 503.
    let client = Client::builder()
        .token("test-token")
        .base_url(server.uri())
        .unwrap()
        .retry(RetryConfig::none())
        .build()
        .unwrap();

    let opts = RequestOptions::new().with_retry(
        RetryConfig::default()
            .with_max_retries(2)
            .with_base_delay(Duration::from_millis(10))
            .with_retryable_status(503),
    );
    let response = client.get_with("/flaky", opts).await.unwrap();

    assert!(response.is_success());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retry_after_header_is_preferred_over_backoff() {
    let server = MockServer::start().await;
    let hits = counting_mock(&server, "GET", "/servers", |count| {
        if count == 0 {
            ResponseTemplate::new(429)
                .insert_header("retry-after", "1")
                .set_body_string("rate limited")
        } else {
            ResponseTemplate::new(200).set_body_json(&Thing { id: 1 })
        }
    })
    .await;

    let client = Client::builder()
        .token("test-token")
        .base_url(server.uri())
        .unwrap()
        .retry(
            RetryConfig::default()
                .with_max_retries(2)
                // Computed backoff would be near-instant; Retry-After wins.
                .with_base_delay(Duration::from_millis(1)),
        )
        .build()
        .unwrap();

    let start = std::time::Instant::now();
    let thing: Thing = client.get_json("/servers").await.unwrap();

    assert_eq!(thing.id, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(start.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn cached_get_skips_the_network_until_ttl_expires() {
    let server = MockServer::start().await;
    let hits = counting_mock(&server, "GET", "/things/1", |_| {
        ResponseTemplate::new(200).set_body_json(&Thing { id: 1 })
    })
    .await;

    let client = caching_client(&server, Duration::from_millis(50));

    let first: Thing = client.get_json("/things/1").await.unwrap();
    let second: Thing = client.get_json("/things/1").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(hits.load(Ordering::SeqCst), 1, "second read must be cached");

    tokio::time::sleep(Duration::from_millis(60)).await;

    let third: Thing = client.get_json("/things/1").await.unwrap();
    assert_eq!(third.id, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2, "expired entry must refetch");
}

#[tokio::test]
async fn non_get_methods_never_touch_the_cache() {
    let server = MockServer::start().await;
    let hits = counting_mock(&server, "POST", "/servers", |_| {
        ResponseTemplate::new(201).set_body_json(&Thing { id: 1 })
    })
    .await;

    let client = caching_client(&server, Duration::from_secs(60));

    client.post("/servers", &Thing { id: 1 }).await.unwrap();
    client.post("/servers", &Thing { id: 1 }).await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(client.cache_stats().entry_count, 0);
}

#[tokio::test]
async fn force_refresh_bypasses_the_cache_read_but_still_writes() {
    let server = MockServer::start().await;
    let hits = counting_mock(&server, "GET", "/servers", |count| {
        ResponseTemplate::new(200).set_body_json(&Thing { id: count as u32 })
    })
    .await;

    let client = caching_client(&server, Duration::from_secs(60));

    let first: Thing = client.get_json("/servers").await.unwrap();
    assert_eq!(first.id, 0);

    let refreshed: Thing = client
        .get_json_with("/servers", RequestOptions::new().force_refresh())
        .await
        .unwrap();
    assert_eq!(refreshed.id, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    // The refreshed response replaced the cached one.
    let cached: Thing = client.get_json("/servers").await.unwrap();
    assert_eq!(cached.id, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn computed_cache_key_supports_targeted_invalidation() {
    let server = MockServer::start().await;
    let hits = counting_mock(&server, "GET", "/servers/5", |_| {
        ResponseTemplate::new(200).set_body_json(&Thing { id: 5 })
    })
    .await;

    let client = caching_client(&server, Duration::from_secs(60));
    client.get("/servers/5").await.unwrap();
    client.get("/servers/5").await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let key = Client::cache_key(&Method::GET, "/servers/5", None, ResponseFormat::Json);
    client.invalidate(&key);

    client.get("/servers/5").await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2, "invalidated entry must refetch");
}

#[tokio::test]
async fn cache_capacity_bounds_stored_entries() {
    let server = MockServer::start().await;
    let first = counting_mock(&server, "GET", "/servers/1", |_| {
        ResponseTemplate::new(200).set_body_json(&Thing { id: 1 })
    })
    .await;
    let second = counting_mock(&server, "GET", "/servers/2", |_| {
        ResponseTemplate::new(200).set_body_json(&Thing { id: 2 })
    })
    .await;

    let client = Client::builder()
        .token("test-token")
        .base_url(server.uri())
        .unwrap()
        .cache(
            CacheConfig::enabled()
                .with_ttl(Duration::from_secs(60))
                .with_cleanup_interval(Duration::ZERO)
                .with_max_entries(1),
        )
        .build()
        .unwrap();

    client.get("/servers/1").await.unwrap();
    client.get("/servers/2").await.unwrap();
    client.get("/servers/1").await.unwrap();
    client.get("/servers/2").await.unwrap();

    // Only the first entry fit; the second route hits the server every time.
    assert_eq!(client.cache_stats().entry_count, 1);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalidate_prefix_and_clear_cache() {
    let server = MockServer::start().await;
    for route in ["/servers/1", "/servers/2", "/sites/1"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(&Thing { id: 1 }))
            .mount(&server)
            .await;
    }

    let client = caching_client(&server, Duration::from_secs(60));
    for route in ["/servers/1", "/servers/2", "/sites/1"] {
        client.get(route).await.unwrap();
    }
    assert_eq!(client.cache_stats().entry_count, 3);

    let removed = client.invalidate_prefix("GET:/servers");
    assert_eq!(removed, 2);
    assert_eq!(client.cache_stats().entry_count, 1);

    client.clear_cache();
    assert_eq!(client.cache_stats().entry_count, 0);
}

#[tokio::test]
async fn cached_error_responses_keep_their_classification() {
    let server = MockServer::start().await;
    let hits = counting_mock(&server, "GET", "/servers/9", |_| {
        ResponseTemplate::new(404).set_body_string("missing")
    })
    .await;

    let client = Client::builder()
        .token("test-token")
        .base_url(server.uri())
        .unwrap()
        .cache(
            CacheConfig::enabled()
                .with_ttl(Duration::from_secs(60))
                .with_cleanup_interval(Duration::ZERO)
                .with_cache_error_responses(true),
        )
        .build()
        .unwrap();

    let err = client.get("/servers/9").await.unwrap_err();
    assert!(err.is_not_found());

    let err = client.get("/servers/9").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(hits.load(Ordering::SeqCst), 1, "404 must be served from cache");
}

#[tokio::test]
async fn cancellation_during_backoff_aborts_the_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/servers"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = Client::builder()
        .token("test-token")
        .base_url(server.uri())
        .unwrap()
        .retry(
            RetryConfig::default()
                .with_max_retries(3)
                .with_base_delay(Duration::from_secs(5))
                .with_retryable_status(503),
        )
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let start = std::time::Instant::now();
    let err = client
        .get_with("/servers", RequestOptions::new().with_cancel(cancel))
        .await
        .unwrap_err();

    assert!(err.is_cancelled(), "expected Cancelled, got {err:?}");
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "cancellation must preempt the 5s backoff"
    );
}

#[tokio::test]
async fn already_cancelled_token_returns_immediately() {
    let server = MockServer::start().await;
    let hits = counting_mock(&server, "GET", "/servers", |_| {
        ResponseTemplate::new(200).set_body_json(&Thing { id: 1 })
    })
    .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client(&server)
        .get_with("/servers", RequestOptions::new().with_cancel(cancel))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_body_with_requested_target_is_a_serialization_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/servers/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let err = client(&server).get_json::<Thing>("/servers/1").await.unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
}

#[tokio::test]
async fn http_error_carries_request_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/servers"))
        .respond_with(ResponseTemplate::new(422).set_body_string(r#"{"message":"invalid"}"#))
        .mount(&server)
        .await;

    let err = client(&server)
        .post("/servers", &Thing { id: 3 })
        .await
        .unwrap_err();

    match err {
        Error::Http {
            status,
            method,
            url,
            body,
            request_body,
        } => {
            assert_eq!(status.as_u16(), 422);
            assert_eq!(method.as_str(), "POST");
            assert!(url.ends_with("/servers"));
            assert!(body.contains("invalid"));
            assert_eq!(request_body.as_deref(), Some(r#"{"id":3}"#));
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn background_sweep_drops_expired_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&Thing { id: 1 }))
        .mount(&server)
        .await;

    let client = Client::builder()
        .token("test-token")
        .base_url(server.uri())
        .unwrap()
        .cache(
            CacheConfig::enabled()
                .with_ttl(Duration::from_millis(10))
                .with_cleanup_interval(Duration::from_millis(20)),
        )
        .build()
        .unwrap();

    client.get("/servers").await.unwrap();
    assert_eq!(client.cache_stats().entry_count, 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        client.cache_stats().entry_count,
        0,
        "sweep should have removed the expired entry"
    );

    client.close();
}
