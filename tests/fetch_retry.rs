//! Fetch retry behavior against a scripted loopback HTTP server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use pricetrawl::fetch::{FetchError, FetchSettings, PageFetcher, RateLimiter};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Serve one scripted response per connection, then repeat the last one.
/// Returns the base URL and a connection counter.
async fn scripted_server(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));

    let counter = connections.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let response = responses
                .get(n)
                .or_else(|| responses.last())
                .cloned()
                .unwrap_or_default();

            tokio::spawn(async move {
                // Drain the request head before answering
                let mut buf = [0u8; 4096];
                let mut seen = Vec::new();
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(read) => {
                            seen.extend_from_slice(&buf[..read]);
                            if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                        Err(_) => return,
                    }
                }
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}", addr), connections)
}

fn html_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

fn status_response(status: u16, reason: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        status, reason
    )
}

fn listing_body() -> String {
    format!(
        "<!DOCTYPE html><html><body><div class=\"grid\">{}</div></body></html>",
        "<div class=\"card\">item</div>".repeat(40)
    )
}

fn fast_settings() -> FetchSettings {
    FetchSettings {
        max_attempts: 3,
        attempt_timeout_secs: 5,
        backoff_base_ms: 50,
        backoff_max_ms: 2_000,
        rate_limit_backoff_ms: 400,
        min_html_bytes: 256,
        request_delay_ms: 1,
        user_agent: None,
    }
}

fn fetcher(settings: FetchSettings) -> PageFetcher {
    let limiter = RateLimiter::with_config(settings.rate_limit_config());
    PageFetcher::new(settings, limiter, CancellationToken::new())
}

/// Scenario: 429 on the first attempt, success on the second. The fetch
/// succeeds with one retry and the elapsed time covers the configured
/// rate-limit backoff.
#[tokio::test]
async fn test_429_then_success_retries_with_backoff() {
    let (base, connections) = scripted_server(vec![
        status_response(429, "Too Many Requests"),
        html_response(&listing_body()),
    ])
    .await;

    let fetcher = fetcher(fast_settings());
    let started = Instant::now();
    let page = fetcher.fetch(&format!("{}/c/kitchen", base)).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(page.status, 200);
    assert_eq!(page.retries, 1);
    assert!(page.html.contains("card"));
    assert_eq!(connections.load(Ordering::SeqCst), 2);
    assert!(
        elapsed.as_millis() >= 400,
        "expected at least the configured 429 backoff, got {:?}",
        elapsed
    );
}

/// A body too small to be a real document counts as a failed attempt
/// and exhausts retries as invalid content.
#[tokio::test]
async fn test_implausible_content_is_retried_then_reported() {
    let (base, connections) = scripted_server(vec![html_response("<html>tiny</html>")]).await;

    let fetcher = fetcher(fast_settings());
    let result = fetcher.fetch(&format!("{}/c/kitchen", base)).await;

    assert!(matches!(result, Err(FetchError::InvalidContent { .. })));
    assert_eq!(connections.load(Ordering::SeqCst), 3);
}

/// Plain 404 is permanent: no retries, reported as blocked.
#[tokio::test]
async fn test_404_fails_without_retry() {
    let (base, connections) = scripted_server(vec![status_response(404, "Not Found")]).await;

    let fetcher = fetcher(fast_settings());
    let result = fetcher.fetch(&format!("{}/gone", base)).await;

    assert!(matches!(
        result,
        Err(FetchError::Blocked { status: 404, .. })
    ));
    assert_eq!(connections.load(Ordering::SeqCst), 1);
}

/// 503 responses escalate and eventually fail as blocked after the
/// attempt budget is spent.
#[tokio::test]
async fn test_503_exhausts_attempts_as_blocked() {
    let (base, connections) = scripted_server(vec![status_response(503, "Service Unavailable")]).await;

    let settings = FetchSettings {
        rate_limit_backoff_ms: 50,
        ..fast_settings()
    };
    let fetcher = fetcher(settings);
    let result = fetcher.fetch(&format!("{}/c/kitchen", base)).await;

    assert!(matches!(
        result,
        Err(FetchError::Blocked { status: 503, .. })
    ));
    assert_eq!(connections.load(Ordering::SeqCst), 3);
}
