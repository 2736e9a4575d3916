//! Rate-limited HTTP transport shared by every backend adapter.
//!
//! [`RateLimitedTransport`] wraps a `reqwest::Client` and adds two behaviours:
//!
//! - **Throttling**: request starts are spaced at least `1 / rate_limit` seconds apart.
//! - **Pause and retry once**: a rate-limit rejection (HTTP 429, or 403 with
//!   `X-RateLimit-Remaining: 0`) suspends the caller for the duration the backend asks
//!   for and re-sends the same request exactly once. A second rejection surfaces as
//!   [`VcsError::RateLimited`].
//!
//! Wait duration, first match wins:
//!
//! 1. `Retry-After` (seconds)
//! 2. `X-RateLimit-Reset` / `RateLimit-Reset` (epoch seconds or delta seconds)
//! 3. 60 seconds
//!
//! The result is capped at 15 minutes.
//!
//! # Examples
//!
//! ```ignore
//! use syringe_vcs::transport::RateLimitedTransport;
//!
//! let transport = RateLimitedTransport::builder("gitlab").rate_limit(10).build()?;
//! let body = transport
//!     .get_bytes(|client| client.get("https://gitlab.com/api/v4/version"))
//!     .await?;
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use metrics::counter;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use syringe_core::metrics as m;

use crate::error::VcsError;

/// Wait used when the backend gives no hint.
pub const FALLBACK_WAIT: Duration = Duration::from_secs(60);

/// Upper bound for a single rate-limit pause.
pub const MAX_WAIT: Duration = Duration::from_secs(15 * 60);

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Reset header values above this are treated as epoch seconds.
const EPOCH_THRESHOLD: u64 = 1_000_000_000;

/// Maximum number of response-body bytes quoted in an error message.
const ERROR_BODY_LIMIT: usize = 200;

/// Builder for [`RateLimitedTransport`].
#[derive(Debug, Clone)]
pub struct TransportBuilder {
    backend: &'static str,
    rate_limit: u32,
    proxy_url: Option<String>,
    max_wait: Duration,
    request_timeout: Duration,
}

impl TransportBuilder {
    /// Maximum requests per second (0 disables throttling).
    pub fn rate_limit(mut self, per_second: u32) -> Self {
        self.rate_limit = per_second;
        self
    }

    /// Routes every request through the given proxy. Empty strings are ignored.
    pub fn proxy_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.proxy_url = (!url.trim().is_empty()).then_some(url);
        self
    }

    /// Caps a single rate-limit pause.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns `VcsError::Config` if the proxy URL is invalid or the TLS backend
    /// cannot be initialised.
    pub fn build(self) -> Result<RateLimitedTransport, VcsError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("syringe/", env!("CARGO_PKG_VERSION")))
            .timeout(self.request_timeout);

        if let Some(url) = &self.proxy_url {
            let proxy = reqwest::Proxy::all(url).map_err(|e| VcsError::Config {
                field: "vcs.proxy_url".to_owned(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| VcsError::Config {
            field: "vcs".to_owned(),
            reason: format!("failed to build http client: {e}"),
        })?;

        let min_interval = (self.rate_limit > 0)
            .then(|| Duration::from_secs_f64(1.0 / f64::from(self.rate_limit)));

        Ok(RateLimitedTransport {
            client,
            backend: self.backend,
            min_interval,
            next_slot: Mutex::new(Instant::now()),
            max_wait: self.max_wait,
        })
    }
}

/// HTTP transport with throttling and rate-limit pause/retry.
///
/// Shared by reference across all concurrent discovery tasks of one adapter.
#[derive(Debug)]
pub struct RateLimitedTransport {
    client: reqwest::Client,
    backend: &'static str,
    min_interval: Option<Duration>,
    next_slot: Mutex<Instant>,
    max_wait: Duration,
}

impl RateLimitedTransport {
    /// Creates a builder. `backend` is used as a log field and metric label.
    pub fn builder(backend: &'static str) -> TransportBuilder {
        TransportBuilder {
            backend,
            rate_limit: 0,
            proxy_url: None,
            max_wait: MAX_WAIT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Backend label.
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Sends a request, pausing and retrying once on a rate-limit rejection.
    ///
    /// The returned response may carry any status code; use [`send`](Self::send)
    /// to also map error statuses.
    pub async fn execute<F>(&self, build: F) -> Result<Response, VcsError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        let response = self.send_once(&build).await?;
        if !is_rate_limited(response.status(), response.headers()) {
            return Ok(response);
        }

        counter!(m::TRANSPORT_RATE_LIMITED_TOTAL, m::LABEL_BACKEND => self.backend).increment(1);
        let wait = rate_limit_wait(response.headers(), unix_now(), self.max_wait);
        let url = response.url().to_string();
        warn!(
            backend = self.backend,
            url = url.as_str(),
            wait_secs = wait.as_secs(),
            "rate limited, pausing before retry"
        );
        drop(response);
        tokio::time::sleep(wait).await;

        let retry = self.send_once(&build).await?;
        if is_rate_limited(retry.status(), retry.headers()) {
            counter!(m::TRANSPORT_RATE_LIMITED_TOTAL, m::LABEL_BACKEND => self.backend)
                .increment(1);
            return Err(VcsError::RateLimited(format!(
                "{url}: still rejected after waiting {}s",
                wait.as_secs()
            )));
        }
        Ok(retry)
    }

    /// Sends a request and maps non-success statuses to [`VcsError`].
    pub async fn send<F>(&self, build: F) -> Result<Response, VcsError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        let response = self.execute(build).await?;
        check_status(response).await
    }

    /// Sends a request and decodes the JSON body.
    pub async fn get_json<T, F>(&self, build: F) -> Result<T, VcsError>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        let response = self.send(build).await?;
        decode_json(response).await
    }

    /// Sends a request and returns the raw body.
    pub async fn get_bytes<F>(&self, build: F) -> Result<Bytes, VcsError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        let response = self.send(build).await?;
        Ok(response.bytes().await?)
    }

    async fn send_once<F>(&self, build: &F) -> Result<Response, VcsError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        self.throttle().await;
        counter!(m::TRANSPORT_REQUESTS_TOTAL, m::LABEL_BACKEND => self.backend).increment(1);
        let response = build(&self.client).send().await.map_err(|e| {
            VcsError::Unavailable(format!("{} request failed: {e}", self.backend))
        })?;
        debug!(
            backend = self.backend,
            url = %response.url(),
            status = response.status().as_u16(),
            "backend response"
        );
        Ok(response)
    }

    /// Reserves the next request slot and sleeps until it starts.
    async fn throttle(&self) {
        let Some(interval) = self.min_interval else {
            return;
        };
        let slot = {
            let mut next = self.next_slot.lock().await;
            let slot = (*next).max(Instant::now());
            *next = slot + interval;
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

/// Decodes a JSON response body.
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, VcsError> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Passes success responses through and maps everything else to [`VcsError`].
pub async fn check_status(response: Response) -> Result<Response, VcsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &url, &body))
}

/// Maps an error status to the adapter error taxonomy.
pub fn status_error(status: StatusCode, url: &str, body: &str) -> VcsError {
    let snippet: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    let message = format!("{url}: {status} {snippet}").trim_end().to_owned();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => VcsError::Authentication(message),
        StatusCode::NOT_FOUND => VcsError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => VcsError::RateLimited(message),
        _ => VcsError::Unavailable(message),
    }
}

/// Whether a response is a rate-limit rejection.
pub fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0")
}

/// Computes how long to pause after a rate-limit rejection.
pub fn rate_limit_wait(headers: &HeaderMap, now_epoch_secs: u64, cap: Duration) -> Duration {
    let header_secs = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    let wait = if let Some(secs) = header_secs("retry-after") {
        Duration::from_secs(secs)
    } else if let Some(reset) =
        header_secs("x-ratelimit-reset").or_else(|| header_secs("ratelimit-reset"))
    {
        if reset > EPOCH_THRESHOLD {
            Duration::from_secs(reset.saturating_sub(now_epoch_secs))
        } else {
            Duration::from_secs(reset)
        }
    } else {
        FALLBACK_WAIT
    };

    wait.min(cap)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use reqwest::header::HeaderValue;

    use super::*;
    use crate::test_server::{StubResponse, StubServer};

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn transport() -> RateLimitedTransport {
        RateLimitedTransport::builder("test")
            .max_wait(Duration::from_millis(50))
            .build()
            .unwrap()
    }

    #[test]
    fn wait_prefers_retry_after() {
        let h = headers(&[("retry-after", "7"), ("x-ratelimit-reset", "30")]);
        assert_eq!(rate_limit_wait(&h, 0, MAX_WAIT), Duration::from_secs(7));
    }

    #[test]
    fn wait_uses_epoch_reset() {
        let now = 1_700_000_000;
        let h = headers(&[("x-ratelimit-reset", "1700000042")]);
        assert_eq!(rate_limit_wait(&h, now, MAX_WAIT), Duration::from_secs(42));
    }

    #[test]
    fn wait_uses_delta_reset() {
        let h = headers(&[("ratelimit-reset", "12")]);
        assert_eq!(
            rate_limit_wait(&h, 1_700_000_000, MAX_WAIT),
            Duration::from_secs(12)
        );
    }

    #[test]
    fn wait_epoch_in_past_is_zero() {
        let h = headers(&[("x-ratelimit-reset", "1600000000")]);
        assert_eq!(rate_limit_wait(&h, 1_700_000_000, MAX_WAIT), Duration::ZERO);
    }

    #[test]
    fn wait_falls_back_to_sixty_seconds() {
        let h = headers(&[("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT")]);
        assert_eq!(rate_limit_wait(&h, 0, MAX_WAIT), FALLBACK_WAIT);
        assert_eq!(rate_limit_wait(&HeaderMap::new(), 0, MAX_WAIT), FALLBACK_WAIT);
    }

    #[test]
    fn wait_is_capped_at_fifteen_minutes() {
        let h = headers(&[("retry-after", "86400")]);
        assert_eq!(rate_limit_wait(&h, 0, MAX_WAIT), MAX_WAIT);
    }

    #[test]
    fn rate_limit_detection() {
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new()));
        assert!(is_rate_limited(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "0")])
        ));
        assert!(!is_rate_limited(StatusCode::FORBIDDEN, &HeaderMap::new()));
        assert!(!is_rate_limited(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "12")])
        ));
        assert!(!is_rate_limited(StatusCode::OK, &HeaderMap::new()));
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "u", ""),
            VcsError::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "u", ""),
            VcsError::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "u", ""),
            VcsError::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "u", ""),
            VcsError::Unavailable(_)
        ));
    }

    #[test]
    fn status_error_truncates_body() {
        let body = "x".repeat(1000);
        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, "u", &body);
        assert!(err.to_string().len() < 300);
    }

    #[tokio::test]
    async fn retries_once_after_429() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let server = StubServer::start(move |_| {
            if calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                StubResponse::status(429).with_header("Retry-After", "0")
            } else {
                StubResponse::json(r#"{"ok":true}"#)
            }
        })
        .await;

        let t = transport();
        let url = format!("{}/ping", server.base_url());
        let value: serde_json::Value = t.get_json(|c| c.get(&url)).await.unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn second_rejection_surfaces_rate_limited() {
        let server = StubServer::start(|_| StubResponse::status(429)).await;

        let t = transport();
        let url = format!("{}/ping", server.base_url());
        let err = t.get_bytes(|c| c.get(&url)).await.unwrap_err();
        assert!(matches!(err, VcsError::RateLimited(_)));
        assert_eq!(server.hits(), 2, "exactly one retry");
    }

    #[tokio::test]
    async fn forbidden_with_zero_remaining_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let server = StubServer::start(move |_| {
            if calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                StubResponse::status(403)
                    .with_header("X-RateLimit-Remaining", "0")
                    .with_header("X-RateLimit-Reset", "0")
            } else {
                StubResponse::status(200).with_body("raw")
            }
        })
        .await;

        let t = transport();
        let url = format!("{}/file", server.base_url());
        let body = t.get_bytes(|c| c.get(&url)).await.unwrap();
        assert_eq!(&body[..], b"raw");
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn plain_forbidden_is_authentication_error() {
        let server = StubServer::start(|_| StubResponse::status(403)).await;

        let t = transport();
        let url = format!("{}/x", server.base_url());
        let err = t.get_bytes(|c| c.get(&url)).await.unwrap_err();
        assert!(matches!(err, VcsError::Authentication(_)));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn not_found_and_server_errors_are_mapped() {
        let server = StubServer::start(|req| {
            if req.path() == "/missing" {
                StubResponse::status(404)
            } else {
                StubResponse::status(503)
            }
        })
        .await;

        let t = transport();
        let missing = format!("{}/missing", server.base_url());
        let broken = format!("{}/broken", server.base_url());
        assert!(matches!(
            t.get_bytes(|c| c.get(&missing)).await.unwrap_err(),
            VcsError::NotFound(_)
        ));
        assert!(matches!(
            t.get_bytes(|c| c.get(&broken)).await.unwrap_err(),
            VcsError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn connection_refused_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let t = transport();
        let url = format!("http://{addr}/x");
        let err = t.get_bytes(|c| c.get(&url)).await.unwrap_err();
        assert!(matches!(err, VcsError::Unavailable(_)));
    }

    #[tokio::test]
    async fn invalid_json_is_decode_error() {
        let server = StubServer::start(|_| StubResponse::json("not json")).await;

        let t = transport();
        let url = format!("{}/x", server.base_url());
        let err = t
            .get_json::<serde_json::Value, _>(|c| c.get(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::Decode(_)));
    }

    #[tokio::test]
    async fn throttle_spaces_request_starts() {
        let server = StubServer::start(|_| StubResponse::status(200)).await;

        let t = RateLimitedTransport::builder("test")
            .rate_limit(20)
            .build()
            .unwrap();
        let url = format!("{}/x", server.base_url());

        let started = std::time::Instant::now();
        for _ in 0..3 {
            t.get_bytes(|c| c.get(&url)).await.unwrap();
        }
        // 세 번째 요청은 최소 2 * 50ms 이후에 시작
        assert!(started.elapsed() >= Duration::from_millis(95));
    }

    #[test]
    fn invalid_proxy_is_config_error() {
        let err = RateLimitedTransport::builder("test")
            .proxy_url("http://[invalid")
            .build()
            .unwrap_err();
        assert!(matches!(err, VcsError::Config { .. }));
    }
}
