use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use shelfscout_core::AppConfig;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{Result, SourceError};

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
const MAX_BACKOFF_FACTOR: u32 = 64;
const MAX_RETRY_AFTER_SECS: u32 = 300;

// ─── RateLimitedClient ────────────────────────────────────────────────────────

/// A reqwest client that keeps a minimum gap between requests and retries
/// network errors, 5xx and 429 responses with exponential backoff.
pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
    max_retries: u32,
    backoff_unit: Duration,
}

impl RateLimitedClient {
    pub fn new(
        min_interval: Duration,
        max_retries: u32,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
            max_retries,
            backoff_unit: Duration::from_secs(1),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.scraping_delay(),
            config.scraping.max_retries,
            &config.scraping.user_agent,
            config.request_timeout(),
        )
    }

    #[cfg(test)]
    pub(crate) fn new_for_tests(max_retries: u32) -> Self {
        let mut client = Self::new(
            Duration::from_millis(1),
            max_retries,
            "shelfscout-tests",
            Duration::from_secs(5),
        )
        .expect("test client");
        client.backoff_unit = Duration::from_millis(1);
        client
    }

    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn backoff(&self, attempt: u32) {
        sleep(self.backoff_unit * backoff_factor(attempt)).await;
    }

    /// GET with retries. Only successful responses are returned.
    pub async fn get_response(&self, url: &str) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            match self.client.get(url).send().await {
                Ok(r) if r.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                    if attempt >= self.max_retries {
                        return Err(SourceError::RateLimit(url.to_string(), wait));
                    }
                    warn!(url, attempt, wait, "rate limited, waiting");
                    sleep(self.backoff_unit * retry_after_factor(wait)).await;
                    attempt += 1;
                }
                Ok(r) if r.status().is_server_error() => {
                    let status = r.status().as_u16();
                    if attempt >= self.max_retries {
                        return Err(SourceError::ApiError(
                            url.to_string(),
                            format!("HTTP {status}"),
                        ));
                    }
                    warn!(url, attempt, status, "server error, retrying");
                    self.backoff(attempt).await;
                    attempt += 1;
                }
                Ok(r) if !r.status().is_success() => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    return Err(SourceError::ApiError(
                        url.to_string(),
                        format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
                    ));
                }
                Ok(r) => return Ok(r),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(SourceError::Http(e));
                    }
                    warn!(url, attempt, error = %e, "request failed, retrying");
                    self.backoff(attempt).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        let resp = self.get_response(url).await?;
        resp.text().await.map_err(SourceError::Http)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.get(url).await?;
        serde_json::from_str(&text).map_err(|e| SourceError::Parse(e.to_string()))
    }
}

/// `2^attempt` backoff units, capped.
fn backoff_factor(attempt: u32) -> u32 {
    2u32.checked_pow(attempt)
        .unwrap_or(u32::MAX)
        .min(MAX_BACKOFF_FACTOR)
}

/// Retry-After seconds as a unit multiplier, capped.
fn retry_after_factor(secs: u64) -> u32 {
    u32::try_from(secs).unwrap_or(u32::MAX).min(MAX_RETRY_AFTER_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn network_errors_surface_after_retries() {
        let client = RateLimitedClient::new_for_tests(1);
        // nothing listens on port 1
        let err = client.get("http://127.0.0.1:1/").await.unwrap_err();
        assert!(matches!(err, SourceError::Http(_)));
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/down")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;
        let client = RateLimitedClient::new_for_tests(2);

        let err = client.get(&format!("{}/down", server.url())).await.unwrap_err();
        assert!(matches!(err, SourceError::ApiError(_, ref msg) if msg == "HTTP 500"));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn client_errors_fail_immediately() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("not here")
            .expect(1)
            .create_async()
            .await;
        let client = RateLimitedClient::new_for_tests(3);

        let err = client.get(&format!("{}/missing", server.url())).await.unwrap_err();
        assert!(matches!(err, SourceError::ApiError(_, ref msg) if msg.starts_with("HTTP 404")));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_is_reported_after_retries() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/busy")
            .with_status(429)
            .with_header("retry-after", "1")
            .expect(2)
            .create_async()
            .await;
        let client = RateLimitedClient::new_for_tests(1);

        let err = client.get(&format!("{}/busy", server.url())).await.unwrap_err();
        assert!(matches!(err, SourceError::RateLimit(_, 1)));
        m.assert_async().await;
    }

    #[test]
    fn backoff_and_retry_after_are_capped() {
        assert_eq!(backoff_factor(0), 1);
        assert_eq!(backoff_factor(3), 8);
        assert_eq!(backoff_factor(32), MAX_BACKOFF_FACTOR);
        assert_eq!(backoff_factor(u32::MAX), MAX_BACKOFF_FACTOR);

        assert_eq!(retry_after_factor(2), 2);
        assert_eq!(retry_after_factor(86_400), MAX_RETRY_AFTER_SECS);
        assert_eq!(retry_after_factor(u64::MAX), MAX_RETRY_AFTER_SECS);
        // multiplying the real unit must not overflow Duration
        let _ = Duration::from_secs(1) * retry_after_factor(u64::MAX);
    }

    #[tokio::test]
    async fn huge_retry_after_does_not_panic() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/busy")
            .with_status(429)
            .with_header("retry-after", "99999999999999")
            .expect(2)
            .create_async()
            .await;
        let client = RateLimitedClient::new_for_tests(1);

        let err = client.get(&format!("{}/busy", server.url())).await.unwrap_err();
        assert!(matches!(err, SourceError::RateLimit(_, 99_999_999_999_999)));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn get_json_parses_body() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/data")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"answer": 42}"#)
            .create_async()
            .await;
        let client = RateLimitedClient::new_for_tests(0);

        let value: serde_json::Value = client
            .get_json(&format!("{}/data", server.url()))
            .await
            .unwrap();
        assert_eq!(value["answer"], 42);
    }
}
