//! HTTP transport for ingestion.
//!
//! The source clients talk to an [`HttpClient`] trait object rather than to
//! `reqwest` directly, so tests can serve canned responses. Retry and
//! rate-limit handling live in [`get_with_backoff`], which runs under a
//! bounded [`RetryConfig`] and sleeps through an injected [`Clock`].

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::errors::{is_retryable_status, DoraError, Result};

/// A GET request: URL, headers and query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Replace a query parameter if present, otherwise add it.
    pub fn set_query(mut self, name: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        match self.query.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value,
            None => self.query.push((name.to_string(), value)),
        }
        self
    }
}

/// A fully-read HTTP response. Header names are lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| DoraError::decode(format!("{}: {}", self.url, e)))
    }
}

/// Blocking HTTP GET.
pub trait HttpClient: Send + Sync {
    /// Perform a single request. Non-2xx statuses are returned, not raised.
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Time source for backoff sleeps and rate-limit resets.
pub trait Clock: Send + Sync {
    fn now_epoch(&self) -> i64;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// `reqwest` blocking client.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dora-metrics/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DoraError::http("<client>", e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.get(&request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .send()
            .map_err(|e| DoraError::http(&request.url, e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .map_err(|e| DoraError::http(&request.url, e.to_string()))?;

        Ok(HttpResponse {
            url: request.url.clone(),
            status,
            headers,
            body,
        })
    }
}

/// GitHub signals an exhausted quota with a 403 and a zero remaining count.
fn rate_limit_reset(response: &HttpResponse) -> Option<i64> {
    if response.status != 403 {
        return None;
    }
    let remaining = response.header("x-ratelimit-remaining")?;
    let remaining: i64 = remaining.trim().parse().unwrap_or(0);
    let reset: i64 = response
        .header("x-ratelimit-reset")
        .and_then(|r| r.trim().parse().ok())
        .unwrap_or(0);
    (remaining <= 0 && reset > 0).then_some(reset)
}

/// GET with bounded retries.
///
/// Retries transport errors and 429/502/503/504 with the configured delay,
/// and sleeps through GitHub rate-limit resets up to the configured ceiling.
/// Any other non-2xx status is returned as [`DoraError::Status`] immediately.
pub fn get_with_backoff(
    client: &dyn HttpClient,
    clock: &dyn Clock,
    retry: &RetryConfig,
    request: &HttpRequest,
) -> Result<HttpResponse> {
    let mut attempt: u32 = 0;
    loop {
        let response = match client.get(request) {
            Ok(response) => response,
            Err(err) if err.is_retryable() => {
                attempt += 1;
                if !retry.should_retry(attempt) {
                    return Err(err);
                }
                let delay = retry.delay_for_attempt(attempt);
                tracing::warn!(url = %request.url, attempt, ?delay, "Request failed: {}; retrying", err);
                clock.sleep(delay);
                continue;
            }
            Err(err) => return Err(err),
        };

        if let Some(reset) = rate_limit_reset(&response) {
            attempt += 1;
            let now = clock.now_epoch();
            let wait = retry
                .rate_limit_wait(reset, now)
                .filter(|_| retry.should_retry(attempt));
            match wait {
                Some(wait) => {
                    tracing::warn!(url = %request.url, ?wait, "Rate-limited; sleeping until reset");
                    clock.sleep(wait);
                    continue;
                }
                None => {
                    return Err(DoraError::RateLimited {
                        url: request.url.clone(),
                        retry_after: Duration::from_secs((reset - now).max(0) as u64),
                    })
                }
            }
        }

        if is_retryable_status(response.status) {
            attempt += 1;
            let delay = retry.delay_for_attempt(attempt);
            if retry.should_retry(attempt) {
                tracing::warn!(url = %request.url, status = response.status, attempt, ?delay, "Retrying");
                clock.sleep(delay);
                continue;
            }
            if response.status == 429 {
                return Err(DoraError::RateLimited {
                    url: request.url.clone(),
                    retry_after: delay,
                });
            }
            return Err(DoraError::Status {
                url: request.url.clone(),
                status: response.status,
            });
        }

        if !response.is_success() {
            return Err(DoraError::Status {
                url: request.url.clone(),
                status: response.status,
            });
        }
        return Ok(response);
    }
}
