//! The unified HTTP client shared by every portal adapter.
//!
//! One pooled `reqwest::Client`, per-host throttling, bounded retries with
//! linear backoff, and a hard per-request timeout. The client never errors
//! outward: a terminal failure is logged with its source tag and returned
//! as `None`, so a broken portal can only ever produce an empty batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

/// Browser-like user agent sent with every request.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Tunables for the shared client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout for JSON endpoints.
    pub json_timeout: Duration,
    /// Per-request timeout for HTML pages.
    pub html_timeout: Duration,
    /// Attempts per request, counting the first.
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` sleeps `n * backoff_base`.
    pub backoff_base: Duration,
    /// Concurrent in-flight requests per host.
    pub per_host_concurrency: usize,
    /// Minimum spacing between request starts to the same host.
    pub per_host_spacing: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            json_timeout: Duration::from_secs(10),
            html_timeout: Duration::from_secs(15),
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            per_host_concurrency: 4,
            per_host_spacing: Duration::from_millis(500),
        }
    }
}

struct HostGate {
    permits: Semaphore,
    last_start: Mutex<Option<Instant>>,
}

/// Pooled HTTP client with per-host throttling and retry.
///
/// Cheap to share: hold it in an `Arc` and hand clones of that to every
/// adapter. Safe under many concurrent tasks.
pub struct HttpClient {
    client: reqwest::Client,
    cfg: HttpClientConfig,
    hosts: Mutex<HashMap<String, Arc<HostGate>>>,
}

enum Payload {
    Json(serde_json::Value),
    Html(String),
}

impl HttpClient {
    /// Build a client with default timeouts and throttles.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    /// Build a client with custom tunables (tests shrink the timers).
    #[must_use]
    pub fn with_config(cfg: HttpClientConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            cfg,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch and decode a JSON endpoint. `None` on terminal failure.
    pub async fn fetch_json(&self, url: &str, source: &str) -> Option<serde_json::Value> {
        self.fetch_json_with(url, &[], None, source).await
    }

    /// Fetch JSON with extra headers and an optional timeout override.
    pub async fn fetch_json_with(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Option<Duration>,
        source: &str,
    ) -> Option<serde_json::Value> {
        let timeout = timeout.unwrap_or(self.cfg.json_timeout);
        match self.fetch(url, headers, timeout, true, source).await {
            Some(Payload::Json(v)) => Some(v),
            _ => None,
        }
    }

    /// Fetch an HTML page as text. `None` on terminal failure.
    pub async fn fetch_html(&self, url: &str, source: &str) -> Option<String> {
        self.fetch_html_with(url, &[], None, source).await
    }

    /// Fetch HTML with extra headers and an optional timeout override.
    pub async fn fetch_html_with(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Option<Duration>,
        source: &str,
    ) -> Option<String> {
        let timeout = timeout.unwrap_or(self.cfg.html_timeout);
        match self.fetch(url, headers, timeout, false, source).await {
            Some(Payload::Html(s)) => Some(s),
            _ => None,
        }
    }

    async fn fetch(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
        json: bool,
        source: &str,
    ) -> Option<Payload> {
        let gate = self.gate_for(url).await;

        for attempt in 1..=self.cfg.max_attempts {
            let _permit = gate.permits.acquire().await.ok()?;
            self.respect_spacing(&gate).await;

            let mut req = self.client.get(url).timeout(timeout);
            for (name, value) in headers {
                req = req.header(*name, *value);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let wait = retry_after(&resp)
                            .unwrap_or(self.cfg.backoff_base * attempt);
                        tracing::warn!(source, url, wait_s = wait.as_secs(), "rate limited, honouring retry-after");
                        drop(_permit);
                        if attempt < self.cfg.max_attempts {
                            tokio::time::sleep(wait).await;
                        }
                        continue;
                    }
                    if status.is_server_error() {
                        tracing::warn!(source, url, %status, attempt, "server error");
                        drop(_permit);
                        self.backoff(attempt).await;
                        continue;
                    }
                    if !status.is_success() {
                        // 4xx other than 429 is permanent for this run.
                        tracing::warn!(source, url, %status, "permanent portal failure");
                        return None;
                    }
                    if json {
                        match resp.json::<serde_json::Value>().await {
                            Ok(v) => return Some(Payload::Json(v)),
                            Err(e) => {
                                tracing::warn!(source, url, error = %e, attempt, "json decode failed");
                                drop(_permit);
                                self.backoff(attempt).await;
                                continue;
                            }
                        }
                    }
                    match resp.text().await {
                        Ok(body) => return Some(Payload::Html(body)),
                        Err(e) => {
                            tracing::warn!(source, url, error = %e, attempt, "body read failed");
                            drop(_permit);
                            self.backoff(attempt).await;
                            continue;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(source, url, error = %e, attempt, "request failed");
                    drop(_permit);
                    self.backoff(attempt).await;
                }
            }
        }

        tracing::warn!(source, url, attempts = self.cfg.max_attempts, "giving up");
        None
    }

    async fn gate_for(&self, url: &str) -> Arc<HostGate> {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        let mut hosts = self.hosts.lock().await;
        hosts
            .entry(host)
            .or_insert_with(|| {
                Arc::new(HostGate {
                    permits: Semaphore::new(self.cfg.per_host_concurrency),
                    last_start: Mutex::new(None),
                })
            })
            .clone()
    }

    async fn respect_spacing(&self, gate: &HostGate) {
        let mut last = gate.last_start.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.cfg.per_host_spacing {
                tokio::time::sleep(self.cfg.per_host_spacing - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn backoff(&self, attempt: u32) {
        if attempt < self.cfg.max_attempts {
            tokio::time::sleep(self.cfg.backoff_base * attempt).await;
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
