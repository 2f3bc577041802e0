//! Resilient HTTP fetch with bounded retry and a short-lived response cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
        }
    }

    /// Identity used as the cache key: method and URL, plus the body when
    /// there is one.
    pub fn cache_key(&self) -> String {
        match &self.body {
            Some(body) => format!("{} {} {}", self.method.as_str(), self.url, body),
            None => format!("{} {}", self.method.as_str(), self.url),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One network round trip. Implementations do not retry or cache.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &FetchRequest) -> Result<HttpResponse, FetchError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tezpulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &FetchRequest) -> Result<HttpResponse, FetchError> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| FetchError::Transport {
            url: request.url.clone(),
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| FetchError::Transport {
            url: request.url.clone(),
            message: e.to_string(),
        })?;
        Ok(HttpResponse { status, body })
    }
}

#[derive(Debug, Clone)]
pub struct FetchCacheEntry {
    pub value: Value,
    pub fetched_at: Instant,
}

/// Response cache shared by every clone of a [`Fetcher`].
///
/// Create one per process. Entries leave only by TTL expiry.
pub struct FetchCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, FetchCacheEntry>>,
}

impl FetchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached payload for `key` if it is younger than the TTL.
    pub fn get_fresh(&self, key: &str) -> Option<Value> {
        let map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        map.get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: String, value: Value) {
        let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(
            key,
            FetchCacheEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fetches JSON (or plain text, as a JSON string) through a transport, with
/// retry on failure and memoization of successful payloads.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    cache: Arc<FetchCache>,
    max_attempts: u32,
    backoff_step: Duration,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, cache: Arc<FetchCache>) -> Self {
        Self {
            transport,
            cache,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff_step: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.backoff_step = backoff_step;
        self
    }

    pub fn cache(&self) -> &Arc<FetchCache> {
        &self.cache
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<Value, FetchError> {
        self.fetch_with_attempts(request, self.max_attempts).await
    }

    /// Fetch with an explicit attempt bound. After the n-th failed attempt the
    /// next one waits `n * backoff_step`. The last error is returned once the
    /// attempts are used up.
    pub async fn fetch_with_attempts(
        &self,
        request: &FetchRequest,
        max_attempts: u32,
    ) -> Result<Value, FetchError> {
        let key = request.cache_key();
        if let Some(value) = self.cache.get_fresh(&key) {
            debug!(key = %key, "Fetch cache hit");
            return Ok(value);
        }

        let attempts = max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = match self.transport.send(request).await {
                Ok(response) if response.is_success() => Ok(parse_body(&response.body)),
                Ok(response) => Err(FetchError::Status {
                    url: request.url.clone(),
                    status: response.status,
                }),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => {
                    self.cache.insert(key, value.clone());
                    return Ok(value);
                }
                Err(e) if attempt >= attempts => {
                    warn!(url = %request.url, attempts, error = %e, "Fetch failed");
                    return Err(e);
                }
                Err(e) => {
                    let backoff = self.backoff_step * attempt;
                    debug!(
                        url = %request.url,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Fetch attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn parse_body(body: &str) -> Value {
    let trimmed = body.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}
