//! Byte-size resolution for remote assets.
//!
//! A size is looked up with a cheap metadata probe (HEAD / `Content-Length`)
//! and, on the final attempt only, a full download whose body is measured.
//! Every failure degrades to `None`; nothing here returns an error.

use async_trait::async_trait;
use base64::Engine as _;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Bounded retry with a fixed pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts in total, including the first (at least 1)
    pub max_attempts: u32,
    /// Pause after a failed attempt, in milliseconds
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay_ms: 200 }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Run `op` until it yields a value or the attempts are exhausted,
    /// sleeping `delay` between attempts. `op` receives the 1-based attempt.
    pub async fn retry<T, F, Fut>(&self, mut op: F) -> Option<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let attempts = self.attempts();
        for attempt in 1..=attempts {
            if let Some(v) = op(attempt).await {
                return Some(v);
            }
            if attempt < attempts {
                tokio::time::sleep(self.delay()).await;
            }
        }
        None
    }
}

/// Network access used by `SizeResolver`.
///
/// Both operations are fallible in practice (timeouts, CORS, 404s) and
/// report failure as `None`.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    /// Metadata-only request; the advertised length if any
    async fn probe(&self, locator: &str) -> Option<u64>;

    /// Full download; the number of body bytes received
    async fn fetch_len(&self, locator: &str) -> Option<u64>;
}

/// Resolves and memoises asset byte sizes
pub struct SizeResolver {
    probe: Arc<dyn ResourceProbe>,
    policy: RetryPolicy,
    cache: Mutex<HashMap<String, u64>>,
}

impl SizeResolver {
    pub fn new(probe: Arc<dyn ResourceProbe>, policy: RetryPolicy) -> Self {
        Self { probe, policy, cache: Mutex::new(HashMap::new()) }
    }

    /// Byte size of the resource, or `None` when it cannot be measured.
    ///
    /// `None` means "unknown", never "empty": a zero length is reported as
    /// `None` as well.
    pub async fn resolve_size(&self, locator: &str) -> Option<u64> {
        if let Some(data) = locator.strip_prefix("data:") {
            return data_uri_len(data);
        }
        if let Some(hit) = self.cached(locator) {
            return Some(hit);
        }

        let attempts = self.policy.attempts();
        let len = self
            .policy
            .retry(|attempt| async move {
                if let Some(len) = self.probe.probe(locator).await.filter(|l| *l > 0) {
                    debug!("probe {} -> {} bytes (attempt {})", locator, len, attempt);
                    return Some(len);
                }
                if attempt == attempts {
                    let len = self.probe.fetch_len(locator).await.filter(|l| *l > 0);
                    debug!("full fetch {} -> {:?}", locator, len);
                    return len;
                }
                debug!("probe {} gave no length (attempt {}/{})", locator, attempt, attempts);
                None
            })
            .await;

        if let Some(len) = len {
            self.remember(locator, len);
        }
        len
    }

    fn cached(&self, locator: &str) -> Option<u64> {
        self.cache.lock().ok().and_then(|c| c.get(locator).copied())
    }

    fn remember(&self, locator: &str, len: u64) {
        if let Ok(mut c) = self.cache.lock() {
            c.insert(locator.to_string(), len);
        }
    }
}

/// Payload length of a `data:` URI (the part after `data:`).
fn data_uri_len(rest: &str) -> Option<u64> {
    let (meta, payload) = rest.split_once(',')?;
    let len = if meta.ends_with(";base64") {
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD.decode(cleaned).ok()?.len()
    } else {
        payload.len()
    };
    Some(len as u64).filter(|l| *l > 0)
}

/// `reqwest`-backed probe
#[cfg(feature = "http")]
pub struct HttpProbe {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpProbe {
    pub fn new(user_agent: &str, timeout_ms: u64) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| crate::Error::InitializationError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl ResourceProbe for HttpProbe {
    async fn probe(&self, locator: &str) -> Option<u64> {
        let resp = match self.client.head(locator).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("HEAD {} failed: {}", locator, e);
                return None;
            }
        };
        if !resp.status().is_success() {
            return None;
        }
        resp.headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    }

    async fn fetch_len(&self, locator: &str) -> Option<u64> {
        let resp = self.client.get(locator).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        match resp.bytes().await {
            Ok(body) => Some(body.len() as u64),
            Err(e) => {
                debug!("GET {} body failed: {}", locator, e);
                None
            }
        }
    }
}
