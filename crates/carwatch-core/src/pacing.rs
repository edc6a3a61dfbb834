//! Explicit pacing policies in place of scattered inline sleeps.
//!
//! [`PacingPolicy`] is a min/max delay range with uniform jitter, used
//! between searches, between tiers, and between fallback steps.
//! [`ThrottledFetcher`] wraps any [`Fetcher`] with a per-host policy so a
//! single source never sees bursts from one process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use url::Url;

use crate::error::AppError;
use crate::traits::Fetcher;

/// Uniform random delay in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    pub min: Duration,
    pub max: Duration,
}

impl PacingPolicy {
    pub const fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub const fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    /// A jittered range. Bounds are swapped if given in the wrong order.
    pub fn range(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn is_none(&self) -> bool {
        self.max.is_zero()
    }

    pub fn next_delay(&self) -> Duration {
        if self.min >= self.max {
            return self.min;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rand::random_range(min_ms..=max_ms))
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// A [`Fetcher`] wrapper that enforces per-host pacing.
///
/// Tracks the last request time for each host (scheme + host + port) and
/// sleeps before a new request if the paced delay hasn't elapsed.
#[derive(Clone)]
pub struct ThrottledFetcher<F> {
    inner: F,
    pacing: PacingPolicy,
    last_request: Arc<Mutex<HashMap<String, Instant>>>,
}

impl<F: Fetcher> ThrottledFetcher<F> {
    pub fn new(inner: F, pacing: PacingPolicy) -> Self {
        Self {
            inner,
            pacing,
            last_request: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Extract the host key from a URL (scheme://host:port).
    fn host_key(url_str: &str) -> Option<String> {
        let url = Url::parse(url_str).ok()?;
        let host = url.host_str()?;
        let port = url
            .port_or_known_default()
            .map(|p| format!(":{p}"))
            .unwrap_or_default();
        Some(format!("{}://{}{}", url.scheme(), host, port))
    }

    async fn wait_for_host(&self, host: &str) {
        let mut map = self.last_request.lock().await;

        if let Some(&last) = map.get(host) {
            let elapsed = last.elapsed();
            let required = self.pacing.next_delay();
            if elapsed < required {
                let sleep_for = required - elapsed;
                // Other hosts must not wait on this one.
                drop(map);
                tracing::debug!(
                    host = %host,
                    sleep_ms = %sleep_for.as_millis(),
                    "Pacing request"
                );
                tokio::time::sleep(sleep_for).await;
                self.last_request
                    .lock()
                    .await
                    .insert(host.to_string(), Instant::now());
                return;
            }
        }
        map.insert(host.to_string(), Instant::now());
    }
}

impl<F: Fetcher> Fetcher for ThrottledFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        if let Some(host) = Self::host_key(url) {
            self.wait_for_host(&host).await;
        }
        self.inner.fetch(url).await
    }
}
