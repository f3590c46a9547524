use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::warn;

use procurecast_common::HarvestConfig;

use crate::error::{ScoutError, ScoutResult};

/// Crawl courtesy for every remote call: a minimum gap between requests to
/// the same host, and bounded retries with exponential backoff plus jitter
/// for transient failures.
pub struct Throttle {
    min_spacing: Duration,
    max_attempts: u32,
    backoff_base: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl Throttle {
    pub fn new(min_spacing: Duration, max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            min_spacing,
            max_attempts: max_attempts.max(1),
            backoff_base,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_host_delay_ms),
            config.max_attempts,
            Duration::from_millis(config.backoff_base_ms),
        )
    }

    /// No spacing, a single attempt.
    pub fn unthrottled() -> Self {
        Self::new(Duration::ZERO, 1, Duration::ZERO)
    }

    /// Reserve the next slot for `url`'s host and sleep until it opens.
    pub async fn wait_turn(&self, url: &str) {
        let host = host_key(url);
        let slot = {
            let mut slots = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let slot = slots.get(&host).copied().map_or(now, |t| t.max(now));
            slots.insert(host, slot + self.min_spacing);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }

    /// Delay before retry number `attempt` (0-based): base * 3^attempt plus
    /// up to one base of jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.backoff_base.as_millis() as u64;
        let jitter = if base_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=base_ms)
        };
        self.backoff_base * 3u32.saturating_pow(attempt) + Duration::from_millis(jitter)
    }

    /// Run `op` against `url`, waiting for the host slot before each attempt
    /// and retrying while the error is retryable.
    pub async fn run<T, F, Fut>(&self, url: &str, mut op: F) -> ScoutResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ScoutResult<T>>,
    {
        let mut attempt = 0;
        loop {
            self.wait_turn(url).await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        url,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn host_key(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Map an elapsed tokio timeout onto the error the throttle retries.
pub fn timeout_error(url: &str, after: Duration) -> ScoutError {
    ScoutError::Timeout {
        url: url.to_string(),
        secs: after.as_secs(),
    }
}
