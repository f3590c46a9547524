use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::{ScoutError, ScoutResult};
use crate::fetch::{check_scheme, HttpFetcher, PageFetcher, Resource, USER_AGENT};

/// Headless Chromium `--dump-dom` for JavaScript-rendered listing pages.
///
/// Each call is exactly one browser launch with a throwaway profile
/// directory, spawned with `kill_on_drop` so a timeout or a cancelled
/// harvest never leaves a browser behind. Empty output, fork exhaustion
/// and timeouts come back as retryable errors for the caller's
/// [`Throttle`](crate::throttle::Throttle). Linked documents are
/// downloaded over plain HTTP.
pub struct ChromeFetcher {
    chrome_bin: String,
    semaphore: Semaphore,
    timeout: Duration,
    downloads: HttpFetcher,
}

impl ChromeFetcher {
    pub fn new(chrome_bin: &str, max_concurrent: usize, timeout: Duration) -> ScoutResult<Self> {
        let max_concurrent = max_concurrent.max(1);
        info!(chrome_bin, max_concurrent, "Using ChromeFetcher (dump-dom)");
        Ok(Self {
            chrome_bin: chrome_bin.to_string(),
            semaphore: Semaphore::new(max_concurrent),
            timeout,
            downloads: HttpFetcher::new(timeout)?,
        })
    }

    /// Launch Chrome --dump-dom once and return raw stdout bytes.
    async fn run_chrome(&self, url: &str) -> ScoutResult<Vec<u8>> {
        check_scheme(url)?;
        let profile = tempfile::tempdir()?;

        let result = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.chrome_bin)
                .args([
                    "--headless",
                    "--no-sandbox",
                    "--disable-gpu",
                    "--disable-dev-shm-usage",
                    &format!("--user-agent={USER_AGENT}"),
                    &format!("--user-data-dir={}", profile.path().display()),
                    "--dump-dom",
                    url,
                ])
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => {
                if output.stdout.is_empty() {
                    return Err(ScoutError::EmptyDom(url.to_string()));
                }
                Ok(output.stdout)
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                let err = ScoutError::Browser(stderr);
                warn!(url, fetcher = "chrome", error = %err, "Chrome exited with error");
                Err(err)
            }
            Ok(Err(e)) => Err(ScoutError::Browser(format!(
                "failed to launch {}: {e}",
                self.chrome_bin
            ))),
            Err(_) => Err(ScoutError::Timeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl PageFetcher for ChromeFetcher {
    async fn page(&self, url: &str) -> ScoutResult<String> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ScoutError::Browser("Chrome semaphore closed".into()))?;

        info!(url, fetcher = "chrome", "Rendering page");
        let html = self.run_chrome(url).await?;
        let text = String::from_utf8_lossy(&html).into_owned();
        info!(url, fetcher = "chrome", bytes = text.len(), "Page rendered");
        Ok(text)
    }

    async fn resource(&self, url: &str) -> ScoutResult<Resource> {
        self.downloads.resource(url).await
    }

    fn name(&self) -> &str {
        "chrome"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_a_browser_error_not_a_panic() {
        let fetcher = ChromeFetcher::new(
            "/nonexistent/procurecast-chromium",
            1,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = fetcher.page("https://example.gov/").await.unwrap_err();
        assert!(matches!(err, ScoutError::Browser(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn empty_output_is_one_launch_per_throttled_attempt() {
        use std::os::unix::fs::PermissionsExt;

        use crate::throttle::Throttle;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("fake-chromium");
        let launches = dir.path().join("launches");
        std::fs::write(
            &bin,
            format!("#!/bin/sh\necho launch >> '{}'\n", launches.display()),
        )
        .unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let fetcher = ChromeFetcher::new(bin.to_str().unwrap(), 1, Duration::from_secs(5)).unwrap();
        let throttle = Throttle::new(Duration::ZERO, 3, Duration::from_millis(1));
        let url = "https://example.gov/bids";
        let err = throttle.run(url, || fetcher.page(url)).await.unwrap_err();

        assert!(matches!(err, ScoutError::EmptyDom(_)));
        let count = std::fs::read_to_string(&launches).unwrap().lines().count();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn non_http_urls_never_launch_chrome() {
        let fetcher = ChromeFetcher::new("chromium", 1, Duration::from_secs(5)).unwrap();
        let err = fetcher.page("javascript:alert(1)").await.unwrap_err();
        assert!(matches!(err, ScoutError::InvalidUrl { .. }));
    }
}
